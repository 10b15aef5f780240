//! Persistent scheduler state
//!
//! The quota counter and the day's schedule live in the shared store and may
//! be mutated by other scheduler instances at any time, so every mutation
//! goes through watchstore's optimistic commits rather than in-process
//! fields.

mod quota;
mod schedule;

pub use quota::{QuotaStore, Reservation};
pub use schedule::{PlannedSlot, ScheduleStore};
