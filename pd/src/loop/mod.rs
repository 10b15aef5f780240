//! The scheduler loop
//!
//! Polls on a fixed interval and, inside active posting windows, executes
//! the day's planned slots against the shared quota.

mod engine;

pub use engine::{Engine, EngineConfig};
