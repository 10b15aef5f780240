//! PostDaemon - quota-bounded content-posting scheduler
//!
//! PostDaemon decides *when* to publish a bounded daily quota of items
//! within recurring time-of-day windows, enforces the quota against a store
//! shared with other instances, and drives an external content pipeline and
//! publishing transport at the chosen moments.
//!
//! # Core Concepts
//!
//! - **Shared quota**: the daily counter lives in the store and is only ever
//!   decremented through optimistic reservations, so concurrent instances
//!   cannot overdraw it
//! - **Persisted plan**: the day's posting instants are computed once per
//!   calendar day and persisted; ticks only execute what the plan says
//! - **Best-effort timing**: a slot executes when a tick lands within its
//!   tolerance window; slots whose window has passed are dropped, not retried
//!
//! # Modules
//!
//! - [`calendar`] - weekly posting windows
//! - [`planner`] - quota distribution across a day's windows
//! - [`state`] - quota and schedule persistence
//! - [`pipeline`] - content pipeline seam and the draft-queue adapter
//! - [`transport`] - publishing transport seam
//! - [`r#loop`] - the polling scheduler loop

pub mod calendar;
pub mod cli;
pub mod config;
pub mod pipeline;
pub mod planner;
pub mod state;
pub mod transport;

// Note: 'loop' is a reserved keyword, so we use r#loop
#[path = "loop/mod.rs"]
pub mod r#loop;

// Re-export commonly used types
pub use calendar::{DailySchedule, PostingWindow, WeeklyCalendar};
pub use config::{Config, SchedulerConfig, StoreConfig};
pub use pipeline::{ContentPipeline, PipelineOutcome, QueuePipeline};
pub use planner::{SlotDistribution, plan_day};
pub use r#loop::{Engine, EngineConfig};
pub use state::{PlannedSlot, QuotaStore, Reservation, ScheduleStore};
pub use transport::{DryRunPublisher, Publisher};
