//! In-memory job scheduler for courier.
//!
//! This crate provides a scheduler that:
//! - Fires each registered job exactly once at a wall-clock instant
//! - Normalizes every instant to a single fixed timezone (UTC+8)
//! - Refuses instants that are not in the future
//! - Honors late fires within a misfire grace window and drops them beyond it
//!
//! Jobs live only in memory. A process restart loses every pending job.

mod clock;
mod error;
mod scheduler;
mod types;

pub use clock::{Clock, SystemClock};
pub use error::SchedulerError;
pub use scheduler::{JobCallable, MAX_SLEEP, Scheduler};
pub use types::{
    IntoFireTime, JobHandle, MISFIRE_GRACE, SCHEDULER_UTC_OFFSET_SECS, ScheduledJob,
    scheduler_timezone,
};
