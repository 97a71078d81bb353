//! Error types for the scheduler.

use chrono::{DateTime, FixedOffset};
use thiserror::Error;

/// Errors that can occur in scheduler operations.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The requested fire time is at or before the scheduler's current time.
    #[error("fire time {fire_at} is not in the future (now {now})")]
    NotFuture {
        fire_at: DateTime<FixedOffset>,
        now: DateTime<FixedOffset>,
    },

    /// The scheduler has not been started, or has been stopped.
    #[error("scheduler is not running")]
    NotRunning,
}
