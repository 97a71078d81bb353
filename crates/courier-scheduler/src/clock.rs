//! Wall-clock source for the scheduler.

use chrono::{DateTime, Utc};

/// Source of the current wall-clock time.
///
/// The scheduler reads it on every pass, so a stepped system clock is picked
/// up within one [`MAX_SLEEP`](crate::MAX_SLEEP).
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// The system wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
