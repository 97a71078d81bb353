//! Scheduler types.

use chrono::{DateTime, Duration, FixedOffset, NaiveDateTime, Offset, Utc};
use serde::{Deserialize, Serialize};

/// Offset of the scheduler's fixed timezone from UTC, in seconds.
pub const SCHEDULER_UTC_OFFSET_SECS: i32 = 8 * 3600;

/// How late a job may fire and still run.
pub const MISFIRE_GRACE: Duration = Duration::seconds(120);

/// The scheduler's fixed timezone (UTC+8).
pub fn scheduler_timezone() -> FixedOffset {
    FixedOffset::east_opt(SCHEDULER_UTC_OFFSET_SECS).unwrap_or_else(|| Utc.fix())
}

/// A pending one-shot job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledJob {
    /// Unique job id.
    pub id: String,
    /// Human-readable name for the job.
    pub name: String,
    /// When the job fires, in the scheduler's timezone.
    pub fire_at: DateTime<FixedOffset>,
    /// Arguments handed to the job when it fires.
    pub payload: serde_json::Value,
    /// When this job was registered.
    pub created_at: DateTime<Utc>,
}

impl ScheduledJob {
    /// How late the job is at `now`. Negative while it is still in the future.
    pub fn lateness(&self, now: DateTime<FixedOffset>) -> Duration {
        now - self.fire_at
    }

    /// Whether the job should fire at `now`.
    pub fn is_due(&self, now: DateTime<FixedOffset>) -> bool {
        self.fire_at <= now
    }

    /// Whether the job is so late that it must be dropped instead of fired.
    pub fn is_misfired(&self, now: DateTime<FixedOffset>) -> bool {
        self.lateness(now) > MISFIRE_GRACE
    }

    pub fn handle(&self) -> JobHandle {
        JobHandle {
            id: self.id.clone(),
            name: self.name.clone(),
            fire_at: self.fire_at,
        }
    }
}

/// Returned by a successful registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobHandle {
    pub id: String,
    pub name: String,
    pub fire_at: DateTime<FixedOffset>,
}

/// Instants accepted by [`Scheduler::register`](crate::Scheduler::register).
///
/// Zoned instants are converted to the scheduler's timezone. Naive instants
/// carry no zone and are taken to already be in it.
pub trait IntoFireTime {
    fn into_fire_time(self) -> DateTime<FixedOffset>;
}

impl IntoFireTime for DateTime<FixedOffset> {
    fn into_fire_time(self) -> DateTime<FixedOffset> {
        self.with_timezone(&scheduler_timezone())
    }
}

impl IntoFireTime for DateTime<Utc> {
    fn into_fire_time(self) -> DateTime<FixedOffset> {
        self.with_timezone(&scheduler_timezone())
    }
}

impl IntoFireTime for NaiveDateTime {
    fn into_fire_time(self) -> DateTime<FixedOffset> {
        let tz = scheduler_timezone();
        let utc = self - Duration::seconds(i64::from(tz.local_minus_utc()));
        DateTime::from_naive_utc_and_offset(utc, tz)
    }
}
