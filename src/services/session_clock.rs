use thiserror::Error;
use time::OffsetDateTime;

use crate::core::time::parse_rfc3339;

/// Wall-clock countdown for one attempt. Remaining time is always derived
/// from the fixed start instant, never from a decremented counter, so a
/// reload or re-fetch cannot stretch the exam window.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SessionClock {
    started_at: OffsetDateTime,
    total_seconds: i64,
}

#[derive(Debug, Error)]
pub(crate) enum ClockError {
    #[error("invalid session start instant: {0}")]
    InvalidStart(String),
    #[error("invalid session duration: {0} minutes")]
    InvalidDuration(i64),
}

impl SessionClock {
    /// Refuses to arm on a missing/unparseable start instant or non-positive
    /// duration. Callers must treat that as a fatal session-load error: a
    /// guessed start time would silently grant a fresh full duration.
    pub(crate) fn arm(started_at: &str, duration_minutes: i64) -> Result<Self, ClockError> {
        if duration_minutes <= 0 {
            return Err(ClockError::InvalidDuration(duration_minutes));
        }

        let started_at = parse_rfc3339(started_at)
            .map_err(|_| ClockError::InvalidStart(started_at.to_string()))?;

        Ok(Self { started_at, total_seconds: duration_minutes * 60 })
    }

    pub(crate) fn total_seconds(&self) -> i64 {
        self.total_seconds
    }

    pub(crate) fn remaining_seconds(&self, now: OffsetDateTime) -> i64 {
        let elapsed = now.unix_timestamp() - self.started_at.unix_timestamp();
        (self.total_seconds - elapsed).max(0)
    }

    pub(crate) fn expired(&self, now: OffsetDateTime) -> bool {
        self.remaining_seconds(now) == 0
    }

    pub(crate) fn deadline(&self) -> OffsetDateTime {
        self.started_at + time::Duration::seconds(self.total_seconds)
    }

    /// Seconds actually spent, clamped to the exam duration.
    pub(crate) fn time_taken_seconds(&self, now: OffsetDateTime) -> i64 {
        let elapsed = now.unix_timestamp() - self.started_at.unix_timestamp();
        elapsed.clamp(0, self.total_seconds)
    }
}
