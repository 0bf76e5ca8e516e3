//! Fixed-window time arithmetic.
//!
//! Shared by rate-limit counters and notification grouping. All timestamps are
//! wall-clock `DateTime<Utc>` values; durations are `std::time::Duration`.
//! A clock that steps backwards never yields a negative elapsed time, the
//! elapsed duration saturates at zero instead.

use chrono::{DateTime, TimeDelta, Utc};
use std::time::Duration;

/// Time elapsed from `earlier` to `later`, saturating at zero.
pub fn elapsed_between(earlier: DateTime<Utc>, later: DateTime<Utc>) -> Duration {
    (later - earlier).to_std().unwrap_or(Duration::ZERO)
}

/// Shift a timestamp forward, clamping at the maximum representable instant.
pub fn offset(at: DateTime<Utc>, by: Duration) -> DateTime<Utc> {
    TimeDelta::from_std(by)
        .ok()
        .and_then(|delta| at.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Whole seconds needed to cover `duration`, rounded up.
pub fn ceil_secs(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis().div_ceil(1000)).unwrap_or(u64::MAX)
}

/// A window of fixed length anchored at a start instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedWindow {
    start: DateTime<Utc>,
    length: Duration,
}

impl FixedWindow {
    /// Create a window starting at `start`.
    pub fn new(start: DateTime<Utc>, length: Duration) -> Self {
        Self { start, length }
    }

    /// When the window opened.
    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    /// Length of the window.
    pub fn length(&self) -> Duration {
        self.length
    }

    /// When the window closes.
    pub fn ends_at(&self) -> DateTime<Utc> {
        offset(self.start, self.length)
    }

    /// Whether `now` still falls inside the window (`now - start < length`).
    pub fn is_open(&self, now: DateTime<Utc>) -> bool {
        elapsed_between(self.start, now) < self.length
    }

    /// Time left until the window closes, zero once closed.
    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        self.length
            .saturating_sub(elapsed_between(self.start, now))
    }

    /// Whether the window closed so long ago that nothing can still depend on it.
    ///
    /// True once `now - start > 2 * length`. One full extra window of slack keeps
    /// a counter alive while the next request may still roll it over.
    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        elapsed_between(self.start, now) > self.length.saturating_mul(2)
    }
}
