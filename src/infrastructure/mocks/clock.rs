//! Mock clock for testing.

use crate::application::ports::Clock;
use chrono::{DateTime, TimeDelta, Utc};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Mock clock for testing.
///
/// Allows tests to control time progression explicitly, enabling deterministic
/// testing of window rollover, garbage collection and grouping expiry.
///
/// # Examples
///
/// ```
/// use interaction_throttle::infrastructure::mocks::MockClock;
/// use interaction_throttle::application::ports::Clock;
/// use chrono::Utc;
/// use std::time::Duration;
///
/// let start = Utc::now();
/// let clock = MockClock::new(start);
/// assert_eq!(clock.now(), start);
///
/// clock.advance(Duration::from_secs(10));
/// assert_eq!(clock.now(), start + chrono::TimeDelta::seconds(10));
/// ```
///
/// # Thread Safety
///
/// All clones share the same underlying time value, so advancing time in one
/// clone affects all clones.
#[derive(Debug, Clone)]
pub struct MockClock {
    current_time: Arc<Mutex<DateTime<Utc>>>,
}

impl MockClock {
    /// Create a mock clock starting at a specific time.
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            current_time: Arc::new(Mutex::new(start)),
        }
    }

    /// Advance the clock by a duration.
    pub fn advance(&self, duration: Duration) {
        let delta = TimeDelta::from_std(duration).expect("MockClock advance out of range");
        let mut time = self
            .current_time
            .lock()
            .expect("MockClock mutex poisoned - a test thread panicked while holding the lock");
        *time += delta;
    }

    /// Set the clock to a specific time.
    pub fn set(&self, time: DateTime<Utc>) {
        let mut current = self
            .current_time
            .lock()
            .expect("MockClock mutex poisoned - a test thread panicked while holding the lock");
        *current = time;
    }
}

impl Clock for MockClock {
    fn now(&self) -> DateTime<Utc> {
        *self
            .current_time
            .lock()
            .expect("MockClock mutex poisoned - a test thread panicked while holding the lock")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_clock() {
        let start = Utc::now();
        let clock = MockClock::new(start);

        assert_eq!(clock.now(), start);

        clock.advance(Duration::from_secs(10));
        assert_eq!(clock.now(), start + TimeDelta::seconds(10));

        let new_time = start + TimeDelta::seconds(100);
        clock.set(new_time);
        assert_eq!(clock.now(), new_time);
    }

    #[test]
    fn test_clones_share_time() {
        let start = Utc::now();
        let clock = MockClock::new(start);
        let clock_clone = clock.clone();

        std::thread::spawn(move || clock_clone.advance(Duration::from_secs(5)))
            .join()
            .unwrap();

        assert_eq!(clock.now(), start + TimeDelta::seconds(5));
    }
}
