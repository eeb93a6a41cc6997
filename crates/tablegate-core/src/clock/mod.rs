//! Time source for window arithmetic.
//!
//! The shield never calls `Utc::now()` directly; it asks a [`Clock`]. Production
//! code uses [`SystemClock`]. Tests drive a [`MockClock`] by hand so window
//! expiry is deterministic.

use chrono::{DateTime, TimeDelta, Utc};
use std::fmt::Debug;
use std::sync::{Arc, Mutex, PoisonError};

/// Port for reading the current time.
pub trait Clock: Send + Sync + Debug {
    /// Get the current instant.
    fn now(&self) -> DateTime<Utc>;
}

/// A clock shared between the store, the limiter and background tasks.
pub type SharedClock = Arc<dyn Clock>;

/// Wall clock backed by `Utc::now()`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl SystemClock {
    /// Create a new system clock.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Create a shared system clock.
    #[must_use]
    pub fn shared() -> SharedClock {
        Arc::new(Self)
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually driven clock.
///
/// Clones share the same underlying time, so a test can hand one clone to the
/// shield and keep another to advance time.
///
/// ```
/// use chrono::{TimeDelta, TimeZone, Utc};
/// use tablegate_core::clock::{Clock, MockClock};
///
/// let start = Utc.with_ymd_and_hms(2026, 5, 1, 12, 0, 0).unwrap();
/// let clock = MockClock::new(start);
/// clock.advance(TimeDelta::seconds(30));
/// assert_eq!(clock.now(), start + TimeDelta::seconds(30));
/// ```
#[derive(Debug, Clone)]
pub struct MockClock {
    current: Arc<Mutex<DateTime<Utc>>>,
}

impl MockClock {
    /// Create a mock clock starting at a specific instant.
    #[must_use]
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            current: Arc::new(Mutex::new(start)),
        }
    }

    /// Create a mock clock starting at the current wall-clock time.
    #[must_use]
    pub fn starting_now() -> Self {
        Self::new(Utc::now())
    }

    /// Advance the clock by a duration.
    pub fn advance(&self, delta: TimeDelta) {
        let mut time = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        *time += delta;
    }

    /// Advance the clock by a number of milliseconds.
    pub fn advance_ms(&self, ms: i64) {
        self.advance(TimeDelta::milliseconds(ms));
    }

    /// Set the clock to a specific instant.
    pub fn set(&self, instant: DateTime<Utc>) {
        let mut time = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        *time = instant;
    }

    /// Share this clock as a trait object.
    #[must_use]
    pub fn shared(&self) -> SharedClock {
        Arc::new(self.clone())
    }
}

impl Clock for MockClock {
    fn now(&self) -> DateTime<Utc> {
        *self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
