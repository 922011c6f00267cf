//! Monotonic millisecond clock with a manual variant for tests

use std::sync::{Arc, Mutex};
use std::time::Instant;

/// A cloneable handle to a millisecond clock.
///
/// Production code uses [`Clock::monotonic`], which measures from a fixed
/// epoch with [`Instant`]. Tests use [`Clock::manual`] and advance time
/// explicitly, which makes drift and resync behavior deterministic.
#[derive(Debug, Clone)]
pub struct Clock {
    inner: Arc<ClockInner>,
}

#[derive(Debug)]
enum ClockInner {
    Monotonic(Instant),
    Manual(Mutex<f64>),
}

impl Clock {
    /// Create a clock backed by the OS monotonic clock.
    pub fn monotonic() -> Self {
        Self {
            inner: Arc::new(ClockInner::Monotonic(Instant::now())),
        }
    }

    /// Create a manually driven clock starting at `start_ms`.
    pub fn manual(start_ms: f64) -> Self {
        Self {
            inner: Arc::new(ClockInner::Manual(Mutex::new(start_ms))),
        }
    }

    /// Current time in milliseconds since the clock's epoch.
    pub fn now_ms(&self) -> f64 {
        match &*self.inner {
            ClockInner::Monotonic(epoch) => epoch.elapsed().as_secs_f64() * 1000.0,
            ClockInner::Manual(now) => *now.lock().unwrap(),
        }
    }

    /// Advance a manual clock by `delta_ms`.
    ///
    /// No-op on a monotonic clock.
    pub fn advance(&self, delta_ms: f64) {
        if let ClockInner::Manual(now) = &*self.inner {
            *now.lock().unwrap() += delta_ms;
        }
    }

    /// Set a manual clock to an absolute time.
    ///
    /// No-op on a monotonic clock.
    pub fn set(&self, now_ms: f64) {
        if let ClockInner::Manual(now) = &*self.inner {
            *now.lock().unwrap() = now_ms;
        }
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::monotonic()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_advances() {
        let clock = Clock::manual(100.0);
        assert_eq!(clock.now_ms(), 100.0);

        clock.advance(50.0);
        assert_eq!(clock.now_ms(), 150.0);

        clock.set(1000.0);
        assert_eq!(clock.now_ms(), 1000.0);
    }

    #[test]
    fn test_manual_clock_shared_between_clones() {
        let clock = Clock::manual(0.0);
        let other = clock.clone();

        clock.advance(25.0);
        assert_eq!(other.now_ms(), 25.0);
    }

    #[test]
    fn test_monotonic_clock_is_non_decreasing() {
        let clock = Clock::monotonic();
        let a = clock.now_ms();
        let b = clock.now_ms();
        assert!(b >= a);

        // advance/set are ignored on monotonic clocks
        clock.advance(-1000.0);
        assert!(clock.now_ms() >= b);
    }
}
