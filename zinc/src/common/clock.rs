// vim: tw=80

//! An injectable clock. Production code uses `SystemClock`; tests use
//! `TestClock` so epoch and expiry scenarios are deterministic without
//! real sleeps.

use std::sync::{Arc, Mutex};
use std::time::Instant;

/// Nanoseconds since an arbitrary, monotonic epoch fixed at clock
/// creation. Only deltas between two calls are meaningful.
pub trait Clock: Send + Sync {
    fn now_nanos(&self) -> u64;
}

pub struct SystemClock {
    start: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        SystemClock { start: Instant::now() }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        SystemClock::new()
    }
}

impl Clock for SystemClock {
    fn now_nanos(&self) -> u64 {
        Instant::now().duration_since(self.start).as_nanos() as u64
    }
}

/// A clock that only moves when told to.
pub struct TestClock(Mutex<u64>);

impl TestClock {
    pub fn new() -> Arc<Self> {
        Arc::new(TestClock(Mutex::new(0)))
    }

    pub fn advance(&self, d: std::time::Duration) {
        let mut t = self.0.lock().unwrap();
        *t += d.as_nanos() as u64;
    }

    pub fn set(&self, nanos: u64) {
        *self.0.lock().unwrap() = nanos;
    }
}

impl Clock for TestClock {
    fn now_nanos(&self) -> u64 {
        *self.0.lock().unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_clock_only_advances_when_told() {
        let c = TestClock::new();
        assert_eq!(c.now_nanos(), 0);
        c.advance(Duration::from_millis(5));
        assert_eq!(c.now_nanos(), 5_000_000);
        c.advance(Duration::from_millis(5));
        assert_eq!(c.now_nanos(), 10_000_000);
    }

    #[test]
    fn system_clock_is_monotonic() {
        let c = SystemClock::new();
        let a = c.now_nanos();
        let b = c.now_nanos();
        assert!(b >= a);
    }
}
