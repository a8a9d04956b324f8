// SPDX-License-Identifier: MIT

//! Time abstraction so the engine and storage layers never call
//! `SystemTime::now()` directly — tests pin the clock instead.

use std::time::{SystemTime, UNIX_EPOCH};

/// A source of the current wall-clock time, in epoch milliseconds.
pub trait Clock: Clone + Send + Sync + 'static {
    fn epoch_ms(&self) -> i64;
}

/// The real system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn epoch_ms(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0)
    }
}

/// A clock that returns a fixed, externally advanced value. Used in tests
/// that assert on TTL expiry and monotonic sequencing without sleeping.
#[derive(Debug, Clone)]
pub struct FakeClock {
    now: std::sync::Arc<std::sync::atomic::AtomicI64>,
}

impl FakeClock {
    pub fn new(start_ms: i64) -> Self {
        Self { now: std::sync::Arc::new(std::sync::atomic::AtomicI64::new(start_ms)) }
    }

    pub fn advance(&self, ms: i64) {
        self.now.fetch_add(ms, std::sync::atomic::Ordering::SeqCst);
    }

    pub fn set(&self, ms: i64) {
        self.now.store(ms, std::sync::atomic::Ordering::SeqCst);
    }
}

impl Clock for FakeClock {
    fn epoch_ms(&self) -> i64 {
        self.now.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fake_clock_advances() {
        let clock = FakeClock::new(1000);
        assert_eq!(clock.epoch_ms(), 1000);
        clock.advance(500);
        assert_eq!(clock.epoch_ms(), 1500);
        clock.set(0);
        assert_eq!(clock.epoch_ms(), 0);
    }

    #[test]
    fn system_clock_is_positive() {
        assert!(SystemClock.epoch_ms() > 0);
    }
}
