//! Wall-clock abstraction for the event loop and ban expiry.
//!
//! A trait rather than a bare `SystemTime::now()` call so the trigger
//! engine's expiry tests can advance time deterministically instead of
//! sleeping on real multi-second expiries.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

pub trait Clock: Send + Sync {
    /// Current time in whole seconds.
    fn now(&self) -> u64;
}

/// Real wall-clock time, seconds since the Unix epoch.
#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs()
    }
}

/// A manually-advanced clock for tests.
#[derive(Debug, Default)]
pub struct FakeClock {
    secs: AtomicU64,
}

impl FakeClock {
    pub fn new(start_secs: u64) -> Self {
        Self {
            secs: AtomicU64::new(start_secs),
        }
    }

    pub fn advance(&self, delta_secs: u64) {
        self.secs.fetch_add(delta_secs, Ordering::SeqCst);
    }

    pub fn set(&self, secs: u64) {
        self.secs.store(secs, Ordering::SeqCst);
    }
}

impl Clock for FakeClock {
    fn now(&self) -> u64 {
        self.secs.load(Ordering::SeqCst)
    }
}
