//! Sources of commit timestamps.

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::Utc;

use crate::Timestamp;

/// Supplies the wall-clock time, in milliseconds since the epoch, that engines stamp on commits.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> Timestamp;
}

/// The system clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> Timestamp {
        Utc::now().timestamp_millis()
    }
}

/// A clock that only moves when told to. Used to build deterministic histories.
#[derive(Debug, Default)]
pub struct ManualClock(AtomicI64);

impl ManualClock {
    pub fn new(start_ms: Timestamp) -> Self {
        Self(AtomicI64::new(start_ms))
    }

    pub fn set(&self, now_ms: Timestamp) {
        self.0.store(now_ms, Ordering::SeqCst);
    }

    /// Move the clock forward by `delta_ms` and return the new time.
    pub fn advance(&self, delta_ms: i64) -> Timestamp {
        self.0.fetch_add(delta_ms, Ordering::SeqCst) + delta_ms
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> Timestamp {
        self.0.load(Ordering::SeqCst)
    }
}
