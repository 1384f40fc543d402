//! # Clock
//!
//! Source of "now" for watermark advancement. Injected so cycles can be
//! replayed deterministically in tests.

use std::sync::RwLock;

use chrono::{Duration, Utc};

use edgesync_core::Timestamp;

/// Supplies the current time in canonical form.
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// Wall clock, in UTC.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Timestamp::from_utc(Utc::now())
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct FixedClock {
    now: RwLock<Timestamp>,
}

impl FixedClock {
    pub fn new(now: Timestamp) -> Self {
        FixedClock {
            now: RwLock::new(now),
        }
    }

    /// Sets the current time.
    pub fn set(&self, now: Timestamp) {
        let mut guard = self.now.write().unwrap_or_else(|e| e.into_inner());
        *guard = now;
    }

    /// Moves the clock forward by `seconds`.
    pub fn advance_secs(&self, seconds: i64) {
        let mut guard = self.now.write().unwrap_or_else(|e| e.into_inner());
        *guard = Timestamp::from_naive(guard.as_naive() + Duration::seconds(seconds));
    }
}

impl Clock for FixedClock {
    fn now(&self) -> Timestamp {
        *self.now.read().unwrap_or_else(|e| e.into_inner())
    }
}
