// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Clock abstraction for testable time handling

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// A clock that provides the current time
pub trait Clock: Clone + Send + Sync + 'static {
    /// Monotonic time, for measuring intervals
    fn now(&self) -> Instant;

    /// Wall-clock time in milliseconds since the Unix epoch, for persisted timestamps
    fn epoch_ms(&self) -> u64;
}

/// Real system clock
#[derive(Clone, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn epoch_ms(&self) -> u64 {
        u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or(0)
    }
}

#[derive(Clone, Copy)]
struct FakeTime {
    instant: Instant,
    epoch_ms: u64,
}

/// Fake clock for testing with controllable time
#[derive(Clone)]
pub struct FakeClock {
    current: Arc<Mutex<FakeTime>>,
}

/// Epoch time a fresh `FakeClock` starts at (2026-01-01T00:00:00Z)
pub const FAKE_EPOCH_MS: u64 = 1_767_225_600_000;

impl FakeClock {
    pub fn new() -> Self {
        Self {
            current: Arc::new(Mutex::new(FakeTime {
                instant: Instant::now(),
                epoch_ms: FAKE_EPOCH_MS,
            })),
        }
    }

    /// Advance the clock by the given duration
    pub fn advance(&self, duration: Duration) {
        let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        current.instant += duration;
        current.epoch_ms += u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
    }

    /// Set the wall-clock reading without moving the monotonic clock
    pub fn set_epoch_ms(&self, epoch_ms: u64) {
        let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        current.epoch_ms = epoch_ms;
    }
}

impl Default for FakeClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for FakeClock {
    fn now(&self) -> Instant {
        self.current.lock().unwrap_or_else(|e| e.into_inner()).instant
    }

    fn epoch_ms(&self) -> u64 {
        self.current.lock().unwrap_or_else(|e| e.into_inner()).epoch_ms
    }
}

#[cfg(test)]
#[path = "clock_tests.rs"]
mod tests;
