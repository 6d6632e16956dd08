//! System clock adapter.
//!
//! Implements [`ClockPort`] with the host wall clock for timestamps and
//! `async-io-mini` reactor timers for sleeps, so a sleeping actuation
//! phase yields the executor instead of blocking the thread.

use core::time::Duration;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::app::ports::ClockPort;

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl SystemClock {
    pub fn new() -> Self {
        Self
    }
}

impl ClockPort for SystemClock {
    /// Epoch milliseconds.  A clock set before 1970 reads as 0.
    fn now_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
    }

    async fn sleep(&self, duration: Duration) {
        async_io_mini::Timer::after(duration).await;
    }
}
