// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Timing for the poll loop
//!
//! The loop never calls `tokio::time::sleep` directly; it waits through a
//! [`Clock`] so tests can drive it without real delays.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::time::Duration;
use tracing::debug;

/// Source of delays between poll iterations
#[async_trait]
pub trait Clock: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Real-time clock backed by the tokio timer
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

#[async_trait]
impl Clock for TokioClock {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Clock that returns immediately and records every requested delay
#[derive(Debug, Default)]
pub struct ManualClock {
    sleeps: Mutex<Vec<Duration>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays requested so far, in order
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().clone()
    }

    /// Total simulated time spent sleeping
    pub fn elapsed(&self) -> Duration {
        self.sleeps.lock().iter().sum()
    }
}

#[async_trait]
impl Clock for ManualClock {
    async fn sleep(&self, duration: Duration) {
        self.sleeps.lock().push(duration);
        tokio::task::yield_now().await;
    }
}

/// Exponential backoff for a failing poll source
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    failures: u32,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max: max.max(base),
            failures: 0,
        }
    }

    /// Delay before the next poll: the base interval after a success,
    /// doubled per consecutive failure up to `max`.
    pub fn delay(&self) -> Duration {
        let factor = 2u32.saturating_pow(self.failures.min(16));
        self.base.saturating_mul(factor).min(self.max)
    }

    pub fn record_failure(&mut self) {
        self.failures = self.failures.saturating_add(1);
        debug!("Poll failure #{}, next delay {:?}", self.failures, self.delay());
    }

    pub fn record_success(&mut self) {
        self.failures = 0;
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }
}
