//! Suspension seam
//!
//! Backoff and pacing sleeps go through [`Sleeper`] so callers can observe
//! (or skip) them.

use async_trait::async_trait;
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SleepReason {
    /// Exponential backoff after the given failed attempt.
    Backoff { attempt: u32 },
    /// Fixed delay between successful calls.
    Pacing,
}

#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration, reason: SleepReason);
}

/// Real sleeps on the tokio timer.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration, _reason: SleepReason) {
        tokio::time::sleep(duration).await;
    }
}

/// Records requested sleeps without waiting. Used for dry runs and tests.
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    log: Mutex<Vec<(Duration, SleepReason)>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<(Duration, SleepReason)> {
        self.log.lock().map(|l| l.clone()).unwrap_or_default()
    }

    pub fn backoffs(&self) -> Vec<Duration> {
        self.entries()
            .into_iter()
            .filter(|(_, r)| matches!(r, SleepReason::Backoff { .. }))
            .map(|(d, _)| d)
            .collect()
    }

    pub fn pacing(&self) -> Vec<Duration> {
        self.entries()
            .into_iter()
            .filter(|(_, r)| *r == SleepReason::Pacing)
            .map(|(d, _)| d)
            .collect()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration, reason: SleepReason) {
        if let Ok(mut log) = self.log.lock() {
            log.push((duration, reason));
        }
    }
}
