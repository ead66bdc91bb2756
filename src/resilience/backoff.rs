//! # Exponential Backoff
//!
//! `delay(attempt) = min(initial_delay * multiplier^attempt, max_delay)`.
//! Pure function of the zero-based attempt; large attempts saturate at
//! `max_delay` instead of overflowing.

use crate::config::BackoffConfig;
use crate::resilience::shutdown::ShutdownSignal;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// A backoff wait was interrupted by shutdown
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("backoff wait for attempt {attempt} cancelled by shutdown")]
pub struct WaitCancelled {
    pub attempt: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExponentialBackoff {
    initial_delay: Duration,
    max_delay: Duration,
    multiplier: f64,
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::from_config(&BackoffConfig::default())
    }
}

impl ExponentialBackoff {
    pub fn new(initial_delay: Duration, max_delay: Duration, multiplier: f64) -> Self {
        Self {
            initial_delay,
            max_delay,
            multiplier,
        }
    }

    pub fn from_config(config: &BackoffConfig) -> Self {
        Self::new(config.initial_delay(), config.max_delay(), config.multiplier)
    }

    pub fn initial_delay(&self) -> Duration {
        self.initial_delay
    }

    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    pub fn multiplier(&self) -> f64 {
        self.multiplier
    }

    /// Wait duration before retrying after failed attempt `attempt`
    pub fn delay(&self, attempt: u32) -> Duration {
        let initial_nanos = self.initial_delay.as_nanos() as f64;
        let max_nanos = self.max_delay.as_nanos() as f64;

        // powf saturates to infinity for large attempts; the clamp below
        // catches that along with NaN from a degenerate multiplier.
        let scaled = initial_nanos * self.multiplier.powf(f64::from(attempt));
        if !scaled.is_finite() || scaled < 0.0 || scaled >= max_nanos {
            return self.max_delay;
        }

        Duration::from_nanos(scaled.round() as u64)
    }

    /// Suspend for `delay(attempt)` unless shutdown is requested first
    pub async fn wait(&self, attempt: u32, shutdown: &ShutdownSignal) -> Result<Duration, WaitCancelled> {
        let delay = self.delay(attempt);
        debug!(
            delay_ms = delay.as_millis() as u64,
            attempt = attempt + 1,
            "⏳ Exponential backoff: waiting"
        );

        tokio::select! {
            biased;
            _ = shutdown.triggered() => Err(WaitCancelled { attempt }),
            _ = tokio::time::sleep(delay) => Ok(delay),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backoff(initial_ms: u64, max_ms: u64, multiplier: f64) -> ExponentialBackoff {
        ExponentialBackoff::new(
            Duration::from_millis(initial_ms),
            Duration::from_millis(max_ms),
            multiplier,
        )
    }

    #[test]
    fn test_calculates_expected_delays() {
        let backoff = backoff(100, 5000, 2.0);

        assert_eq!(backoff.delay(0), Duration::from_millis(100));
        assert_eq!(backoff.delay(1), Duration::from_millis(200));
        assert_eq!(backoff.delay(2), Duration::from_millis(400));
        assert_eq!(backoff.delay(3), Duration::from_millis(800));
        assert_eq!(backoff.delay(10), Duration::from_millis(5000));
    }

    #[test]
    fn test_huge_attempts_saturate() {
        let backoff = backoff(100, 30_000, 2.0);
        assert_eq!(backoff.delay(u32::MAX), Duration::from_millis(30_000));
        assert_eq!(backoff.delay(2000), Duration::from_millis(30_000));
    }

    #[test]
    fn test_initial_above_max_is_clamped() {
        let backoff = backoff(500, 100, 2.0);
        assert_eq!(backoff.delay(0), Duration::from_millis(100));
    }

    #[test]
    fn test_defaults_match_configuration() {
        let backoff = ExponentialBackoff::default();
        assert_eq!(backoff.initial_delay(), Duration::from_millis(100));
        assert_eq!(backoff.max_delay(), Duration::from_millis(30_000));
        assert_eq!(backoff.multiplier(), 2.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_sleeps_for_delay() {
        let backoff = backoff(10, 1000, 2.0);
        let shutdown = ShutdownSignal::new();

        let start = tokio::time::Instant::now();
        let waited = backoff.wait(0, &shutdown).await.unwrap();

        assert_eq!(waited, Duration::from_millis(10));
        assert!(start.elapsed() >= Duration::from_millis(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_returns_early_on_shutdown() {
        let backoff = backoff(60_000, 60_000, 2.0);
        let shutdown = ShutdownSignal::new();
        let trigger = shutdown.clone();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            trigger.trigger();
        });

        let start = tokio::time::Instant::now();
        let result = backoff.wait(3, &shutdown).await;

        assert_eq!(result, Err(WaitCancelled { attempt: 3 }));
        assert!(start.elapsed() < Duration::from_secs(60));
    }
}
