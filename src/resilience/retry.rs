//! # Retry Executor
//!
//! Runs a caller-visible operation (a single publish, a single business
//! call), waiting per the backoff policy between failures. It knows nothing
//! about message headers or poison status; cross-delivery retries are the
//! processor's concern.

use crate::resilience::backoff::ExponentialBackoff;
use crate::resilience::shutdown::ShutdownSignal;
use std::fmt::Display;
use std::future::Future;
use thiserror::Error;
use tracing::{error, info, warn};

/// Failure of a retried operation
#[derive(Debug, Error)]
pub enum RetryError<E> {
    /// Every attempt failed; carries the last failure
    #[error("Operation failed after {attempts} attempts: {last_error}")]
    OperationFailed {
        attempts: u32,
        #[source]
        last_error: E,
    },

    /// Shutdown interrupted a backoff wait; not eligible for retry accounting
    #[error("Retry cancelled by shutdown after {attempts} attempts")]
    Cancelled { attempts: u32 },
}

impl<E> RetryError<E> {
    pub fn attempts(&self) -> u32 {
        match self {
            Self::OperationFailed { attempts, .. } | Self::Cancelled { attempts } => *attempts,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// The last underlying failure, if the retries were exhausted
    pub fn into_last_error(self) -> Option<E> {
        match self {
            Self::OperationFailed { last_error, .. } => Some(last_error),
            Self::Cancelled { .. } => None,
        }
    }
}

/// Bounded retry with exponential backoff
#[derive(Debug, Clone)]
pub struct RetryExecutor {
    /// Operation label for logs
    name: String,
    shutdown: ShutdownSignal,
}

impl RetryExecutor {
    pub fn new(name: impl Into<String>, shutdown: ShutdownSignal) -> Self {
        Self {
            name: name.into(),
            shutdown,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Call `operation(attempt)` until it succeeds or `max_retries` retries
    /// have failed, for at most `max_retries + 1` calls in total
    pub async fn execute<T, E, F, Fut>(
        &self,
        mut operation: F,
        max_retries: u32,
        backoff: &ExponentialBackoff,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let mut attempt: u32 = 0;
        loop {
            match operation(attempt).await {
                Ok(value) => {
                    if attempt > 0 {
                        info!(
                            operation = %self.name,
                            attempts = attempt + 1,
                            "✅ Operation succeeded after retry"
                        );
                    }
                    return Ok(value);
                }
                Err(e) if attempt >= max_retries => {
                    error!(
                        operation = %self.name,
                        attempts = attempt + 1,
                        error = %e,
                        "❌ Operation failed after all attempts"
                    );
                    return Err(RetryError::OperationFailed {
                        attempts: attempt + 1,
                        last_error: e,
                    });
                }
                Err(e) => {
                    warn!(
                        operation = %self.name,
                        attempt = attempt + 1,
                        max_retries,
                        error = %e,
                        "🔄 Operation failed, retrying"
                    );
                    if backoff.wait(attempt, &self.shutdown).await.is_err() {
                        warn!(
                            operation = %self.name,
                            attempts = attempt + 1,
                            "Retry cancelled by shutdown"
                        );
                        return Err(RetryError::Cancelled {
                            attempts: attempt + 1,
                        });
                    }
                    attempt += 1;
                }
            }
        }
    }
}
