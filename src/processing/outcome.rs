//! Results of processing a single delivery.

use thiserror::Error;

use super::handler::BusinessError;
use super::states::{InvalidTransition, ProcessingState};
use crate::dead_letter::{DeadLetterEnvelope, FailureReason, RoutingFailed};
use crate::messaging::MessagingError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckReason {
    /// Business logic ran and every downstream event was published
    Processed,
    /// Event id was already in the dedup window; business logic skipped
    Duplicate,
}

/// Why an attempt at a delivery failed
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DeliveryFailure {
    #[error("{0}")]
    Business(#[from] BusinessError),

    /// A downstream event could not be published after inline retries
    #[error("Downstream publish failed: {0}")]
    Publish(#[from] MessagingError),
}

impl DeliveryFailure {
    pub fn reason(&self) -> FailureReason {
        match self {
            Self::Business(error) => FailureReason::from(error),
            Self::Publish(error) => FailureReason::from(error),
        }
    }
}

/// Terminal outcome of one delivery
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessingOutcome {
    Acked(AckReason),
    /// Broker should redeliver with `retryCount + 1`; offset not committed
    RetrySignaled(DeliveryFailure),
    /// Envelope durably published; offset may be committed
    DeadLettered(Box<DeadLetterEnvelope>),
}

impl ProcessingOutcome {
    /// Terminal state this outcome corresponds to
    pub fn state(&self) -> ProcessingState {
        match self {
            Self::Acked(_) => ProcessingState::Acked,
            Self::RetrySignaled(_) => ProcessingState::RetrySignaled,
            Self::DeadLettered(_) => ProcessingState::DeadLettered,
        }
    }

    pub fn commits_offset(&self) -> bool {
        self.state().commits_offset()
    }
}

/// Processing stopped without reaching a terminal state
#[derive(Debug, Error)]
pub enum ProcessingError {
    /// Dead-letter publish failed; the delivery must stay unacknowledged
    #[error(transparent)]
    RoutingFailed(#[from] RoutingFailed),

    /// Shutdown interrupted an inline retry wait
    #[error("Processing cancelled by shutdown")]
    Cancelled,

    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),
}

pub type ProcessingResult<T> = Result<T, ProcessingError>;
