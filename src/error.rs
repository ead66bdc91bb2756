//! Root error type for the crate.

use crate::config::ConfigurationError;
use crate::dead_letter::RoutingFailed;
use crate::messaging::MessagingError;
use crate::processing::{InvalidTransition, ProcessingError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConsumerError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Messaging error: {0}")]
    Messaging(#[from] MessagingError),

    #[error(transparent)]
    RoutingFailed(#[from] RoutingFailed),

    #[error("Processing cancelled by shutdown")]
    Cancelled,

    #[error("State machine error: {0}")]
    StateMachine(#[from] InvalidTransition),

    #[error("Worker error: {0}")]
    Worker(String),
}

impl ConsumerError {
    pub fn worker(message: impl Into<String>) -> Self {
        Self::Worker(message.into())
    }
}

impl From<ProcessingError> for ConsumerError {
    fn from(error: ProcessingError) -> Self {
        match error {
            ProcessingError::RoutingFailed(routing) => ConsumerError::RoutingFailed(routing),
            ProcessingError::Cancelled => ConsumerError::Cancelled,
            ProcessingError::InvalidTransition(transition) => ConsumerError::StateMachine(transition),
        }
    }
}

pub type Result<T> = std::result::Result<T, ConsumerError>;
