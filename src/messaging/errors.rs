//! # Messaging Error Types
//!
//! Error handling for the broker-facing side of the consumer using thiserror
//! for structured error types instead of `Box<dyn Error>` patterns.

use thiserror::Error;

/// Errors raised by broker collaborators (receive, acknowledge, publish)
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MessagingError {
    #[error("Publish to {topic} failed: {message}")]
    PublishFailed { topic: String, message: String },

    #[error("Receive failed on {topic}/{partition}: {message}")]
    ReceiveFailed {
        topic: String,
        partition: i32,
        message: String,
    },

    #[error("Acknowledge failed for {topic}/{partition}@{offset}: {message}")]
    AcknowledgeFailed {
        topic: String,
        partition: i32,
        offset: i64,
        message: String,
    },

    #[error("Message serialization error: {message}")]
    Serialization { message: String },

    #[error("Broker connection closed: {message}")]
    Closed { message: String },
}

impl MessagingError {
    /// Create a publish failure error
    pub fn publish_failed(topic: impl Into<String>, message: impl Into<String>) -> Self {
        Self::PublishFailed {
            topic: topic.into(),
            message: message.into(),
        }
    }

    /// Create a receive failure error
    pub fn receive_failed(
        topic: impl Into<String>,
        partition: i32,
        message: impl Into<String>,
    ) -> Self {
        Self::ReceiveFailed {
            topic: topic.into(),
            partition,
            message: message.into(),
        }
    }

    /// Create an acknowledge failure error
    pub fn acknowledge_failed(
        topic: impl Into<String>,
        partition: i32,
        offset: i64,
        message: impl Into<String>,
    ) -> Self {
        Self::AcknowledgeFailed {
            topic: topic.into(),
            partition,
            offset,
            message: message.into(),
        }
    }

    /// Create a serialization error
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Create a closed-connection error
    pub fn closed(message: impl Into<String>) -> Self {
        Self::Closed {
            message: message.into(),
        }
    }

    /// Short machine-readable kind, used as `errorKind` in dead-letter envelopes
    pub fn kind(&self) -> &'static str {
        match self {
            Self::PublishFailed { .. } => "PublishError",
            Self::ReceiveFailed { .. } => "ReceiveError",
            Self::AcknowledgeFailed { .. } => "AcknowledgeError",
            Self::Serialization { .. } => "SerializationError",
            Self::Closed { .. } => "ConnectionClosed",
        }
    }
}

impl From<serde_json::Error> for MessagingError {
    fn from(err: serde_json::Error) -> Self {
        MessagingError::serialization(err.to_string())
    }
}

/// Result type alias for messaging operations
pub type MessagingResult<T> = Result<T, MessagingError>;
