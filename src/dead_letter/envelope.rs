//! # Dead-Letter Envelope
//!
//! Immutable record of a message that could not be processed, carrying the
//! original delivery verbatim plus enough error context to diagnose and
//! reprocess it later.

use crate::constants::{self, headers};
use crate::messaging::{InboundMessage, MessageHeaders, MessagingError, OutboundMessage, RetryCount};
use crate::processing::BusinessError;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Error message and kind captured from the failure that triggered routing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureReason {
    pub message: String,
    pub kind: String,
}

impl FailureReason {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: kind.into(),
        }
    }

    /// Reason recorded for deliveries whose retry counter is already exhausted
    pub fn max_retries_exceeded() -> Self {
        Self::new(constants::POISON_MESSAGE_KIND, constants::MAX_RETRIES_EXCEEDED)
    }
}

impl From<&BusinessError> for FailureReason {
    fn from(error: &BusinessError) -> Self {
        Self::new(error.kind(), error.message())
    }
}

impl From<&MessagingError> for FailureReason {
    fn from(error: &MessagingError) -> Self {
        Self::new(error.kind(), error.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeadLetterEnvelope {
    original: InboundMessage,
    error: FailureReason,
    service_name: String,
    dlq_timestamp: DateTime<Utc>,
    retry_count: RetryCount,
}

impl DeadLetterEnvelope {
    /// Build an envelope; `retry_count` is one more than the triggering delivery's
    pub fn new(
        original: &InboundMessage,
        error: FailureReason,
        service_name: impl Into<String>,
        dlq_timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            original: original.clone(),
            error,
            service_name: service_name.into(),
            dlq_timestamp,
            retry_count: original.retry_count().next(),
        }
    }

    pub fn original(&self) -> &InboundMessage {
        &self.original
    }

    pub fn error(&self) -> &FailureReason {
        &self.error
    }

    pub fn error_message(&self) -> &str {
        &self.error.message
    }

    pub fn error_kind(&self) -> &str {
        &self.error.kind
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    pub fn dlq_timestamp(&self) -> DateTime<Utc> {
        self.dlq_timestamp
    }

    pub fn retry_count(&self) -> RetryCount {
        self.retry_count
    }

    pub fn event_id(&self) -> Option<&str> {
        self.original.event_id()
    }

    fn timestamp_rfc3339(&self) -> String {
        self.dlq_timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    /// JSON view of the envelope as written to the dead-letter topic
    pub fn payload(&self) -> DeadLetterPayload {
        DeadLetterPayload {
            original_topic: self.original.topic.clone(),
            original_partition: self.original.partition,
            original_offset: self.original.offset,
            original_key: self.original.key_utf8_lossy(),
            original_value: self.original.value_utf8_lossy(),
            original_headers: self.original.headers.clone(),
            error: self.error.clone(),
            service_name: self.service_name.clone(),
            dlq_timestamp: self.timestamp_rfc3339(),
            retry_count: self.retry_count.value(),
        }
    }

    /// Record for `destination`, keyed by the original partition key
    pub fn to_outbound(&self, destination: &str) -> Result<OutboundMessage, serde_json::Error> {
        let mut record_headers: MessageHeaders = self.original.headers.clone();
        record_headers.insert(headers::DLQ_REASON, self.error.message.clone());
        record_headers.insert(headers::DLQ_SERVICE, self.service_name.clone());
        record_headers.insert(headers::DLQ_TIMESTAMP, self.timestamp_rfc3339());
        record_headers.insert(headers::RETRY_COUNT, self.retry_count.to_string());

        let record = OutboundMessage::json(destination, &self.payload())?
            .with_optional_key(self.original.key.clone());
        Ok(OutboundMessage {
            headers: record_headers,
            ..record
        })
    }
}

/// Serialized form of a [`DeadLetterEnvelope`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadLetterPayload {
    pub original_topic: String,
    pub original_partition: i32,
    pub original_offset: i64,
    pub original_key: Option<String>,
    pub original_value: String,
    pub original_headers: MessageHeaders,
    pub error: FailureReason,
    pub service_name: String,
    pub dlq_timestamp: String,
    pub retry_count: u32,
}
