//! # Constants
//!
//! Header names, topic conventions and default values shared across the
//! consumer resilience layer. Header names match the ones producers in the
//! surrounding services already write, so they must stay byte-for-byte stable.

/// Message header names read and written by the resilience layer
pub mod headers {
    /// Logical event identifier used for deduplication
    pub const EVENT_ID: &str = "eventId";
    /// Number of times this logical event has already been redelivered
    pub const RETRY_COUNT: &str = "retryCount";
    /// Business event type tag (e.g. `PaymentAuthorized`)
    pub const EVENT_TYPE: &str = "eventType";
    /// Event id of the inbound event that caused a downstream event
    pub const ORIGINAL_EVENT_ID: &str = "originalEventId";
    /// Zero-based attempt number of a downstream publish
    pub const RETRY_ATTEMPT: &str = "retryAttempt";
    /// Error message that sent the event to the dead-letter topic
    pub const DLQ_REASON: &str = "dlqReason";
    /// Service that dead-lettered the event
    pub const DLQ_SERVICE: &str = "dlqService";
    /// RFC 3339 timestamp of dead-lettering
    pub const DLQ_TIMESTAMP: &str = "dlqTimestamp";
}

/// Default configuration values
pub mod defaults {
    /// Cross-delivery retry bound
    pub const MAX_RETRIES: u32 = 3;
    /// Dedup window (1 hour)
    pub const DEDUP_TTL_MS: u64 = 3_600_000;
    /// Dedup capacity
    pub const DEDUP_MAX_SIZE: usize = 10_000;
    pub const BACKOFF_INITIAL_DELAY_MS: u64 = 100;
    pub const BACKOFF_MAX_DELAY_MS: u64 = 30_000;
    pub const BACKOFF_MULTIPLIER: f64 = 2.0;
    /// Inline retries around the business call
    pub const INLINE_BUSINESS_RETRIES: u32 = 0;
    /// Inline retries around each downstream publish
    pub const INLINE_PUBLISH_RETRIES: u32 = 3;
    pub const SERVICE_NAME: &str = "resilient-consumer";
    pub const DEAD_LETTER_TOPIC: &str = "events.dlq";
}

/// Error message used when a delivery arrives with an exhausted retry counter
pub const MAX_RETRIES_EXCEEDED: &str = "max retries exceeded";

/// Error kind recorded for poison messages detected before processing
pub const POISON_MESSAGE_KIND: &str = "PoisonMessage";

/// Placeholder written to `originalEventId` when the inbound event had no id
pub const UNKNOWN_EVENT_ID: &str = "unknown";
