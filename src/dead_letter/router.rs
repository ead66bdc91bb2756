//! # Dead-Letter Router
//!
//! Publishes dead-letter envelopes. A failed publish is never retried here
//! and never swallowed: it comes back as [`RoutingFailed`] so the caller can
//! decide between halting and alerting, and the message stays unacknowledged.

use std::sync::Arc;

use thiserror::Error;
use tracing::{error, warn};

use super::envelope::{DeadLetterEnvelope, FailureReason};
use crate::config::ConsumerConfig;
use crate::messaging::{InboundMessage, MessagePublisher, MessagingError};
use crate::resilience::{Clock, SystemClock};

/// Publishing the dead-letter record failed; fatal for this delivery
#[derive(Debug, Error)]
#[error("Dead-letter publish to {destination} failed: {source}")]
pub struct RoutingFailed {
    pub destination: String,
    pub envelope: Box<DeadLetterEnvelope>,
    #[source]
    pub source: MessagingError,
}

pub struct DeadLetterRouter {
    publisher: Arc<dyn MessagePublisher>,
    service_name: String,
    destination: String,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for DeadLetterRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeadLetterRouter")
            .field("service_name", &self.service_name)
            .field("destination", &self.destination)
            .finish()
    }
}

impl DeadLetterRouter {
    pub fn new(
        publisher: Arc<dyn MessagePublisher>,
        service_name: impl Into<String>,
        destination: impl Into<String>,
    ) -> Self {
        Self {
            publisher,
            service_name: service_name.into(),
            destination: destination.into(),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn from_config(publisher: Arc<dyn MessagePublisher>, config: &ConsumerConfig) -> Self {
        Self::new(publisher, &config.service_name, &config.dead_letter_topic)
    }

    /// Use `clock` for envelope timestamps
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn destination(&self) -> &str {
        &self.destination
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    /// Build the envelope for `message` and publish it to the destination
    pub async fn route(
        &self,
        message: &InboundMessage,
        reason: FailureReason,
    ) -> Result<DeadLetterEnvelope, RoutingFailed> {
        let envelope = DeadLetterEnvelope::new(
            message,
            reason,
            self.service_name.clone(),
            self.clock.wall_time(),
        );

        let record = match envelope.to_outbound(&self.destination) {
            Ok(record) => record,
            Err(e) => return Err(self.failed(envelope, MessagingError::from(e))),
        };

        match self.publisher.publish(record).await {
            Ok(()) => {
                warn!(
                    destination = %self.destination,
                    topic = %message.topic,
                    partition = message.partition,
                    offset = message.offset,
                    event_id = message.event_id().unwrap_or(crate::constants::UNKNOWN_EVENT_ID),
                    retry_count = %envelope.retry_count(),
                    reason = %envelope.error_message(),
                    "💀 DLQ → Message sent to dead-letter topic"
                );
                Ok(envelope)
            }
            Err(e) => Err(self.failed(envelope, e)),
        }
    }

    fn failed(&self, envelope: DeadLetterEnvelope, source: MessagingError) -> RoutingFailed {
        error!(
            destination = %self.destination,
            topic = %envelope.original().topic,
            partition = envelope.original().partition,
            offset = envelope.original().offset,
            error = %source,
            "❌ Failed to send message to dead-letter topic"
        );
        RoutingFailed {
            destination: self.destination.clone(),
            envelope: Box::new(envelope),
            source,
        }
    }
}
