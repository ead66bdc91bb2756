//! # Broker Client Interfaces
//!
//! The resilience layer never talks to a broker directly. It consumes these
//! two traits, implemented by whatever broker client the service uses
//! (Kafka, an in-memory broker for tests, ...).
//!
//! Header propagation is the implementor's job: when a delivery is signaled
//! for retry, the redelivered copy must carry an incremented `retryCount`.

use async_trait::async_trait;
use std::sync::Arc;

use super::errors::MessagingResult;
use super::message::{InboundMessage, OutboundMessage};

/// Source of deliveries for a single assigned partition
#[async_trait]
pub trait MessageSource: Send + Sync {
    /// Suspend until the next message is available
    ///
    /// Returns `Ok(None)` once the source is closed and drained.
    async fn receive(&self) -> MessagingResult<Option<InboundMessage>>;

    /// Commit progress past `message`
    async fn acknowledge(&self, message: &InboundMessage) -> MessagingResult<()>;

    /// Withhold acknowledgment of `message` so the broker redelivers it
    async fn signal_retry(&self, message: &InboundMessage, reason: &str) -> MessagingResult<()>;

    /// Human-readable `topic/partition` label for logs
    fn assignment(&self) -> (String, i32);
}

/// Producer side of the broker client
#[async_trait]
pub trait MessagePublisher: Send + Sync {
    async fn publish(&self, message: OutboundMessage) -> MessagingResult<()>;
}

#[async_trait]
impl<T: MessagePublisher + ?Sized> MessagePublisher for Arc<T> {
    async fn publish(&self, message: OutboundMessage) -> MessagingResult<()> {
        (**self).publish(message).await
    }
}
