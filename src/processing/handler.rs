//! # Business Handlers
//!
//! The seam between the resilience layer and domain logic. A handler sees
//! one delivery and returns the downstream events it wants published; it
//! never touches offsets, retry headers or the dead-letter topic.

use std::future::Future;

use async_trait::async_trait;
use thiserror::Error;

use crate::messaging::{InboundMessage, OutboundMessage};

/// Kind recorded for failures raised through [`BusinessError::transient`]
pub const TRANSIENT_BUSINESS_ERROR: &str = "TransientBusinessError";

/// Failure raised by business logic
///
/// Every business failure is eligible for a cross-delivery retry until the
/// delivery's retry counter reaches the bound.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct BusinessError {
    kind: String,
    message: String,
}

impl BusinessError {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
        }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(TRANSIENT_BUSINESS_ERROR, message)
    }

    /// Short classification written into dead-letter envelopes
    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<serde_json::Error> for BusinessError {
    fn from(error: serde_json::Error) -> Self {
        Self::new("SerializationError", error.to_string())
    }
}

/// Downstream events produced by one successful business call
///
/// Each event is published in order. Events without a key inherit the
/// inbound key so they land on the same partition as their cause.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HandlerOutput {
    events: Vec<OutboundMessage>,
}

impl HandlerOutput {
    /// Nothing to publish
    pub fn none() -> Self {
        Self::default()
    }

    pub fn single(event: OutboundMessage) -> Self {
        Self {
            events: vec![event],
        }
    }

    pub fn with_event(mut self, event: OutboundMessage) -> Self {
        self.events.push(event);
        self
    }

    pub fn push(&mut self, event: OutboundMessage) {
        self.events.push(event);
    }

    pub fn events(&self) -> &[OutboundMessage] {
        &self.events
    }

    pub fn into_events(self) -> Vec<OutboundMessage> {
        self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

impl From<Vec<OutboundMessage>> for HandlerOutput {
    fn from(events: Vec<OutboundMessage>) -> Self {
        Self { events }
    }
}

/// Domain logic invoked once per non-duplicate, non-poison delivery
#[async_trait]
pub trait BusinessHandler: Send + Sync {
    /// Handle `message`; `attempt` is the zero-based inline retry attempt
    async fn handle(
        &self,
        message: &InboundMessage,
        attempt: u32,
    ) -> Result<HandlerOutput, BusinessError>;
}

/// Adapts an async closure into a [`BusinessHandler`]
///
/// The closure receives an owned copy of the delivery.
pub struct FnHandler<F> {
    handler: F,
}

impl<F> FnHandler<F> {
    pub fn new<Fut>(handler: F) -> Self
    where
        F: Fn(InboundMessage, u32) -> Fut + Send + Sync,
        Fut: Future<Output = Result<HandlerOutput, BusinessError>> + Send,
    {
        Self { handler }
    }
}

impl<F> std::fmt::Debug for FnHandler<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnHandler").finish_non_exhaustive()
    }
}

#[async_trait]
impl<F, Fut> BusinessHandler for FnHandler<F>
where
    F: Fn(InboundMessage, u32) -> Fut + Send + Sync,
    Fut: Future<Output = Result<HandlerOutput, BusinessError>> + Send,
{
    async fn handle(
        &self,
        message: &InboundMessage,
        attempt: u32,
    ) -> Result<HandlerOutput, BusinessError> {
        (self.handler)(message.clone(), attempt).await
    }
}
