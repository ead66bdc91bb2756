//! # Messaging Module
//!
//! Message types and the broker-client seams the resilience layer consumes,
//! plus an in-memory broker that honours the redelivery contract.

pub mod client;
pub mod errors;
pub mod in_memory;
pub mod message;

pub use client::{MessagePublisher, MessageSource};
pub use errors::{MessagingError, MessagingResult};
pub use in_memory::{InMemoryBroker, InMemoryPartitionSource};
pub use message::{InboundMessage, MessageHeaders, OutboundMessage, RetryCount};
