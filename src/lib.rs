#![allow(clippy::doc_markdown)] // Allow technical terms like Kafka, DLQ in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Resilient Consumer
//!
//! Consumer-side resilience layer for event-driven services running over a
//! partitioned message broker.
//!
//! ## Overview
//!
//! A worker consuming from a broker with at-least-once delivery needs a
//! disciplined way to:
//!
//! - never act twice on the same logical event within a bounded window
//! - retry transient failures with increasing delay
//! - recognize events that have exhausted their retries
//! - shunt those events to a dead-letter topic with enough context to
//!   diagnose and reprocess them later
//!
//! ## Module Organization
//!
//! - [`resilience`] - Dedup cache, exponential backoff, retry executor, shutdown
//! - [`dead_letter`] - Dead-letter envelopes and the router that publishes them
//! - [`processing`] - Per-delivery state machine and the business handler seam
//! - [`worker`] - Partition workers and the supervisor that runs them
//! - [`messaging`] - Broker client traits, message types, in-memory broker
//! - [`config`] - Configuration management
//! - [`error`] - Structured error handling
//! - [`logging`] - Structured logging setup and outcome logging
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use resilient_consumer::config::ResilienceConfig;
//! use resilient_consumer::messaging::{InMemoryBroker, InboundMessage, OutboundMessage};
//! use resilient_consumer::processing::{BusinessError, FnHandler, HandlerOutput};
//! use resilient_consumer::worker::ConsumerSupervisor;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let broker = InMemoryBroker::new(3);
//! let handler = FnHandler::new(|message: InboundMessage, _attempt: u32| async move {
//!     Ok::<_, BusinessError>(HandlerOutput::single(OutboundMessage::new(
//!         "orders.audited",
//!         message.value,
//!     )))
//! });
//!
//! let mut supervisor = ConsumerSupervisor::new(
//!     ResilienceConfig::default(),
//!     Arc::new(broker.clone()),
//!     Arc::new(handler),
//! )?;
//! supervisor.spawn_all(broker.topic_sources("orders.created"))?;
//!
//! // ... later
//! for (assignment, result) in supervisor.shutdown_and_join().await {
//!     println!("{assignment:?} exited with {result:?}");
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod constants;
pub mod dead_letter;
pub mod error;
pub mod logging;
pub mod messaging;
pub mod processing;
pub mod resilience;
pub mod worker;

pub use config::{ConfigManager, ResilienceConfig, RoutingFailurePolicy};
pub use dead_letter::{DeadLetterEnvelope, DeadLetterRouter, FailureReason, RoutingFailed};
pub use error::{ConsumerError, Result};
pub use messaging::{
    InMemoryBroker, InboundMessage, MessageHeaders, MessagePublisher, MessageSource,
    MessagingError, OutboundMessage, RetryCount,
};
pub use processing::{
    AckReason, BusinessError, BusinessHandler, DeliveryFailure, FnHandler, HandlerOutput,
    MessageProcessor, ProcessingError, ProcessingOutcome, ProcessingState,
};
pub use resilience::{
    DeduplicationCache, ExponentialBackoff, RetryError, RetryExecutor, ShutdownSignal,
};
pub use worker::{ConsumerSupervisor, PartitionWorker, WorkerStats};
