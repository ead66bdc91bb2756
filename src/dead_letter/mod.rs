//! # Dead-Letter Module
//!
//! Converts a failed inbound message plus its error context into an
//! envelope on the dead-letter topic.

pub mod envelope;
pub mod router;

pub use envelope::{DeadLetterEnvelope, DeadLetterPayload, FailureReason};
pub use router::{DeadLetterRouter, RoutingFailed};
