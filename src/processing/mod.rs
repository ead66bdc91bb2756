//! # Processing State Machine
//!
//! Per-delivery sequencing of poison check, dedup check, business call and
//! the resulting ack, redelivery signal or dead-letter routing.

pub mod handler;
pub mod outcome;
pub mod processor;
pub mod states;

pub use handler::{BusinessError, BusinessHandler, FnHandler, HandlerOutput, TRANSIENT_BUSINESS_ERROR};
pub use outcome::{AckReason, DeliveryFailure, ProcessingError, ProcessingOutcome, ProcessingResult};
pub use processor::{MessageProcessor, ProcessorSettings};
pub use states::{InvalidTransition, ProcessingEvent, ProcessingState};
