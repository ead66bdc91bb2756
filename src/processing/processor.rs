//! # Message Processor
//!
//! Drives one delivery from `Received` to a terminal state:
//!
//! 1. **Poison check**: `retryCount >= max_retries` routes straight to the
//!    dead-letter topic without calling business logic.
//! 2. **Dedup check**: an event id already in the window is acknowledged as a
//!    no-op.
//! 3. **Processing**: the business handler runs under the retry executor,
//!    then every downstream event is published under its own retry bound.
//! 4. **Outcome**: success acks; failure signals a redelivery.
//!
//! The retry counter is read once per delivery and only the poison check
//! consults it, so a failing event is dead-lettered on the delivery after
//! its last budgeted attempt.

use std::sync::Arc;

use tracing::{debug, info, trace};
use uuid::Uuid;

use super::handler::{BusinessHandler, HandlerOutput};
use super::outcome::{AckReason, DeliveryFailure, ProcessingError, ProcessingOutcome, ProcessingResult};
use super::states::{ProcessingEvent, ProcessingState};
use crate::config::ResilienceConfig;
use crate::constants::{headers, UNKNOWN_EVENT_ID};
use crate::dead_letter::{DeadLetterEnvelope, DeadLetterRouter, FailureReason};
use crate::logging::{self, outcome};
use crate::messaging::{InboundMessage, MessagePublisher, OutboundMessage, RetryCount};
use crate::resilience::{DeduplicationCache, ExponentialBackoff, RetryError, RetryExecutor, ShutdownSignal};

/// Retry bounds the processor applies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessorSettings {
    /// Cross-delivery bound, compared against `retryCount`
    pub max_retries: u32,
    /// Inline retries around the business call
    pub business_retries: u32,
    /// Inline retries around each downstream publish
    pub publish_retries: u32,
}

impl ProcessorSettings {
    pub fn from_config(config: &ResilienceConfig) -> Self {
        Self {
            max_retries: config.consumer.max_retries,
            business_retries: config.inline_retry.business_retries,
            publish_retries: config.inline_retry.publish_retries,
        }
    }
}

/// Failure modes of the processing step before they are classified
enum StepFailure {
    Failed(DeliveryFailure),
    Cancelled,
}

impl<E> From<RetryError<E>> for StepFailure
where
    DeliveryFailure: From<E>,
{
    fn from(error: RetryError<E>) -> Self {
        match error {
            RetryError::OperationFailed { last_error, .. } => {
                StepFailure::Failed(DeliveryFailure::from(last_error))
            }
            RetryError::Cancelled { .. } => StepFailure::Cancelled,
        }
    }
}

/// Per-delivery state machine shared by every worker of a consumer
pub struct MessageProcessor {
    settings: ProcessorSettings,
    dedup: Arc<DeduplicationCache>,
    router: DeadLetterRouter,
    publisher: Arc<dyn MessagePublisher>,
    backoff: ExponentialBackoff,
    business_retry: RetryExecutor,
    publish_retry: RetryExecutor,
}

impl std::fmt::Debug for MessageProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageProcessor")
            .field("settings", &self.settings)
            .field("router", &self.router)
            .field("backoff", &self.backoff)
            .finish()
    }
}

impl MessageProcessor {
    /// Build a processor whose dead-letter and downstream records go through `publisher`
    pub fn new(
        config: &ResilienceConfig,
        dedup: Arc<DeduplicationCache>,
        publisher: Arc<dyn MessagePublisher>,
        shutdown: ShutdownSignal,
    ) -> Self {
        let router = DeadLetterRouter::from_config(publisher.clone(), &config.consumer);
        Self {
            settings: ProcessorSettings::from_config(config),
            dedup,
            router,
            publisher,
            backoff: ExponentialBackoff::from_config(&config.backoff),
            business_retry: RetryExecutor::new("business_handler", shutdown.clone()),
            publish_retry: RetryExecutor::new("downstream_publish", shutdown),
        }
    }

    /// Replace the dead-letter router (e.g. to inject a clock)
    pub fn with_router(mut self, router: DeadLetterRouter) -> Self {
        self.router = router;
        self
    }

    pub fn settings(&self) -> ProcessorSettings {
        self.settings
    }

    pub fn dedup_cache(&self) -> &Arc<DeduplicationCache> {
        &self.dedup
    }

    pub fn router(&self) -> &DeadLetterRouter {
        &self.router
    }

    /// Process one delivery to a terminal outcome
    ///
    /// `Err` means no terminal state was reached and the delivery must not
    /// be acknowledged.
    pub async fn process_message(
        &self,
        message: &InboundMessage,
        handler: &dyn BusinessHandler,
    ) -> ProcessingResult<ProcessingOutcome> {
        let retry_count = message.retry_count();
        let event_id = message.event_id();

        let state = advance(ProcessingState::Received, ProcessingEvent::Inspect, message)?;

        if retry_count.is_exhausted(self.settings.max_retries) {
            info!(
                topic = %message.topic,
                partition = message.partition,
                event_id = event_id.unwrap_or(UNKNOWN_EVENT_ID),
                retry_count = %retry_count,
                max_retries = self.settings.max_retries,
                "💀 Poison message detected"
            );
            let envelope = self
                .dead_letter(message, FailureReason::max_retries_exceeded(), retry_count)
                .await?;
            advance(state, ProcessingEvent::RetriesExhausted, message)?;
            return Ok(ProcessingOutcome::DeadLettered(Box::new(envelope)));
        }

        let state = advance(state, ProcessingEvent::WithinRetryBudget, message)?;

        if self.dedup.is_duplicate(event_id) {
            advance(state, ProcessingEvent::DuplicateDetected, message)?;
            self.record(outcome::DUPLICATE, message, retry_count, None);
            return Ok(ProcessingOutcome::Acked(AckReason::Duplicate));
        }

        let state = advance(state, ProcessingEvent::FirstDelivery, message)?;

        let failure = match self.run_business(message, handler).await {
            Ok(()) => {
                advance(state, ProcessingEvent::Succeeded, message)?;
                self.record(outcome::ACKED, message, retry_count, None);
                return Ok(ProcessingOutcome::Acked(AckReason::Processed));
            }
            Err(StepFailure::Cancelled) => {
                self.dedup.forget(event_id);
                self.record(outcome::CANCELLED, message, retry_count, None);
                return Err(ProcessingError::Cancelled);
            }
            Err(StepFailure::Failed(failure)) => failure,
        };

        // The poison check above is the only dead-letter checkpoint: this
        // delivery is inside the budget, so the next one decides exhaustion.
        advance(state, ProcessingEvent::FailedRetryable, message)?;
        // The redelivery must not be mistaken for a duplicate of this attempt
        self.dedup.forget(event_id);
        let details = failure.to_string();
        self.record(outcome::RETRY_SIGNALED, message, retry_count, Some(&details));
        Ok(ProcessingOutcome::RetrySignaled(failure))
    }

    async fn run_business(
        &self,
        message: &InboundMessage,
        handler: &dyn BusinessHandler,
    ) -> Result<(), StepFailure> {
        let output = self
            .business_retry
            .execute(
                move |attempt| handler.handle(message, attempt),
                self.settings.business_retries,
                &self.backoff,
            )
            .await?;

        self.publish_downstream(message, output).await
    }

    async fn publish_downstream(
        &self,
        message: &InboundMessage,
        output: HandlerOutput,
    ) -> Result<(), StepFailure> {
        let original_event_id = message.event_id().unwrap_or(UNKNOWN_EVENT_ID);

        for event in output.into_events() {
            let event = downstream_record(message, event, original_event_id);
            let publisher = &self.publisher;
            let event_ref = &event;

            self.publish_retry
                .execute(
                    move |attempt| {
                        let record = event_ref
                            .clone()
                            .with_header(headers::RETRY_ATTEMPT, attempt.to_string());
                        async move { publisher.publish(record).await }
                    },
                    self.settings.publish_retries,
                    &self.backoff,
                )
                .await?;

            debug!(
                source_topic = %message.topic,
                destination = %event.topic,
                event_id = event.headers.get(headers::EVENT_ID).unwrap_or(UNKNOWN_EVENT_ID),
                original_event_id = %original_event_id,
                "📤 Downstream event published"
            );
        }

        Ok(())
    }

    async fn dead_letter(
        &self,
        message: &InboundMessage,
        reason: FailureReason,
        retry_count: RetryCount,
    ) -> ProcessingResult<DeadLetterEnvelope> {
        match self.router.route(message, reason).await {
            Ok(envelope) => {
                self.record(
                    outcome::DEAD_LETTERED,
                    message,
                    retry_count,
                    Some(envelope.error_message()),
                );
                Ok(envelope)
            }
            Err(e) => {
                let details = e.to_string();
                self.record(outcome::ROUTING_FAILED, message, retry_count, Some(&details));
                Err(ProcessingError::RoutingFailed(e))
            }
        }
    }

    fn record(
        &self,
        outcome_label: &str,
        message: &InboundMessage,
        retry_count: RetryCount,
        details: Option<&str>,
    ) {
        logging::log_message_outcome(
            outcome_label,
            &message.topic,
            message.partition,
            message.offset,
            message.event_id(),
            retry_count.value(),
            details,
        );

        let metric = match outcome_label {
            outcome::ACKED => "resilient_consumer.messages.acked.total",
            outcome::DUPLICATE => "resilient_consumer.messages.duplicates.total",
            outcome::RETRY_SIGNALED => "resilient_consumer.messages.retry_signaled.total",
            outcome::DEAD_LETTERED => "resilient_consumer.messages.dead_lettered.total",
            outcome::ROUTING_FAILED => "resilient_consumer.messages.routing_failed.total",
            _ => return,
        };
        metrics::counter!(
            metric,
            "service" => self.router.service_name().to_string(),
            "topic" => message.topic.clone()
        )
        .increment(1);
    }
}

fn advance(
    state: ProcessingState,
    event: ProcessingEvent,
    message: &InboundMessage,
) -> ProcessingResult<ProcessingState> {
    let next = state.transition(event)?;
    trace!(
        topic = %message.topic,
        partition = message.partition,
        offset = message.offset,
        from = %state,
        to = %next,
        event = event.event_type(),
        "Processing transition"
    );
    Ok(next)
}

/// Fill in the headers and key every downstream record carries
fn downstream_record(
    message: &InboundMessage,
    mut event: OutboundMessage,
    original_event_id: &str,
) -> OutboundMessage {
    if event.key.is_none() {
        event.key = message.key.clone();
    }
    if !event.headers.contains_key(headers::EVENT_ID) {
        event
            .headers
            .insert(headers::EVENT_ID, Uuid::new_v4().to_string());
    }
    if !event.headers.contains_key(headers::ORIGINAL_EVENT_ID) {
        event
            .headers
            .insert(headers::ORIGINAL_EVENT_ID, original_event_id);
    }
    event
}
