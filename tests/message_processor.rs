//! End-to-end processing of single deliveries: poison check, dedup,
//! business retries, downstream publishing and dead-lettering.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{
    order_message, test_config, OrderMessageBuilder, RecordingPublisher, ScriptedHandler,
    AUTHORIZED_TOPIC, DLQ_TOPIC,
};
use resilient_consumer::config::ResilienceConfig;
use resilient_consumer::messaging::RetryCount;
use resilient_consumer::processing::{
    AckReason, BusinessError, DeliveryFailure, HandlerOutput, MessageProcessor, ProcessingError,
    ProcessingOutcome, ProcessingState,
};
use resilient_consumer::resilience::{DeduplicationCache, ShutdownSignal};

fn processor_with(
    config: &ResilienceConfig,
    publisher: Arc<RecordingPublisher>,
    shutdown: ShutdownSignal,
) -> MessageProcessor {
    let dedup = Arc::new(DeduplicationCache::new(1_000, Duration::from_secs(60)));
    MessageProcessor::new(config, dedup, publisher, shutdown)
}

fn processor(config: &ResilienceConfig, publisher: Arc<RecordingPublisher>) -> MessageProcessor {
    processor_with(config, publisher, ShutdownSignal::new())
}

#[tokio::test]
async fn test_exhausted_retry_count_goes_straight_to_dead_letter() {
    let publisher = RecordingPublisher::new();
    let processor = processor(&test_config(), publisher.clone());
    let handler = ScriptedHandler::succeeding();

    let outcome = processor
        .process_message(&order_message("evt-1", 3), handler.as_ref())
        .await
        .unwrap();

    let envelope = match outcome {
        ProcessingOutcome::DeadLettered(envelope) => envelope,
        other => panic!("expected dead-letter, got {other:?}"),
    };
    assert_eq!(envelope.retry_count(), RetryCount::new(4));
    assert_eq!(envelope.error_kind(), "PoisonMessage");
    assert_eq!(handler.calls(), 0);

    assert_eq!(publisher.published_to(DLQ_TOPIC).len(), 1);
    assert!(publisher.published_to(AUTHORIZED_TOPIC).is_empty());
}

#[tokio::test]
async fn test_poison_message_is_not_remembered_by_dedup() {
    let publisher = RecordingPublisher::new();
    let processor = processor(&test_config(), publisher.clone());
    let handler = ScriptedHandler::succeeding();

    processor
        .process_message(&order_message("evt-1", 5), handler.as_ref())
        .await
        .unwrap();

    assert!(processor.dedup_cache().is_empty());
}

#[tokio::test]
async fn test_duplicate_delivery_skips_business_logic() {
    let publisher = RecordingPublisher::new();
    let processor = processor(&test_config(), publisher.clone());
    let handler = ScriptedHandler::succeeding();

    let first = processor
        .process_message(&order_message("evt-1", 0), handler.as_ref())
        .await
        .unwrap();
    let second = processor
        .process_message(&order_message("evt-1", 0), handler.as_ref())
        .await
        .unwrap();

    assert_eq!(first, ProcessingOutcome::Acked(AckReason::Processed));
    assert_eq!(second, ProcessingOutcome::Acked(AckReason::Duplicate));
    assert_eq!(handler.calls(), 1);
    assert_eq!(publisher.published_to(AUTHORIZED_TOPIC).len(), 1);
}

#[tokio::test]
async fn test_missing_event_id_is_never_deduplicated() {
    let publisher = RecordingPublisher::new();
    let processor = processor(&test_config(), publisher.clone());
    let handler = ScriptedHandler::succeeding();
    let message = OrderMessageBuilder::new().without_event_id().build();

    for _ in 0..2 {
        let outcome = processor
            .process_message(&message, handler.as_ref())
            .await
            .unwrap();
        assert_eq!(outcome, ProcessingOutcome::Acked(AckReason::Processed));
    }

    assert_eq!(handler.calls(), 2);
    let downstream = publisher.published_to(AUTHORIZED_TOPIC);
    assert_eq!(downstream.len(), 2);
    assert!(downstream
        .iter()
        .all(|record| record.headers.get("originalEventId") == Some("unknown")));
}

#[tokio::test]
async fn test_inline_business_retry_recovers_within_one_delivery() {
    let mut config = test_config();
    config.inline_retry.business_retries = 1;
    let publisher = RecordingPublisher::new();
    let processor = processor(&config, publisher.clone());
    let handler = ScriptedHandler::failing_times(1);

    let outcome = processor
        .process_message(&order_message("evt-1", 0), handler.as_ref())
        .await
        .unwrap();

    assert_eq!(outcome, ProcessingOutcome::Acked(AckReason::Processed));
    assert_eq!(handler.attempts_seen(), vec![0, 1]);
    assert_eq!(publisher.published_to(AUTHORIZED_TOPIC).len(), 1);
    assert!(publisher.published_to(DLQ_TOPIC).is_empty());
}

#[tokio::test]
async fn test_downstream_records_carry_lineage_headers() {
    let publisher = RecordingPublisher::new();
    let processor = processor(&test_config(), publisher.clone());
    let handler = ScriptedHandler::succeeding();

    processor
        .process_message(&order_message("evt-42", 0), handler.as_ref())
        .await
        .unwrap();

    let record = &publisher.published_to(AUTHORIZED_TOPIC)[0];
    assert_eq!(record.headers.get("originalEventId"), Some("evt-42"));
    assert_eq!(record.headers.get("retryAttempt"), Some("0"));
    assert_eq!(record.key.as_deref(), Some(&b"order-1"[..]));

    let event_id = record.headers.get("eventId").unwrap();
    assert_ne!(event_id, "evt-42");
    assert!(uuid::Uuid::parse_str(event_id).is_ok());
}

#[tokio::test]
async fn test_transient_publish_failures_are_retried_with_attempt_header() {
    let publisher = RecordingPublisher::new();
    publisher.fail_next(2);
    let processor = processor(&test_config(), publisher.clone());
    let handler = ScriptedHandler::succeeding();

    let outcome = processor
        .process_message(&order_message("evt-1", 0), handler.as_ref())
        .await
        .unwrap();

    assert_eq!(outcome, ProcessingOutcome::Acked(AckReason::Processed));
    assert_eq!(handler.calls(), 1);

    let attempts: Vec<_> = publisher
        .attempts()
        .iter()
        .map(|record| record.headers.get("retryAttempt").unwrap_or("").to_string())
        .collect();
    assert_eq!(attempts, vec!["0", "1", "2"]);

    let published = publisher.published_to(AUTHORIZED_TOPIC);
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].headers.get("retryAttempt"), Some("2"));
}

#[tokio::test]
async fn test_exhausted_publish_retries_signal_redelivery() {
    let mut config = test_config();
    config.inline_retry.publish_retries = 1;
    let publisher = RecordingPublisher::new();
    publisher.fail_topic(AUTHORIZED_TOPIC);
    let processor = processor(&config, publisher.clone());
    let handler = ScriptedHandler::succeeding();

    let outcome = processor
        .process_message(&order_message("evt-1", 0), handler.as_ref())
        .await
        .unwrap();

    match outcome {
        ProcessingOutcome::RetrySignaled(DeliveryFailure::Publish(_)) => {}
        other => panic!("expected publish failure, got {other:?}"),
    }
    assert_eq!(publisher.attempts().len(), 2);
    assert!(publisher.published_to(DLQ_TOPIC).is_empty());
}

#[tokio::test]
async fn test_business_failure_signals_retry_and_allows_redelivery() {
    let publisher = RecordingPublisher::new();
    let processor = processor(&test_config(), publisher.clone());
    let handler = ScriptedHandler::failing_times(1);

    let message = order_message("evt-1", 0);
    let outcome = processor
        .process_message(&message, handler.as_ref())
        .await
        .unwrap();

    assert!(!outcome.commits_offset());
    assert_eq!(outcome.state(), ProcessingState::RetrySignaled);

    let redelivery = message.redelivery(message.retry_count().next());
    let outcome = processor
        .process_message(&redelivery, handler.as_ref())
        .await
        .unwrap();

    assert_eq!(outcome, ProcessingOutcome::Acked(AckReason::Processed));
    assert_eq!(handler.calls(), 2);
}

#[tokio::test]
async fn test_always_failing_message_dead_lettered_after_max_retries() {
    let publisher = RecordingPublisher::new();
    let processor = processor(&test_config(), publisher.clone());
    let handler = ScriptedHandler::always_failing();

    let mut message = order_message("evt-1", 0);
    let outcome = loop {
        let outcome = processor
            .process_message(&message, handler.as_ref())
            .await
            .unwrap();
        match outcome {
            ProcessingOutcome::RetrySignaled(_) => {
                message = message.redelivery(message.retry_count().next());
            }
            terminal => break terminal,
        }
    };

    // Deliveries with retryCount 0, 1 and 2 reach the handler; 3 is poison
    assert_eq!(handler.calls(), 3);
    match outcome {
        ProcessingOutcome::DeadLettered(envelope) => {
            assert_eq!(envelope.retry_count(), RetryCount::new(4));
            assert_eq!(envelope.original().retry_count(), RetryCount::new(3));
        }
        other => panic!("expected dead-letter, got {other:?}"),
    }
    assert_eq!(publisher.published_to(DLQ_TOPIC).len(), 1);
}

#[tokio::test]
async fn test_zero_max_retries_dead_letters_every_delivery() {
    let mut config = test_config();
    config.consumer.max_retries = 0;
    let publisher = RecordingPublisher::new();
    let processor = processor(&config, publisher.clone());
    let handler = ScriptedHandler::succeeding();

    let outcome = processor
        .process_message(&order_message("evt-1", 0), handler.as_ref())
        .await
        .unwrap();

    assert_eq!(outcome.state(), ProcessingState::DeadLettered);
    assert_eq!(handler.calls(), 0);
}

#[tokio::test]
async fn test_dead_letter_publish_failure_is_fatal() {
    let publisher = RecordingPublisher::new();
    publisher.fail_topic(DLQ_TOPIC);
    let processor = processor(&test_config(), publisher.clone());
    let handler = ScriptedHandler::succeeding();

    let err = processor
        .process_message(&order_message("evt-1", 3), handler.as_ref())
        .await
        .unwrap_err();

    match err {
        ProcessingError::RoutingFailed(failed) => {
            assert_eq!(failed.destination, DLQ_TOPIC);
            assert_eq!(failed.envelope.retry_count(), RetryCount::new(4));
        }
        other => panic!("expected routing failure, got {other:?}"),
    }
    assert_eq!(handler.calls(), 0);
}

#[tokio::test]
async fn test_unparsable_retry_count_treated_as_first_delivery() {
    let publisher = RecordingPublisher::new();
    let processor = processor(&test_config(), publisher.clone());
    let handler = ScriptedHandler::succeeding();
    let message = OrderMessageBuilder::new().with_raw_retry_count("abc").build();

    let outcome = processor
        .process_message(&message, handler.as_ref())
        .await
        .unwrap();

    assert_eq!(outcome, ProcessingOutcome::Acked(AckReason::Processed));
    assert_eq!(handler.calls(), 1);
}

#[tokio::test]
async fn test_handler_output_with_multiple_events_publishes_each() {
    let publisher = RecordingPublisher::new();
    let processor = processor(&test_config(), publisher.clone());
    let output = HandlerOutput::none()
        .with_event(resilient_consumer::messaging::OutboundMessage::new(
            AUTHORIZED_TOPIC,
            b"{}".to_vec(),
        ))
        .with_event(resilient_consumer::messaging::OutboundMessage::new(
            "payments.audit",
            b"{}".to_vec(),
        ));
    let handler = ScriptedHandler::with_script(vec![Ok(output)]);

    processor
        .process_message(&order_message("evt-1", 0), handler.as_ref())
        .await
        .unwrap();

    assert_eq!(publisher.published_to(AUTHORIZED_TOPIC).len(), 1);
    assert_eq!(publisher.published_to("payments.audit").len(), 1);
}

#[tokio::test]
async fn test_shutdown_during_business_backoff_cancels_delivery() {
    let mut config = test_config();
    config.inline_retry.business_retries = 2;
    let publisher = RecordingPublisher::new();
    let shutdown = ShutdownSignal::new();
    let processor = processor_with(&config, publisher.clone(), shutdown.clone());
    let handler = ScriptedHandler::with_script(vec![Err(BusinessError::transient("timeout"))]);

    shutdown.trigger();
    let err = processor
        .process_message(&order_message("evt-1", 0), handler.as_ref())
        .await
        .unwrap_err();

    assert!(matches!(err, ProcessingError::Cancelled));
    assert_eq!(handler.calls(), 1);
    assert!(publisher.published().is_empty());
    // Cancelled deliveries are redelivered, so the id must not look handled
    assert!(processor.dedup_cache().is_empty());
}
