#![allow(dead_code)] // Each integration suite uses a different subset

pub mod builders;
pub mod strategies;

pub use builders::*;

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use resilient_consumer::config::ResilienceConfig;
use resilient_consumer::messaging::{
    InboundMessage, MessagePublisher, MessagingError, MessagingResult, OutboundMessage,
};
use resilient_consumer::processing::{BusinessError, BusinessHandler, HandlerOutput};

pub const ORDERS_TOPIC: &str = "orders.created";
pub const DLQ_TOPIC: &str = "payments.dlq";
pub const AUTHORIZED_TOPIC: &str = "payments.authorized";
pub const SERVICE_NAME: &str = "paiement-svc";

/// Configuration with millisecond backoff for fast tests
pub fn test_config() -> ResilienceConfig {
    let mut config = ResilienceConfig::default();
    config.consumer.service_name = SERVICE_NAME.to_string();
    config.consumer.dead_letter_topic = DLQ_TOPIC.to_string();
    config.backoff.initial_delay_ms = 1;
    config.backoff.max_delay_ms = 10;
    config
}

/// Publisher that records every attempt and fails on demand
#[derive(Debug, Default)]
pub struct RecordingPublisher {
    attempts: Mutex<Vec<OutboundMessage>>,
    published: Mutex<Vec<OutboundMessage>>,
    failing_topics: Mutex<Vec<String>>,
    remaining_failures: AtomicU32,
}

impl RecordingPublisher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Every publish to `topic` fails
    pub fn fail_topic(&self, topic: &str) {
        self.failing_topics.lock().push(topic.to_string());
    }

    /// The next `count` publishes (any topic) fail
    pub fn fail_next(&self, count: u32) {
        self.remaining_failures.store(count, Ordering::SeqCst);
    }

    pub fn attempts(&self) -> Vec<OutboundMessage> {
        self.attempts.lock().clone()
    }

    pub fn published(&self) -> Vec<OutboundMessage> {
        self.published.lock().clone()
    }

    pub fn published_to(&self, topic: &str) -> Vec<OutboundMessage> {
        self.published
            .lock()
            .iter()
            .filter(|m| m.topic == topic)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl MessagePublisher for RecordingPublisher {
    async fn publish(&self, message: OutboundMessage) -> MessagingResult<()> {
        self.attempts.lock().push(message.clone());

        if self.failing_topics.lock().contains(&message.topic) {
            return Err(MessagingError::publish_failed(&message.topic, "broker unavailable"));
        }

        let remaining = self.remaining_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.remaining_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(MessagingError::publish_failed(&message.topic, "leader not available"));
        }

        self.published.lock().push(message);
        Ok(())
    }
}

/// Business handler that replays a scripted sequence of results
///
/// Once the script is exhausted every call succeeds with a single event to
/// `AUTHORIZED_TOPIC`.
#[derive(Debug, Default)]
pub struct ScriptedHandler {
    script: Mutex<VecDeque<Result<HandlerOutput, BusinessError>>>,
    always_fail: bool,
    calls: AtomicU32,
    attempts_seen: Mutex<Vec<u32>>,
}

impl ScriptedHandler {
    pub fn succeeding() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_script(script: Vec<Result<HandlerOutput, BusinessError>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            ..Self::default()
        })
    }

    /// Fail the first `failures` calls with a transient error
    pub fn failing_times(failures: usize) -> Arc<Self> {
        Self::with_script(
            (0..failures)
                .map(|n| Err(BusinessError::transient(format!("gateway timeout #{n}"))))
                .collect(),
        )
    }

    /// Fail every call
    pub fn always_failing() -> Arc<Self> {
        Arc::new(Self {
            always_fail: true,
            ..Self::default()
        })
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn attempts_seen(&self) -> Vec<u32> {
        self.attempts_seen.lock().clone()
    }
}

#[async_trait]
impl BusinessHandler for ScriptedHandler {
    async fn handle(
        &self,
        _message: &InboundMessage,
        attempt: u32,
    ) -> Result<HandlerOutput, BusinessError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.attempts_seen.lock().push(attempt);

        if self.always_fail {
            return Err(BusinessError::transient("payment gateway down"));
        }

        match self.script.lock().pop_front() {
            Some(result) => result,
            None => Ok(HandlerOutput::single(OutboundMessage::new(
                AUTHORIZED_TOPIC,
                br#"{"status":"AUTHORIZED"}"#.to_vec(),
            ))),
        }
    }
}
