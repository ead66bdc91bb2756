//! # In-Memory Broker
//!
//! Thread-safe in-memory broker for tests, demos and local development.
//!
//! ## Features
//!
//! - **Partitioned Logs**: records are routed by key hash, FIFO per partition
//! - **Redelivery**: a delivery signaled for retry goes back to the head of
//!   its partition carrying `retryCount + 1`
//! - **Subscriptions**: records published to a topic with a partition source
//!   are queued for consumption; records to any other topic are retained for
//!   inspection until drained with [`InMemoryBroker::take_published`]
//! - **Inspection**: acknowledged offsets and retry signals are retained for
//!   assertions
//! - **Failure Injection**: publishes to a topic can be made to fail always
//!   or for the next `n` attempts

use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, HashSet, VecDeque};
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::debug;

use super::client::{MessagePublisher, MessageSource};
use super::errors::{MessagingError, MessagingResult};
use super::message::{InboundMessage, MessageHeaders, OutboundMessage};

type PartitionKey = (String, i32);

#[derive(Debug, Default)]
struct PartitionLog {
    pending: VecDeque<InboundMessage>,
    next_offset: i64,
    acknowledged: Vec<i64>,
    retry_signals: u64,
}

#[derive(Debug, Clone, Copy)]
enum PublishFailure {
    Always,
    Remaining(usize),
}

#[derive(Debug)]
struct BrokerState {
    partitions_per_topic: i32,
    logs: Mutex<HashMap<PartitionKey, PartitionLog>>,
    /// Records to topics without a subscriber, in publish order
    published: Mutex<Vec<OutboundMessage>>,
    subscriptions: Mutex<HashSet<String>>,
    publish_failures: Mutex<HashMap<String, PublishFailure>>,
    notify: Notify,
    closed: AtomicBool,
}

/// In-memory broker shared by every partition source and publisher handle
#[derive(Debug, Clone)]
pub struct InMemoryBroker {
    state: Arc<BrokerState>,
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new(1)
    }
}

impl InMemoryBroker {
    /// Create a broker whose topics all have `partitions_per_topic` partitions
    pub fn new(partitions_per_topic: i32) -> Self {
        Self {
            state: Arc::new(BrokerState {
                partitions_per_topic: partitions_per_topic.max(1),
                logs: Mutex::new(HashMap::new()),
                published: Mutex::new(Vec::new()),
                subscriptions: Mutex::new(HashSet::new()),
                publish_failures: Mutex::new(HashMap::new()),
                notify: Notify::new(),
                closed: AtomicBool::new(false),
            }),
        }
    }

    pub fn partitions_per_topic(&self) -> i32 {
        self.state.partitions_per_topic
    }

    /// Partition a key maps to; keyless records go to partition 0
    pub fn partition_for(&self, key: Option<&[u8]>) -> i32 {
        match key {
            None => 0,
            Some(bytes) => {
                let mut hasher = DefaultHasher::new();
                bytes.hash(&mut hasher);
                (hasher.finish() % self.state.partitions_per_topic as u64) as i32
            }
        }
    }

    /// Append a record directly to a partition, returning the delivery
    pub fn enqueue(
        &self,
        topic: &str,
        partition: i32,
        key: Option<Vec<u8>>,
        value: Vec<u8>,
        headers: MessageHeaders,
    ) -> InboundMessage {
        let message = {
            let mut logs = self.state.logs.lock();
            let log = logs.entry((topic.to_string(), partition)).or_default();
            let message = InboundMessage {
                topic: topic.to_string(),
                partition,
                offset: log.next_offset,
                key,
                value,
                headers,
            };
            log.next_offset += 1;
            log.pending.push_back(message.clone());
            message
        };
        self.state.notify.notify_waiters();
        message
    }

    /// Queue later publishes to `topic` for consumption instead of retaining them
    ///
    /// Records published before the subscription are not replayed.
    pub fn subscribe(&self, topic: &str) {
        self.state.subscriptions.lock().insert(topic.to_string());
    }

    pub fn is_subscribed(&self, topic: &str) -> bool {
        self.state.subscriptions.lock().contains(topic)
    }

    /// Source handle for one partition assignment; subscribes to `topic`
    pub fn partition_source(&self, topic: &str, partition: i32) -> InMemoryPartitionSource {
        self.subscribe(topic);
        InMemoryPartitionSource {
            broker: self.clone(),
            topic: topic.to_string(),
            partition,
        }
    }

    /// Sources for every partition of `topic`
    pub fn topic_sources(&self, topic: &str) -> Vec<InMemoryPartitionSource> {
        (0..self.state.partitions_per_topic)
            .map(|partition| self.partition_source(topic, partition))
            .collect()
    }

    /// Make every publish to `topic` fail
    pub fn fail_publishes_to(&self, topic: &str) {
        self.state
            .publish_failures
            .lock()
            .insert(topic.to_string(), PublishFailure::Always);
    }

    /// Make the next `count` publishes to `topic` fail
    pub fn fail_next_publishes_to(&self, topic: &str, count: usize) {
        self.state
            .publish_failures
            .lock()
            .insert(topic.to_string(), PublishFailure::Remaining(count));
    }

    pub fn restore_publishes_to(&self, topic: &str) {
        self.state.publish_failures.lock().remove(topic);
    }

    /// Retained records published to the unsubscribed `topic`, in publish order
    pub fn published(&self, topic: &str) -> Vec<OutboundMessage> {
        self.state
            .published
            .lock()
            .iter()
            .filter(|m| m.topic == topic)
            .cloned()
            .collect()
    }

    /// Remove and return the retained records for `topic`
    pub fn take_published(&self, topic: &str) -> Vec<OutboundMessage> {
        let mut published = self.state.published.lock();
        let (taken, kept): (Vec<_>, Vec<_>) = published
            .drain(..)
            .partition(|m| m.topic == topic);
        *published = kept;
        taken
    }

    /// Offsets acknowledged on a partition, in acknowledgment order
    pub fn acknowledged(&self, topic: &str, partition: i32) -> Vec<i64> {
        self.state
            .logs
            .lock()
            .get(&(topic.to_string(), partition))
            .map(|log| log.acknowledged.clone())
            .unwrap_or_default()
    }

    pub fn retry_signals(&self, topic: &str, partition: i32) -> u64 {
        self.state
            .logs
            .lock()
            .get(&(topic.to_string(), partition))
            .map(|log| log.retry_signals)
            .unwrap_or(0)
    }

    /// Deliveries waiting on a partition
    pub fn pending(&self, topic: &str, partition: i32) -> usize {
        self.state
            .logs
            .lock()
            .get(&(topic.to_string(), partition))
            .map(|log| log.pending.len())
            .unwrap_or(0)
    }

    /// Close the broker; sources drain what is pending and then end
    pub fn close(&self) {
        self.state.closed.store(true, Ordering::SeqCst);
        self.state.notify.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        self.state.closed.load(Ordering::SeqCst)
    }

    fn try_pop(&self, topic: &str, partition: i32) -> Option<InboundMessage> {
        self.state
            .logs
            .lock()
            .get_mut(&(topic.to_string(), partition))
            .and_then(|log| log.pending.pop_front())
    }

    fn check_publish_failure(&self, topic: &str) -> MessagingResult<()> {
        let mut failures = self.state.publish_failures.lock();
        match failures.get_mut(topic) {
            Some(PublishFailure::Always) => Err(MessagingError::publish_failed(
                topic,
                "injected publish failure",
            )),
            Some(PublishFailure::Remaining(remaining)) if *remaining > 0 => {
                *remaining -= 1;
                Err(MessagingError::publish_failed(
                    topic,
                    "injected transient publish failure",
                ))
            }
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl MessagePublisher for InMemoryBroker {
    async fn publish(&self, message: OutboundMessage) -> MessagingResult<()> {
        if self.is_closed() {
            return Err(MessagingError::closed("in-memory broker is closed"));
        }
        self.check_publish_failure(&message.topic)?;

        if !self.is_subscribed(&message.topic) {
            debug!(topic = %message.topic, "📤 In-memory publish retained (no subscriber)");
            self.state.published.lock().push(message);
            return Ok(());
        }

        let partition = self.partition_for(message.key.as_deref());
        debug!(topic = %message.topic, partition, "📤 In-memory publish");
        self.enqueue(
            &message.topic,
            partition,
            message.key,
            message.value,
            message.headers,
        );
        Ok(())
    }
}

/// Partition assignment handle over an [`InMemoryBroker`]
#[derive(Debug, Clone)]
pub struct InMemoryPartitionSource {
    broker: InMemoryBroker,
    topic: String,
    partition: i32,
}

#[async_trait]
impl MessageSource for InMemoryPartitionSource {
    async fn receive(&self) -> MessagingResult<Option<InboundMessage>> {
        loop {
            let notified = self.broker.state.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(message) = self.broker.try_pop(&self.topic, self.partition) {
                return Ok(Some(message));
            }
            if self.broker.is_closed() {
                return Ok(None);
            }

            notified.await;
        }
    }

    async fn acknowledge(&self, message: &InboundMessage) -> MessagingResult<()> {
        let mut logs = self.broker.state.logs.lock();
        let log = logs
            .entry((message.topic.clone(), message.partition))
            .or_default();
        log.acknowledged.push(message.offset);
        Ok(())
    }

    async fn signal_retry(&self, message: &InboundMessage, reason: &str) -> MessagingResult<()> {
        let redelivery = message.redelivery(message.retry_count().next());
        debug!(
            topic = %message.topic,
            partition = message.partition,
            offset = message.offset,
            retry_count = %redelivery.retry_count(),
            reason = %reason,
            "🔄 In-memory redelivery scheduled"
        );
        {
            let mut logs = self.broker.state.logs.lock();
            let log = logs
                .entry((message.topic.clone(), message.partition))
                .or_default();
            log.retry_signals += 1;
            log.pending.push_front(redelivery);
        }
        self.broker.state.notify.notify_waiters();
        Ok(())
    }

    fn assignment(&self) -> (String, i32) {
        (self.topic.clone(), self.partition)
    }
}
