//! # Partition Worker
//!
//! Sequential receive → process → acknowledge loop for one partition
//! assignment. A delivery is always driven to a terminal outcome before the
//! next one is received, which preserves per-partition ordering.
//!
//! ## Outcome handling
//!
//! - **Acked / DeadLettered**: acknowledge the delivery
//! - **RetrySignaled**: withhold acknowledgment, signal redelivery
//! - **RoutingFailed**: never acknowledge; halt or skip per policy
//! - **Cancelled**: stop without acknowledging

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::config::RoutingFailurePolicy;
use crate::error::{ConsumerError, Result};
use crate::messaging::{InboundMessage, MessageSource};
use crate::processing::{
    AckReason, BusinessHandler, MessageProcessor, ProcessingError, ProcessingOutcome,
};
use crate::resilience::ShutdownSignal;

/// Statistics for partition worker observability
#[derive(Debug, Default)]
pub struct WorkerStats {
    /// Deliveries received from the source
    pub received: AtomicU64,
    /// Deliveries processed and acknowledged
    pub acked: AtomicU64,
    /// Deliveries acknowledged as duplicates
    pub duplicates: AtomicU64,
    /// Deliveries handed back for redelivery
    pub retry_signaled: AtomicU64,
    /// Deliveries dead-lettered and acknowledged
    pub dead_lettered: AtomicU64,
    /// Dead-letter publishes that failed
    pub routing_failures: AtomicU64,
}

/// Point-in-time copy of [`WorkerStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStatsSnapshot {
    pub received: u64,
    pub acked: u64,
    pub duplicates: u64,
    pub retry_signaled: u64,
    pub dead_lettered: u64,
    pub routing_failures: u64,
}

impl WorkerStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_received(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }

    pub fn get_acked(&self) -> u64 {
        self.acked.load(Ordering::Relaxed)
    }

    pub fn get_duplicates(&self) -> u64 {
        self.duplicates.load(Ordering::Relaxed)
    }

    pub fn get_retry_signaled(&self) -> u64 {
        self.retry_signaled.load(Ordering::Relaxed)
    }

    pub fn get_dead_lettered(&self) -> u64 {
        self.dead_lettered.load(Ordering::Relaxed)
    }

    pub fn get_routing_failures(&self) -> u64 {
        self.routing_failures.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> WorkerStatsSnapshot {
        WorkerStatsSnapshot {
            received: self.get_received(),
            acked: self.get_acked(),
            duplicates: self.get_duplicates(),
            retry_signaled: self.get_retry_signaled(),
            dead_lettered: self.get_dead_lettered(),
            routing_failures: self.get_routing_failures(),
        }
    }
}

impl std::ops::Add for WorkerStatsSnapshot {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Self {
            received: self.received + other.received,
            acked: self.acked + other.acked,
            duplicates: self.duplicates + other.duplicates,
            retry_signaled: self.retry_signaled + other.retry_signaled,
            dead_lettered: self.dead_lettered + other.dead_lettered,
            routing_failures: self.routing_failures + other.routing_failures,
        }
    }
}

/// Consumes one partition assignment until shutdown, source close or a fatal error
pub struct PartitionWorker {
    source: Arc<dyn MessageSource>,
    processor: Arc<MessageProcessor>,
    handler: Arc<dyn BusinessHandler>,
    policy: RoutingFailurePolicy,
    shutdown: ShutdownSignal,
    stats: Arc<WorkerStats>,
    topic: String,
    partition: i32,
}

impl std::fmt::Debug for PartitionWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PartitionWorker")
            .field("topic", &self.topic)
            .field("partition", &self.partition)
            .field("policy", &self.policy)
            .finish()
    }
}

impl PartitionWorker {
    pub fn new(
        source: Arc<dyn MessageSource>,
        processor: Arc<MessageProcessor>,
        handler: Arc<dyn BusinessHandler>,
        policy: RoutingFailurePolicy,
        shutdown: ShutdownSignal,
    ) -> Self {
        let (topic, partition) = source.assignment();
        Self {
            source,
            processor,
            handler,
            policy,
            shutdown,
            stats: Arc::new(WorkerStats::new()),
            topic,
            partition,
        }
    }

    /// Share an externally owned stats handle
    pub fn with_stats(mut self, stats: Arc<WorkerStats>) -> Self {
        self.stats = stats;
        self
    }

    pub fn stats(&self) -> Arc<WorkerStats> {
        self.stats.clone()
    }

    pub fn assignment(&self) -> (&str, i32) {
        (&self.topic, self.partition)
    }

    /// Main consume loop
    pub async fn run(self) -> Result<()> {
        info!(
            topic = %self.topic,
            partition = self.partition,
            policy = ?self.policy,
            "🚀 Partition worker started"
        );

        loop {
            let received = tokio::select! {
                biased;
                _ = self.shutdown.triggered() => {
                    debug!(topic = %self.topic, partition = self.partition, "Shutdown requested before receive");
                    break;
                }
                received = self.source.receive() => received,
            };

            let message = match received {
                Ok(Some(message)) => message,
                Ok(None) => {
                    info!(topic = %self.topic, partition = self.partition, "Source closed, worker exiting");
                    break;
                }
                Err(e) => {
                    error!(
                        topic = %self.topic,
                        partition = self.partition,
                        error = %e,
                        "❌ Receive failed, stopping worker"
                    );
                    return Err(e.into());
                }
            };

            self.stats.received.fetch_add(1, Ordering::Relaxed);

            if !self.handle_delivery(&message).await? {
                break;
            }
        }

        info!(
            topic = %self.topic,
            partition = self.partition,
            stats = ?self.stats.snapshot(),
            "Partition worker stopped"
        );
        Ok(())
    }

    /// Drive one delivery; `Ok(false)` stops the loop
    async fn handle_delivery(&self, message: &InboundMessage) -> Result<bool> {
        match self
            .processor
            .process_message(message, self.handler.as_ref())
            .await
        {
            Ok(ProcessingOutcome::Acked(reason)) => {
                self.source.acknowledge(message).await?;
                match reason {
                    AckReason::Processed => self.stats.acked.fetch_add(1, Ordering::Relaxed),
                    AckReason::Duplicate => self.stats.duplicates.fetch_add(1, Ordering::Relaxed),
                };
                Ok(true)
            }
            Ok(ProcessingOutcome::DeadLettered(_)) => {
                self.source.acknowledge(message).await?;
                self.stats.dead_lettered.fetch_add(1, Ordering::Relaxed);
                Ok(true)
            }
            Ok(ProcessingOutcome::RetrySignaled(failure)) => {
                let reason = failure.reason();
                self.source
                    .signal_retry(message, &format!("{}: {}", reason.kind, reason.message))
                    .await?;
                self.stats.retry_signaled.fetch_add(1, Ordering::Relaxed);
                Ok(true)
            }
            Err(ProcessingError::RoutingFailed(routing)) => {
                self.stats.routing_failures.fetch_add(1, Ordering::Relaxed);
                match self.policy {
                    RoutingFailurePolicy::Halt => {
                        error!(
                            topic = %self.topic,
                            partition = self.partition,
                            offset = message.offset,
                            error = %routing,
                            "❌ Dead-letter routing failed, halting worker"
                        );
                        Err(ConsumerError::RoutingFailed(routing))
                    }
                    RoutingFailurePolicy::AlertAndSkip => {
                        error!(
                            topic = %self.topic,
                            partition = self.partition,
                            offset = message.offset,
                            error = %routing,
                            "🚨 Dead-letter routing failed, message left unacknowledged"
                        );
                        Ok(true)
                    }
                }
            }
            Err(ProcessingError::Cancelled) => {
                warn!(
                    topic = %self.topic,
                    partition = self.partition,
                    offset = message.offset,
                    "Processing cancelled by shutdown, message left unacknowledged"
                );
                Ok(false)
            }
            Err(ProcessingError::InvalidTransition(e)) => Err(e.into()),
        }
    }
}
