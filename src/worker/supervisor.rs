//! # Consumer Supervisor
//!
//! Owns the process-wide pieces (dedup cache, processor, shutdown signal)
//! and spawns one [`PartitionWorker`] per assigned partition. Workers run
//! concurrently with each other but share the single dedup cache.

use std::sync::Arc;

use dashmap::DashMap;
use futures::future::join_all;
use tokio::task::JoinHandle;
use tracing::{error, info};

use super::partition_worker::{PartitionWorker, WorkerStats, WorkerStatsSnapshot};
use crate::config::ResilienceConfig;
use crate::error::{ConsumerError, Result};
use crate::messaging::{MessagePublisher, MessageSource};
use crate::processing::{BusinessHandler, MessageProcessor};
use crate::resilience::{DeduplicationCache, ShutdownSignal, SystemClock};

type Assignment = (String, i32);

pub struct ConsumerSupervisor {
    config: ResilienceConfig,
    dedup: Arc<DeduplicationCache>,
    processor: Arc<MessageProcessor>,
    handler: Arc<dyn BusinessHandler>,
    shutdown: ShutdownSignal,
    stats: Arc<DashMap<Assignment, Arc<WorkerStats>>>,
    workers: Vec<(Assignment, JoinHandle<Result<()>>)>,
}

impl std::fmt::Debug for ConsumerSupervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsumerSupervisor")
            .field("service_name", &self.config.consumer.service_name)
            .field("workers", &self.workers.len())
            .field("dedup_size", &self.dedup.size())
            .finish()
    }
}

impl ConsumerSupervisor {
    /// Validate `config` and build a supervisor with a system-clock dedup cache
    pub fn new(
        config: ResilienceConfig,
        publisher: Arc<dyn MessagePublisher>,
        handler: Arc<dyn BusinessHandler>,
    ) -> Result<Self> {
        let dedup = Arc::new(DeduplicationCache::from_config(
            &config.dedup,
            Arc::new(SystemClock),
        ));
        Self::with_dedup_cache(config, dedup, publisher, handler)
    }

    /// Like [`ConsumerSupervisor::new`] but sharing an existing cache
    pub fn with_dedup_cache(
        config: ResilienceConfig,
        dedup: Arc<DeduplicationCache>,
        publisher: Arc<dyn MessagePublisher>,
        handler: Arc<dyn BusinessHandler>,
    ) -> Result<Self> {
        config.validate()?;

        let shutdown = ShutdownSignal::new();
        let processor = Arc::new(MessageProcessor::new(
            &config,
            dedup.clone(),
            publisher,
            shutdown.clone(),
        ));

        Ok(Self {
            config,
            dedup,
            processor,
            handler,
            shutdown,
            stats: Arc::new(DashMap::new()),
            workers: Vec::new(),
        })
    }

    /// Spawn a worker for `source`'s partition assignment
    pub fn spawn(&mut self, source: Arc<dyn MessageSource>) -> Result<Arc<WorkerStats>> {
        let assignment = source.assignment();
        if self.stats.contains_key(&assignment) {
            return Err(ConsumerError::worker(format!(
                "partition {}/{} already has a worker",
                assignment.0, assignment.1
            )));
        }

        let worker = PartitionWorker::new(
            source,
            self.processor.clone(),
            self.handler.clone(),
            self.config.consumer.routing_failure_policy,
            self.shutdown.clone(),
        );
        let stats = worker.stats();
        self.stats.insert(assignment.clone(), stats.clone());

        info!(
            topic = %assignment.0,
            partition = assignment.1,
            service = %self.config.consumer.service_name,
            "Spawning partition worker"
        );
        let handle = tokio::spawn(worker.run());
        self.workers.push((assignment, handle));

        Ok(stats)
    }

    /// Spawn a worker for each source
    pub fn spawn_all<S, I>(&mut self, sources: I) -> Result<()>
    where
        S: MessageSource + 'static,
        I: IntoIterator<Item = S>,
    {
        for source in sources {
            self.spawn(Arc::new(source))?;
        }
        Ok(())
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    pub fn stats(&self, topic: &str, partition: i32) -> Option<Arc<WorkerStats>> {
        self.stats
            .get(&(topic.to_string(), partition))
            .map(|entry| entry.value().clone())
    }

    /// Sum of every worker's counters
    pub fn total_stats(&self) -> WorkerStatsSnapshot {
        self.stats
            .iter()
            .map(|entry| entry.value().snapshot())
            .fold(WorkerStatsSnapshot::default(), |total, next| total + next)
    }

    pub fn dedup_cache(&self) -> Arc<DeduplicationCache> {
        self.dedup.clone()
    }

    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    pub fn config(&self) -> &ResilienceConfig {
        &self.config
    }

    /// Ask every worker to stop; in-flight backoff waits end immediately
    pub fn shutdown(&self) {
        info!(
            workers = self.workers.len(),
            "🛑 Consumer supervisor shutdown requested"
        );
        self.shutdown.trigger();
    }

    /// Wait for every worker to exit, returning each worker's result
    pub async fn join(self) -> Vec<(Assignment, Result<()>)> {
        let (assignments, handles): (Vec<_>, Vec<_>) = self.workers.into_iter().unzip();
        let results = join_all(handles).await;

        assignments
            .into_iter()
            .zip(results)
            .map(|(assignment, joined)| {
                let result = match joined {
                    Ok(result) => result,
                    Err(e) => {
                        error!(
                            topic = %assignment.0,
                            partition = assignment.1,
                            error = %e,
                            "❌ Partition worker task panicked"
                        );
                        Err(ConsumerError::worker(format!("worker task failed: {e}")))
                    }
                };
                (assignment, result)
            })
            .collect()
    }

    /// Trigger shutdown and wait for every worker
    pub async fn shutdown_and_join(self) -> Vec<(Assignment, Result<()>)> {
        self.shutdown();
        self.join().await
    }
}
