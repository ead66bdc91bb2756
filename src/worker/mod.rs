//! # Worker
//!
//! Partition workers and the supervisor that runs them.

pub mod partition_worker;
pub mod supervisor;

pub use partition_worker::{PartitionWorker, WorkerStats, WorkerStatsSnapshot};
pub use supervisor::ConsumerSupervisor;
