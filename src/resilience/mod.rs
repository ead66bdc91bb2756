//! # Resilience Module
//!
//! Consumer-side fault tolerance primitives used by the message processor.
//!
//! ## Architecture
//!
//! - **Deduplication Cache**: bounded, TTL-windowed set of handled event ids
//! - **Exponential Backoff**: pure attempt → delay policy with cancellable waits
//! - **Retry Executor**: bounded intra-call retries of a single operation
//! - **Shutdown Signal**: cancellation shared by workers and backoff waits
//! - **Clock**: injected time source for deterministic TTL tests
//!
//! ## Usage
//!
//! ```rust,no_run
//! use resilient_consumer::resilience::{ExponentialBackoff, RetryExecutor, ShutdownSignal};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let backoff = ExponentialBackoff::new(Duration::from_millis(100), Duration::from_secs(30), 2.0);
//! let executor = RetryExecutor::new("publish", ShutdownSignal::new());
//!
//! let result = executor
//!     .execute(|_attempt| async { Ok::<_, String>("published") }, 3, &backoff)
//!     .await
//!     .map_err(|e| e.to_string())?;
//! assert_eq!(result, "published");
//! # Ok(())
//! # }
//! ```

pub mod backoff;
pub mod clock;
pub mod dedup;
pub mod retry;
pub mod shutdown;

pub use backoff::{ExponentialBackoff, WaitCancelled};
pub use clock::{Clock, ManualClock, SystemClock};
pub use dedup::{CacheEntry, DeduplicationCache};
pub use retry::{RetryError, RetryExecutor};
pub use shutdown::ShutdownSignal;
