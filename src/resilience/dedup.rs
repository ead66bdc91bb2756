//! # Deduplication Cache
//!
//! Bounded, time-windowed set of event ids that have already been handled.
//!
//! Expired entries are swept lazily on every lookup; there is no background
//! timer. When an insert pushes the cache past capacity the oldest inserted
//! entry is evicted (insertion order, not access order). This is a
//! best-effort guard: duplicates arriving after an entry expired or was
//! evicted are not detected.

use crate::config::DedupConfig;
use crate::resilience::clock::{Clock, SystemClock};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// A remembered event id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub event_id: String,
    pub inserted_at: Instant,
}

#[derive(Debug, Default)]
struct CacheInner {
    /// event id -> insertion time
    entries: HashMap<String, Instant>,
    /// Same entries in insertion order; insertion times are non-decreasing
    order: VecDeque<CacheEntry>,
}

impl CacheInner {
    fn sweep_expired(&mut self, now: Instant, ttl: Duration) -> usize {
        let mut swept = 0;
        while let Some(front) = self.order.front() {
            if now.saturating_duration_since(front.inserted_at) <= ttl {
                break;
            }
            if let Some(entry) = self.order.pop_front() {
                self.entries.remove(&entry.event_id);
                swept += 1;
            }
        }
        swept
    }

    fn evict_oldest(&mut self) -> Option<CacheEntry> {
        let entry = self.order.pop_front()?;
        self.entries.remove(&entry.event_id);
        Some(entry)
    }
}

/// Process-wide event id cache shared by every partition worker
///
/// All mutations happen under a single mutex so `is_duplicate` is atomic
/// with respect to other callers.
#[derive(Debug)]
pub struct DeduplicationCache {
    inner: Mutex<CacheInner>,
    ttl: Duration,
    max_size: usize,
    clock: Arc<dyn Clock>,
}

impl DeduplicationCache {
    /// Create a cache using the system clock
    pub fn new(max_size: usize, ttl: Duration) -> Self {
        Self::with_clock(max_size, ttl, Arc::new(SystemClock))
    }

    pub fn with_clock(max_size: usize, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Mutex::new(CacheInner::default()),
            ttl,
            max_size,
            clock,
        }
    }

    pub fn from_config(config: &DedupConfig, clock: Arc<dyn Clock>) -> Self {
        Self::with_clock(config.max_size, config.ttl(), clock)
    }

    /// Record `event_id` and report whether it was already seen
    ///
    /// Absent or empty ids can never be deduplicated: they return `false`
    /// and leave the cache untouched. A hit does not refresh the entry's
    /// timestamp.
    pub fn is_duplicate(&self, event_id: Option<&str>) -> bool {
        let event_id = match event_id {
            Some(id) if !id.is_empty() => id,
            _ => return false,
        };

        // Read the clock under the lock so `order` stays sorted by insertion time
        let mut inner = self.inner.lock();
        let now = self.clock.now();

        let swept = inner.sweep_expired(now, self.ttl);
        if swept > 0 {
            debug!(swept, remaining = inner.entries.len(), "🧹 Expired dedup entries swept");
        }

        if inner.entries.contains_key(event_id) {
            return true;
        }

        inner.entries.insert(event_id.to_string(), now);
        inner.order.push_back(CacheEntry {
            event_id: event_id.to_string(),
            inserted_at: now,
        });

        if inner.entries.len() > self.max_size {
            if let Some(evicted) = inner.evict_oldest() {
                debug!(
                    evicted_event_id = %evicted.event_id,
                    max_size = self.max_size,
                    "Dedup cache at capacity, evicted oldest entry"
                );
            }
        }

        false
    }

    /// Drop `event_id` so its next delivery is processed again
    ///
    /// Used when a delivery fails and is handed back for redelivery; returns
    /// whether the id was present.
    pub fn forget(&self, event_id: Option<&str>) -> bool {
        let event_id = match event_id {
            Some(id) if !id.is_empty() => id,
            _ => return false,
        };

        let mut inner = self.inner.lock();
        if inner.entries.remove(event_id).is_none() {
            return false;
        }
        inner.order.retain(|entry| entry.event_id != event_id);
        true
    }

    /// Entry count, including entries that have expired but not been swept
    pub fn size(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.entries.clear();
        inner.order.clear();
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }
}
