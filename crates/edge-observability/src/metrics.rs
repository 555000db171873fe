//! Worker-level counters.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Counters shared by every task of a worker instance.
#[derive(Debug, Default)]
pub struct WorkerMetrics {
    served_network: AtomicU64,
    served_cache: AtomicU64,
    served_stale: AtomicU64,
    served_offline: AtomicU64,
    failed: AtomicU64,
    network_timeouts: AtomicU64,
    cache_writes: AtomicU64,
    cache_write_failures: AtomicU64,
    cache_read_failures: AtomicU64,
    precache_succeeded: AtomicU64,
    precache_failed: AtomicU64,
    generations_evicted: AtomicU64,
}

/// Point-in-time copy of [`WorkerMetrics`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub served_network: u64,
    pub served_cache: u64,
    pub served_stale: u64,
    pub served_offline: u64,
    pub failed: u64,
    pub network_timeouts: u64,
    pub cache_writes: u64,
    pub cache_write_failures: u64,
    pub cache_read_failures: u64,
    pub precache_succeeded: u64,
    pub precache_failed: u64,
    pub generations_evicted: u64,
}

impl WorkerMetrics {
    /// Create zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_served_network(&self) {
        self.served_network.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_served_cache(&self) {
        self.served_cache.fetch_add(1, Ordering::Relaxed);
    }

    /// A cache hit that came from an older generation.
    pub fn record_served_stale(&self) {
        self.served_stale.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_served_offline(&self) {
        self.served_offline.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_network_timeout(&self) {
        self.network_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_write(&self, ok: bool) {
        if ok {
            self.cache_writes.fetch_add(1, Ordering::Relaxed);
        } else {
            self.cache_write_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_cache_read_failure(&self) {
        self.cache_read_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_precache(&self, succeeded: u64, failed: u64) {
        self.precache_succeeded.fetch_add(succeeded, Ordering::Relaxed);
        self.precache_failed.fetch_add(failed, Ordering::Relaxed);
    }

    pub fn record_evicted(&self, count: u64) {
        self.generations_evicted.fetch_add(count, Ordering::Relaxed);
    }

    /// Take a snapshot of all counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            served_network: self.served_network.load(Ordering::Relaxed),
            served_cache: self.served_cache.load(Ordering::Relaxed),
            served_stale: self.served_stale.load(Ordering::Relaxed),
            served_offline: self.served_offline.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            network_timeouts: self.network_timeouts.load(Ordering::Relaxed),
            cache_writes: self.cache_writes.load(Ordering::Relaxed),
            cache_write_failures: self.cache_write_failures.load(Ordering::Relaxed),
            cache_read_failures: self.cache_read_failures.load(Ordering::Relaxed),
            precache_succeeded: self.precache_succeeded.load(Ordering::Relaxed),
            precache_failed: self.precache_failed.load(Ordering::Relaxed),
            generations_evicted: self.generations_evicted.load(Ordering::Relaxed),
        }
    }
}

impl MetricsSnapshot {
    /// Total fetches that produced a response or a failure.
    pub fn total_fetches(&self) -> u64 {
        self.served_network + self.served_cache + self.served_offline + self.failed
    }

    /// Format as JSON.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Format as human-readable summary.
    pub fn to_summary(&self) -> String {
        let lines = [
            format!("Fetches: {}", self.total_fetches()),
            format!(
                "  network: {}  cache: {} (stale {})  offline: {}  failed: {}",
                self.served_network,
                self.served_cache,
                self.served_stale,
                self.served_offline,
                self.failed
            ),
            format!("  network timeouts: {}", self.network_timeouts),
            format!(
                "Cache writes: {} ok, {} failed; read failures: {}",
                self.cache_writes, self.cache_write_failures, self.cache_read_failures
            ),
            format!(
                "Precache: {} ok, {} failed; generations evicted: {}",
                self.precache_succeeded, self.precache_failed, self.generations_evicted
            ),
        ];
        lines.join("\n")
    }
}
