//! Versioned cache generations: precache on install, eviction on activate.

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use edge_cache::{
    CacheHandle, CacheStore, GenerationId, RequestKeyBuilder, StorageError, StoragePolicy,
    StoreDecision, StoredResponse,
};
use edge_core::{FetchRequest, WorkerConfig};
use edge_data::{FetchClient, RetryPolicy};
use edge_observability::WorkerMetrics;
use futures::stream::{FuturesUnordered, StreamExt};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::{PrecacheError, PrecacheFailure};

/// Result of precaching the manifest during install.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrecacheReport {
    /// Generation the manifest was written into.
    pub generation: GenerationId,
    /// URLs stored, in manifest order.
    pub cached: Vec<String>,
    /// URLs that could not be stored, in manifest order.
    pub failures: Vec<PrecacheFailure>,
    /// Whether the install deadline cut precache short.
    pub timed_out: bool,
    /// Time spent precaching.
    pub elapsed: Duration,
}

impl PrecacheReport {
    /// Whether every manifest URL was stored.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// Number of manifest URLs attempted.
    pub fn attempted(&self) -> usize {
        self.cached.len() + self.failures.len()
    }
}

/// Result of deleting superseded generations during activate.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvictionReport {
    /// Generation now current.
    pub current: Option<GenerationId>,
    /// Generations deleted.
    pub evicted: Vec<GenerationId>,
    /// Generations that could not be deleted, with the reason.
    pub failures: Vec<(GenerationId, String)>,
}

/// Owns the worker's view of which generation is current.
///
/// Each worker version installs exactly one generation, named from the
/// configured prefix and version token. The current generation is unset
/// until activate and only activate changes it.
pub struct GenerationManager {
    store: Arc<dyn CacheStore>,
    client: FetchClient,
    generation: GenerationId,
    manifest: Vec<String>,
    retry: RetryPolicy,
    install_timeout: Duration,
    keys: RequestKeyBuilder,
    policy: StoragePolicy,
    metrics: Arc<WorkerMetrics>,
    current: RwLock<Option<GenerationId>>,
}

impl GenerationManager {
    /// Create a manager for the generation described by `config`.
    pub fn new(config: &WorkerConfig, client: FetchClient, store: Arc<dyn CacheStore>) -> Self {
        Self {
            store,
            client,
            generation: GenerationId::new(config.generation_name()),
            manifest: config.precache_manifest.clone(),
            retry: RetryPolicy::new(config.precache_retries),
            install_timeout: config.install_timeout(),
            keys: RequestKeyBuilder::from_config(config),
            policy: StoragePolicy::default(),
            metrics: Arc::new(WorkerMetrics::new()),
            current: RwLock::new(None),
        }
    }

    /// Set the retry policy for manifest fetches.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Set which manifest responses may be stored.
    pub fn with_policy(mut self, policy: StoragePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Share a metrics instance.
    pub fn with_metrics(mut self, metrics: Arc<WorkerMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// The generation this worker version installs.
    pub fn generation(&self) -> &GenerationId {
        &self.generation
    }

    /// The generation fetches read and write, once activated.
    pub fn current(&self) -> Option<GenerationId> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Open this version's generation and precache the manifest into it.
    ///
    /// Manifest URLs are fetched concurrently. Individual failures are
    /// reported, never raised; only failing to open the generation is an
    /// error. URLs still in flight at the install deadline are reported as
    /// timed out.
    pub async fn install(&self) -> Result<PrecacheReport, StorageError> {
        let started = Instant::now();
        let handle = self.store.open(&self.generation).await?;
        info!(
            generation = %self.generation,
            manifest = self.manifest.len(),
            "Installing cache generation"
        );

        let deadline = started + self.install_timeout;
        let mut results: Vec<Option<Result<(), PrecacheError>>> = vec![None; self.manifest.len()];
        let mut in_flight: FuturesUnordered<_> = self
            .manifest
            .iter()
            .enumerate()
            .map(|(index, url)| {
                let handle = &handle;
                async move { (index, self.precache_one(handle, url).await) }
            })
            .collect();

        let mut timed_out = false;
        loop {
            match tokio::time::timeout_at(deadline, in_flight.next()).await {
                Ok(Some((index, result))) => results[index] = Some(result),
                Ok(None) => break,
                Err(_) => {
                    timed_out = true;
                    warn!(
                        generation = %self.generation,
                        pending = in_flight.len(),
                        "Install timeout reached, abandoning remaining precache"
                    );
                    break;
                }
            }
        }
        drop(in_flight);

        let mut report = PrecacheReport {
            generation: self.generation.clone(),
            cached: Vec::new(),
            failures: Vec::new(),
            timed_out,
            elapsed: started.elapsed(),
        };

        for (url, result) in self.manifest.iter().zip(results) {
            match result.unwrap_or(Err(PrecacheError::TimedOut)) {
                Ok(()) => report.cached.push(url.clone()),
                Err(error) => {
                    warn!(url = %url, error = %error, "Precache failed");
                    report.failures.push(PrecacheFailure {
                        url: url.clone(),
                        error,
                    });
                }
            }
        }

        self.metrics
            .record_precache(report.cached.len() as u64, report.failures.len() as u64);
        info!(
            generation = %self.generation,
            cached = report.cached.len(),
            failed = report.failures.len(),
            elapsed_ms = report.elapsed.as_millis() as u64,
            "Install complete"
        );

        Ok(report)
    }

    async fn precache_one(&self, handle: &CacheHandle, url: &str) -> Result<(), PrecacheError> {
        let request = FetchRequest::get(url);
        let response = self
            .client
            .fetch_with_retry(&request, &self.retry)
            .await
            .map_err(PrecacheError::Network)?;

        if !response.is_success_or_redirect() {
            return Err(PrecacheError::Status(response.status.as_u16()));
        }
        if let StoreDecision::Skip(reason) = self.policy.decide(&request, &response) {
            return Err(PrecacheError::NotCacheable(reason));
        }

        self.store
            .put(
                handle,
                &self.keys.build_for_url(url),
                StoredResponse::from_response(&response),
            )
            .await
            .map_err(|e| PrecacheError::Storage(e.to_string()))?;

        debug!(url = %url, generation = %handle.generation(), "Precached");
        Ok(())
    }

    /// Make this version's generation current and delete every other one.
    ///
    /// Deletion failures are logged and reported; they never fail activation.
    pub async fn activate(&self) -> EvictionReport {
        *self.current.write().unwrap_or_else(PoisonError::into_inner) =
            Some(self.generation.clone());
        info!(generation = %self.generation, "Generation is now current");

        let mut report = EvictionReport {
            current: Some(self.generation.clone()),
            ..Default::default()
        };

        let generations = match self.store.list_generations().await {
            Ok(generations) => generations,
            Err(e) => {
                warn!(error = %e, "Failed to list generations, skipping eviction");
                return report;
            }
        };

        for generation in generations.into_iter().filter(|g| *g != self.generation) {
            match self.store.delete_generation(&generation).await {
                Ok(true) => {
                    info!(generation = %generation, "Evicted stale generation");
                    report.evicted.push(generation);
                }
                Ok(false) => debug!(generation = %generation, "Generation already gone"),
                Err(e) => {
                    warn!(generation = %generation, error = %e, "Failed to evict generation");
                    report.failures.push((generation, e.to_string()));
                }
            }
        }

        self.metrics.record_evicted(report.evicted.len() as u64);
        report
    }
}

impl std::fmt::Debug for GenerationManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerationManager")
            .field("generation", &self.generation)
            .field("manifest", &self.manifest)
            .field("install_timeout", &self.install_timeout)
            .field("current", &self.current())
            .finish_non_exhaustive()
    }
}
