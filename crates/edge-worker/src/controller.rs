//! Lifecycle event dispatch.

use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use edge_cache::CacheStore;
use edge_core::{FetchRequest, LifecycleEvent, WorkerConfig, WorkerState};
use edge_data::{FetchClient, Network, TimeoutConfig};
use edge_executor::{FetchOutcome, NetworkFirst};
use edge_observability::WorkerMetrics;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::error::WorkerError;
use crate::generation::{EvictionReport, GenerationManager, PrecacheReport};

/// Signals the worker sends back to its host.
#[async_trait]
pub trait WorkerHost: Send + Sync {
    /// Activate the installed worker without waiting for old clients to close.
    async fn skip_waiting(&self);

    /// Take control of already-open clients.
    async fn claim_clients(&self);
}

/// Host that ignores every signal.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHost;

#[async_trait]
impl WorkerHost for NoopHost {
    async fn skip_waiting(&self) {}

    async fn claim_clients(&self) {}
}

/// What a dispatched event produced.
#[derive(Debug)]
pub enum LifecycleOutcome {
    Installed(PrecacheReport),
    Activated(EvictionReport),
    Fetched(FetchOutcome),
}

/// Routes host lifecycle events to their handlers.
///
/// Install and activate are serialised and must arrive in order. Fetches run
/// concurrently with each other and with lifecycle handlers; before
/// activation they go straight to the network.
pub struct LifecycleController {
    config: WorkerConfig,
    generations: GenerationManager,
    engine: NetworkFirst,
    host: Arc<dyn WorkerHost>,
    metrics: Arc<WorkerMetrics>,
    state: RwLock<WorkerState>,
    transition: Mutex<()>,
}

impl LifecycleController {
    /// Build a worker from validated configuration.
    pub fn new(
        config: WorkerConfig,
        network: Arc<dyn Network>,
        store: Arc<dyn CacheStore>,
    ) -> Result<Self, WorkerError> {
        config.validate()?;

        let metrics = Arc::new(WorkerMetrics::new());
        let client = FetchClient::new(
            network.clone(),
            TimeoutConfig::from_total(config.network_timeout()),
        );
        let generations = GenerationManager::new(&config, client, store.clone())
            .with_metrics(metrics.clone());
        let engine =
            NetworkFirst::from_config(&config, network, store).with_metrics(metrics.clone());

        Ok(Self {
            config,
            generations,
            engine,
            host: Arc::new(NoopHost),
            metrics,
            state: RwLock::new(WorkerState::Parsed),
            transition: Mutex::new(()),
        })
    }

    /// Set the host that receives `skip_waiting` and `claim_clients`.
    pub fn with_host(mut self, host: Arc<dyn WorkerHost>) -> Self {
        self.host = host;
        self
    }

    /// Current lifecycle state.
    pub fn state(&self) -> WorkerState {
        *self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// The worker configuration.
    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// The generation manager.
    pub fn generations(&self) -> &GenerationManager {
        &self.generations
    }

    /// Counters shared by every handler.
    pub fn metrics(&self) -> &Arc<WorkerMetrics> {
        &self.metrics
    }

    /// Handle one lifecycle event.
    pub async fn dispatch(&self, event: LifecycleEvent) -> Result<LifecycleOutcome, WorkerError> {
        match event {
            LifecycleEvent::Install => self.install().await.map(LifecycleOutcome::Installed),
            LifecycleEvent::Activate => self.activate().await.map(LifecycleOutcome::Activated),
            LifecycleEvent::Fetch(request) => {
                Ok(LifecycleOutcome::Fetched(self.fetch(&request).await))
            }
        }
    }

    /// Create and precache this version's generation.
    #[instrument(skip(self), fields(generation = %self.generations.generation()))]
    pub async fn install(&self) -> Result<PrecacheReport, WorkerError> {
        let _guard = self.transition.lock().await;
        self.enter("install", WorkerState::Installing)?;

        match self.generations.install().await {
            Ok(report) => {
                self.set_state(WorkerState::Installed);
                if self.config.skip_waiting {
                    debug!("Signalling skip_waiting");
                    self.host.skip_waiting().await;
                }
                Ok(report)
            }
            Err(e) => {
                warn!(error = %e, "Install failed, worker is redundant");
                self.set_state(WorkerState::Redundant);
                Err(WorkerError::Install(e))
            }
        }
    }

    /// Promote the installed generation and evict the rest.
    #[instrument(skip(self), fields(generation = %self.generations.generation()))]
    pub async fn activate(&self) -> Result<EvictionReport, WorkerError> {
        let _guard = self.transition.lock().await;
        self.enter("activate", WorkerState::Activating)?;

        let report = self.generations.activate().await;
        self.set_state(WorkerState::Activated);

        if self.config.claim_clients {
            debug!("Signalling claim_clients");
            self.host.claim_clients().await;
        }

        info!(evicted = report.evicted.len(), "Worker activated");
        Ok(report)
    }

    /// Answer an intercepted request.
    pub async fn fetch(&self, request: &FetchRequest) -> FetchOutcome {
        match self.generations.current() {
            Some(current) if self.state().is_active() => {
                self.engine.handle(request, &current).await
            }
            _ => {
                debug!(url = %request.url, state = %self.state(), "Not activated, bypassing cache");
                self.engine.pass_through(request).await
            }
        }
    }

    fn enter(&self, event: &'static str, next: WorkerState) -> Result<(), WorkerError> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if !state.can_transition_to(next) {
            return Err(WorkerError::InvalidTransition {
                event,
                state: *state,
            });
        }
        *state = next;
        Ok(())
    }

    fn set_state(&self, next: WorkerState) {
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = next;
    }
}

impl std::fmt::Debug for LifecycleController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleController")
            .field("state", &self.state())
            .field("generations", &self.generations)
            .field("engine", &self.engine)
            .finish_non_exhaustive()
    }
}
