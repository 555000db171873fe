//! Network-first fetch strategy with cache fallback.

use std::sync::Arc;

use edge_cache::{
    CacheExplainHeaders, CacheHandle, CacheStatus, CacheStore, GenerationId, RequestKey,
    RequestKeyBuilder, StoragePolicy, StoreDecision, StoredResponse,
};
use edge_core::{
    FetchRequest, FetchResponse, FetchState, ResponseSource, TimingContext, WorkerConfig,
};
use edge_data::{FetchClient, Network, NetworkError, TimeoutConfig};
use edge_observability::WorkerMetrics;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::fallback::OfflineFallback;

/// The failure handed to the host when a request cannot be answered.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchFailure {
    /// Non-cacheable request whose network attempt failed.
    #[error("network request failed: {0}")]
    Network(#[from] NetworkError),

    /// The network failed and no generation held a copy.
    #[error("{url} unavailable: network failed ({source}) and no cached copy")]
    Unavailable {
        url: String,
        #[source]
        source: NetworkError,
    },
}

/// Result of handling one intercepted request.
#[derive(Debug)]
pub struct FetchOutcome {
    /// Exactly one response or one failure.
    pub result: Result<FetchResponse, FetchFailure>,
    /// Terminal state of the request.
    pub state: FetchState,
    /// How the response was produced, if one was.
    pub cache_status: Option<CacheStatus>,
    /// Background write of the network response, if one was started.
    ///
    /// Awaiting it is optional; dropping it does not cancel the write.
    pub cache_write: Option<JoinHandle<()>>,
}

impl FetchOutcome {
    fn served(response: FetchResponse, state: FetchState, status: CacheStatus) -> Self {
        Self {
            result: Ok(response),
            state,
            cache_status: Some(status),
            cache_write: None,
        }
    }

    fn failed(failure: FetchFailure, state: FetchState) -> Self {
        Self {
            result: Err(failure),
            state,
            cache_status: None,
            cache_write: None,
        }
    }

    /// Whether a response was produced.
    pub fn is_served(&self) -> bool {
        self.result.is_ok()
    }

    /// Wait for the background cache write, if any.
    pub async fn wait_for_cache_write(&mut self) {
        if let Some(handle) = self.cache_write.take() {
            if let Err(e) = handle.await {
                warn!(error = %e, "Cache write task did not complete");
            }
        }
    }

    /// Discard bookkeeping and keep the response.
    pub fn into_result(self) -> Result<FetchResponse, FetchFailure> {
        self.result
    }
}

/// Why the network did not answer a GET.
enum NetworkMiss {
    Status(FetchResponse),
    Error(NetworkError),
}

/// A cached entry found during fallback.
struct CacheMatch {
    response: StoredResponse,
    generation: GenerationId,
    status: CacheStatus,
}

/// Network-first strategy engine.
///
/// Every request goes to the network first. GET responses with a 2xx/3xx
/// status are copied into the current generation in the background. When the
/// network fails, times out, or answers with an error status, the cache is
/// consulted; the cache is never the primary source.
pub struct NetworkFirst {
    client: FetchClient,
    store: Arc<dyn CacheStore>,
    keys: RequestKeyBuilder,
    policy: StoragePolicy,
    offline: OfflineFallback,
    stale_fallback: bool,
    explain_headers: bool,
    metrics: Arc<WorkerMetrics>,
}

impl NetworkFirst {
    /// Create an engine with default settings.
    pub fn new(client: FetchClient, store: Arc<dyn CacheStore>) -> Self {
        Self {
            client,
            store,
            keys: RequestKeyBuilder::new(),
            policy: StoragePolicy::default(),
            offline: OfflineFallback::default(),
            stale_fallback: false,
            explain_headers: false,
            metrics: Arc::new(WorkerMetrics::new()),
        }
    }

    /// Create an engine from worker configuration.
    pub fn from_config(
        config: &WorkerConfig,
        network: Arc<dyn Network>,
        store: Arc<dyn CacheStore>,
    ) -> Self {
        let timeout = TimeoutConfig::from_total(config.network_timeout());
        let offline = OfflineFallback::from_setting(config.offline_fallback.as_deref());

        Self::new(FetchClient::new(network, timeout), store)
            .with_key_builder(RequestKeyBuilder::from_config(config))
            .with_offline_fallback(offline)
            .with_stale_fallback(config.fallback_to_stale_generation)
            .with_explain_headers(config.explain_headers)
    }

    /// Set how request keys are built.
    pub fn with_key_builder(mut self, keys: RequestKeyBuilder) -> Self {
        self.keys = keys;
        self
    }

    /// Set which responses are written to the cache.
    pub fn with_policy(mut self, policy: StoragePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Set the offline fallback.
    pub fn with_offline_fallback(mut self, offline: OfflineFallback) -> Self {
        self.offline = offline;
        self
    }

    /// Also consult generations older than the current one.
    pub fn with_stale_fallback(mut self, enabled: bool) -> Self {
        self.stale_fallback = enabled;
        self
    }

    /// Add `X-Cache-*` headers to served responses.
    pub fn with_explain_headers(mut self, enabled: bool) -> Self {
        self.explain_headers = enabled;
        self
    }

    /// Share a metrics instance.
    pub fn with_metrics(mut self, metrics: Arc<WorkerMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// The metrics this engine records into.
    pub fn metrics(&self) -> &Arc<WorkerMetrics> {
        &self.metrics
    }

    /// The network client.
    pub fn client(&self) -> &FetchClient {
        &self.client
    }

    /// Send the request to the network without touching the cache.
    pub async fn pass_through(&self, request: &FetchRequest) -> FetchOutcome {
        let state = step(FetchState::Pending, FetchState::NetworkAttempted);

        match self.client.fetch(request).await {
            Ok(response) => {
                self.metrics.record_served_network();
                FetchOutcome::served(
                    self.explain(response, CacheExplainHeaders::new(CacheStatus::Network)),
                    step(state, FetchState::Served(ResponseSource::Network)),
                    CacheStatus::Network,
                )
            }
            Err(err) => {
                self.record_network_error(&err);
                self.metrics.record_failed();
                FetchOutcome::failed(FetchFailure::Network(err), step(state, FetchState::Failed))
            }
        }
    }

    /// Handle a request against the `current` generation.
    pub async fn handle(&self, request: &FetchRequest, current: &GenerationId) -> FetchOutcome {
        if !request.is_get() {
            debug!(
                method = %request.method,
                url = %request.url,
                "Non-GET request bypasses cache"
            );
            return self.pass_through(request).await;
        }

        let mut timing = TimingContext::new();
        let state = step(FetchState::Pending, FetchState::NetworkAttempted);
        let key = self.keys.build(request);

        let network = self.client.fetch(request).await;
        timing.mark("network");

        let miss = match network {
            Ok(response) if response.is_success_or_redirect() => {
                self.metrics.record_served_network();

                let cache_write = self.spawn_cache_write(request, &response, key, current);
                let mut outcome = FetchOutcome::served(
                    self.explain(response, CacheExplainHeaders::new(CacheStatus::Network)),
                    step(state, FetchState::Served(ResponseSource::Network)),
                    CacheStatus::Network,
                );
                outcome.cache_write = cache_write;
                return outcome;
            }
            Ok(response) => {
                debug!(
                    request_id = %request.request_id,
                    url = %request.url,
                    status = response.status.as_u16(),
                    "Network returned error status, trying cache"
                );
                NetworkMiss::Status(response)
            }
            Err(err) => {
                debug!(
                    request_id = %request.request_id,
                    url = %request.url,
                    error = %err,
                    "Network failed, trying cache"
                );
                self.record_network_error(&err);
                NetworkMiss::Error(err)
            }
        };

        if let Some(found) = self.lookup(&key, current).await {
            self.metrics.record_served_cache();
            if found.status == CacheStatus::Stale {
                self.metrics.record_served_stale();
            }
            info!(
                request_id = %request.request_id,
                url = %request.url,
                generation = %found.generation,
                status = %found.status,
                network_ms = timing.until("network").unwrap_or_default().as_millis() as u64,
                elapsed_ms = timing.elapsed().as_millis() as u64,
                "Served from cache"
            );
            return self.serve_cached(found, state);
        }

        if let Some(url) = self.offline.page_for(request) {
            let page_key = self.keys.build_for_url(url);
            if let Some(mut found) = self.lookup(&page_key, current).await {
                self.metrics.record_served_offline();
                info!(url = %request.url, page = %url, "Served offline fallback");
                found.status = CacheStatus::Offline;
                return self.serve_cached(found, state);
            }
            debug!(page = %url, "Offline fallback page is not cached");
        }

        match miss {
            NetworkMiss::Status(response) => {
                self.metrics.record_served_network();
                FetchOutcome::served(
                    self.explain(response, CacheExplainHeaders::new(CacheStatus::Network)),
                    step(state, FetchState::Served(ResponseSource::Network)),
                    CacheStatus::Network,
                )
            }
            NetworkMiss::Error(err) => {
                self.metrics.record_failed();
                warn!(
                    request_id = %request.request_id,
                    url = %request.url,
                    error = %err,
                    elapsed_ms = timing.elapsed().as_millis() as u64,
                    "No network and no cached copy"
                );
                FetchOutcome::failed(
                    FetchFailure::Unavailable {
                        url: request.url.clone(),
                        source: err,
                    },
                    step(state, FetchState::Failed),
                )
            }
        }
    }

    fn serve_cached(&self, found: CacheMatch, state: FetchState) -> FetchOutcome {
        let explain = CacheExplainHeaders::new(found.status)
            .with_generation(found.generation)
            .with_age(found.response.age_secs());
        let source_status = found.status;

        FetchOutcome::served(
            self.explain(found.response.to_response(), explain),
            step(state, FetchState::Served(ResponseSource::Cache)),
            source_status,
        )
    }

    fn explain(&self, mut response: FetchResponse, headers: CacheExplainHeaders) -> FetchResponse {
        if self.explain_headers {
            headers.apply(&mut response);
        }
        response
    }

    fn record_network_error(&self, err: &NetworkError) {
        if err.is_timeout() {
            self.metrics.record_network_timeout();
        }
    }

    /// Search the current generation, then older ones when stale fallback is on.
    ///
    /// A key with vary headers that misses is retried without them, since
    /// precached entries carry none. Generations listed after `current` belong
    /// to versions that have not activated and are never read.
    async fn lookup(&self, key: &RequestKey, current: &GenerationId) -> Option<CacheMatch> {
        let mut candidates = vec![key.clone()];
        if !key.headers().is_empty() {
            candidates.push(key.without_headers());
        }

        if let Some(response) = self.read_any(current, &candidates).await {
            return Some(CacheMatch {
                response,
                generation: current.clone(),
                status: CacheStatus::Hit,
            });
        }

        if !self.stale_fallback {
            return None;
        }

        let generations = match self.store.list_generations().await {
            Ok(generations) => generations,
            Err(e) => {
                warn!(error = %e, "Failed to list cache generations");
                self.metrics.record_cache_read_failure();
                return None;
            }
        };

        let older = match generations.iter().position(|g| g == current) {
            Some(index) => &generations[..index],
            None => &generations[..0],
        };
        for generation in older {
            if let Some(response) = self.read_any(generation, &candidates).await {
                return Some(CacheMatch {
                    response,
                    generation: generation.clone(),
                    status: CacheStatus::Stale,
                });
            }
        }

        None
    }

    async fn read_any(
        &self,
        generation: &GenerationId,
        keys: &[RequestKey],
    ) -> Option<StoredResponse> {
        for key in keys {
            if let Some(found) = self.read(generation, key).await {
                return Some(found);
            }
        }
        None
    }

    async fn read(&self, generation: &GenerationId, key: &RequestKey) -> Option<StoredResponse> {
        let handle = CacheHandle::new(generation.clone());
        match self.store.get(&handle, key).await {
            Ok(found) => found,
            Err(e) => {
                warn!(generation = %generation, key = %key, error = %e, "Cache read failed");
                self.metrics.record_cache_read_failure();
                None
            }
        }
    }

    /// Start a detached write of `response` into `current`.
    ///
    /// The handle is built directly rather than through `open` so a write
    /// racing an activation cannot resurrect an evicted generation.
    fn spawn_cache_write(
        &self,
        request: &FetchRequest,
        response: &FetchResponse,
        key: RequestKey,
        current: &GenerationId,
    ) -> Option<JoinHandle<()>> {
        if let StoreDecision::Skip(reason) = self.policy.decide(request, response) {
            debug!(url = %request.url, reason = %reason, "Response not cached");
            return None;
        }

        let store = self.store.clone();
        let metrics = self.metrics.clone();
        let handle = CacheHandle::new(current.clone());
        let stored = StoredResponse::from_response(response);

        Some(tokio::spawn(async move {
            match store.put(&handle, &key, stored).await {
                Ok(()) => {
                    debug!(
                        key = %key,
                        generation = %handle.generation(),
                        "Cached network response"
                    );
                    metrics.record_cache_write(true);
                }
                Err(e) => {
                    warn!(
                        key = %key,
                        generation = %handle.generation(),
                        error = %e,
                        "Cache write skipped"
                    );
                    metrics.record_cache_write(false);
                }
            }
        }))
    }
}

impl std::fmt::Debug for NetworkFirst {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetworkFirst")
            .field("client", &self.client)
            .field("offline", &self.offline)
            .field("stale_fallback", &self.stale_fallback)
            .field("explain_headers", &self.explain_headers)
            .finish_non_exhaustive()
    }
}

/// Advance the per-request state; the engine only takes legal paths.
fn step(state: FetchState, next: FetchState) -> FetchState {
    state.advance(next).unwrap_or_else(|err| {
        warn!(error = %err, "Fetch state machine violated");
        next
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use edge_cache::{header_names, InMemoryCacheStore, StoreResult};
    use edge_data::StaticNetwork;
    use http::StatusCode;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    const V0: &str = "edge-cache-v0";
    const V1: &str = "edge-cache-v1";
    const V2: &str = "edge-cache-v2";
    const V3: &str = "edge-cache-v3";

    /// In-memory store that counts reads and writes.
    #[derive(Default)]
    struct CountingStore {
        inner: InMemoryCacheStore,
        gets: AtomicUsize,
        puts: AtomicUsize,
    }

    #[async_trait]
    impl CacheStore for CountingStore {
        async fn open(&self, generation: &GenerationId) -> StoreResult<CacheHandle> {
            self.inner.open(generation).await
        }

        async fn get(
            &self,
            handle: &CacheHandle,
            key: &RequestKey,
        ) -> StoreResult<Option<StoredResponse>> {
            self.gets.fetch_add(1, Ordering::SeqCst);
            self.inner.get(handle, key).await
        }

        async fn put(
            &self,
            handle: &CacheHandle,
            key: &RequestKey,
            response: StoredResponse,
        ) -> StoreResult<()> {
            self.puts.fetch_add(1, Ordering::SeqCst);
            self.inner.put(handle, key, response).await
        }

        async fn delete_generation(&self, generation: &GenerationId) -> StoreResult<bool> {
            self.inner.delete_generation(generation).await
        }

        async fn list_generations(&self) -> StoreResult<Vec<GenerationId>> {
            self.inner.list_generations().await
        }

        async fn keys(&self, handle: &CacheHandle) -> StoreResult<Vec<RequestKey>> {
            self.inner.keys(handle).await
        }
    }

    struct Fixture {
        network: Arc<StaticNetwork>,
        store: Arc<InMemoryCacheStore>,
        current: GenerationId,
    }

    impl Fixture {
        async fn new() -> Self {
            let store = Arc::new(InMemoryCacheStore::new());
            let current = GenerationId::new(V2);
            store.open(&GenerationId::new(V1)).await.unwrap();
            store.open(&current).await.unwrap();
            Self {
                network: Arc::new(StaticNetwork::new()),
                store,
                current,
            }
        }

        fn engine(&self) -> NetworkFirst {
            let client = FetchClient::new(
                self.network.clone(),
                TimeoutConfig::from_total(Duration::from_millis(100)),
            );
            NetworkFirst::new(client, self.store.clone())
        }

        async fn seed(&self, generation: &str, url: &str, body: &str) {
            let handle = self.store.open(&GenerationId::new(generation)).await.unwrap();
            self.store
                .put(&handle, &RequestKey::get(url), StoredResponse::new(200, body))
                .await
                .unwrap();
        }

        async fn cached(&self, url: &str) -> Option<StoredResponse> {
            self.store
                .get(&CacheHandle::new(self.current.clone()), &RequestKey::get(url))
                .await
                .unwrap()
        }
    }

    #[tokio::test]
    async fn test_network_response_is_served_and_cached() {
        let fx = Fixture::new().await;
        fx.network.set_route("/app.js", FetchResponse::ok("fresh"));
        let engine = fx.engine();

        let mut outcome = engine.handle(&FetchRequest::get("/app.js"), &fx.current).await;
        assert_eq!(outcome.state, FetchState::Served(ResponseSource::Network));
        assert!(outcome.cache_write.is_some());
        outcome.wait_for_cache_write().await;

        assert_eq!(outcome.result.unwrap().body, b"fresh".to_vec());
        assert_eq!(fx.cached("/app.js").await.unwrap().body, b"fresh".to_vec());
        assert_eq!(engine.metrics().snapshot().cache_writes, 1);
    }

    #[tokio::test]
    async fn test_offline_serves_previous_copy() {
        let fx = Fixture::new().await;
        fx.network.set_route("/app.js", FetchResponse::ok("v1 body"));
        let engine = fx.engine();

        let mut first = engine.handle(&FetchRequest::get("/app.js"), &fx.current).await;
        first.wait_for_cache_write().await;

        fx.network.set_online(false);
        let second = engine.handle(&FetchRequest::get("/app.js"), &fx.current).await;

        assert_eq!(second.state, FetchState::Served(ResponseSource::Cache));
        assert_eq!(second.cache_status, Some(CacheStatus::Hit));
        assert_eq!(second.result.unwrap().body, b"v1 body".to_vec());
    }

    #[tokio::test]
    async fn test_offline_miss_propagates_failure() {
        let fx = Fixture::new().await;
        fx.network.set_online(false);
        let engine = fx.engine();

        let outcome = engine.handle(&FetchRequest::get("/missing.png"), &fx.current).await;

        assert_eq!(outcome.state, FetchState::Failed);
        assert!(matches!(
            outcome.result,
            Err(FetchFailure::Unavailable { ref url, source: NetworkError::Connection(_) })
                if url == "/missing.png"
        ));
        assert_eq!(engine.metrics().snapshot().failed, 1);
    }

    #[tokio::test]
    async fn test_error_status_falls_back_to_cache() {
        let fx = Fixture::new().await;
        fx.seed(V2, "/app.js", "cached").await;
        fx.network
            .set_route("/app.js", FetchResponse::new(StatusCode::SERVICE_UNAVAILABLE));

        let outcome = fx.engine().handle(&FetchRequest::get("/app.js"), &fx.current).await;

        assert_eq!(outcome.state, FetchState::Served(ResponseSource::Cache));
        assert_eq!(outcome.result.unwrap().body, b"cached".to_vec());
    }

    #[tokio::test]
    async fn test_error_status_without_copy_is_returned_unchanged() {
        let fx = Fixture::new().await;
        fx.network
            .set_route("/app.js", FetchResponse::new(StatusCode::INTERNAL_SERVER_ERROR));

        let outcome = fx.engine().handle(&FetchRequest::get("/app.js"), &fx.current).await;

        assert_eq!(outcome.state, FetchState::Served(ResponseSource::Network));
        assert!(outcome.cache_write.is_none());
        assert_eq!(outcome.result.unwrap().status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(fx.cached("/app.js").await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_falls_back_to_cache() {
        let fx = Fixture::new().await;
        fx.seed(V2, "/slow", "cached").await;
        fx.network.set_route("/slow", FetchResponse::ok("late"));
        fx.network.set_delay(Duration::from_secs(10));
        let engine = fx.engine();

        let outcome = engine.handle(&FetchRequest::get("/slow"), &fx.current).await;

        assert_eq!(outcome.result.unwrap().body, b"cached".to_vec());
        assert_eq!(engine.metrics().snapshot().network_timeouts, 1);
    }

    #[tokio::test]
    async fn test_non_get_never_touches_cache() {
        let fx = Fixture::new().await;
        fx.network.set_route("/cart", FetchResponse::ok("added"));
        let engine = fx.engine();

        let outcome = engine.handle(&FetchRequest::post("/cart", "sku=1"), &fx.current).await;
        assert!(outcome.cache_write.is_none());
        assert_eq!(outcome.result.unwrap().body, b"added".to_vec());
        assert!(fx
            .store
            .keys(&CacheHandle::new(fx.current.clone()))
            .await
            .unwrap()
            .is_empty());

        fx.network.set_online(false);
        let outcome = engine.handle(&FetchRequest::post("/cart", "sku=1"), &fx.current).await;
        assert!(matches!(outcome.result, Err(FetchFailure::Network(_))));
    }

    #[tokio::test]
    async fn test_offline_post_never_reads_cached_get() {
        let store = Arc::new(CountingStore::default());
        let current = GenerationId::new(V2);
        let handle = store.open(&current).await.unwrap();
        let cart = StoredResponse::new(200, "cart page");
        store.put(&handle, &RequestKey::get("/cart"), cart).await.unwrap();

        let network = Arc::new(StaticNetwork::new());
        network.set_online(false);
        let timeout = TimeoutConfig::from_total(Duration::from_millis(100));
        let engine = NetworkFirst::new(FetchClient::new(network, timeout), store.clone())
            .with_stale_fallback(true)
            .with_offline_fallback(OfflineFallback::page("/cart"));

        let post = FetchRequest::post("/cart", "sku=1").with_header("accept", "text/html");
        let outcome = engine.handle(&post, &current).await;

        assert_eq!(outcome.state, FetchState::Failed);
        assert!(matches!(outcome.result, Err(FetchFailure::Network(_))));
        assert_eq!(store.gets.load(Ordering::SeqCst), 0);
        assert_eq!(store.puts.load(Ordering::SeqCst), 1);

        let get = engine.handle(&FetchRequest::get("/cart"), &current).await;
        assert_eq!(get.cache_status, Some(CacheStatus::Hit));
        assert!(store.gets.load(Ordering::SeqCst) > 0);
    }

    #[tokio::test]
    async fn test_stale_generation_only_when_enabled() {
        let fx = Fixture::new().await;
        fx.seed(V1, "/old.css", "old").await;
        fx.network.set_online(false);

        let strict = fx.engine();
        let outcome = strict.handle(&FetchRequest::get("/old.css"), &fx.current).await;
        assert_eq!(outcome.state, FetchState::Failed);

        let lenient = fx.engine().with_stale_fallback(true).with_explain_headers(true);
        let outcome = lenient.handle(&FetchRequest::get("/old.css"), &fx.current).await;
        assert_eq!(outcome.cache_status, Some(CacheStatus::Stale));

        let response = outcome.result.unwrap();
        assert_eq!(response.body, b"old".to_vec());
        assert_eq!(response.header(header_names::X_CACHE_STATUS), Some("STALE"));
        assert_eq!(response.header(header_names::X_CACHE_GENERATION), Some(V1));
        assert_eq!(lenient.metrics().snapshot().served_stale, 1);
    }

    #[tokio::test]
    async fn test_stale_fallback_skips_newer_generations() {
        let fx = Fixture::new().await;
        fx.seed(V3, "/next.js", "not yet active").await;
        fx.network.set_online(false);
        let engine = fx.engine().with_stale_fallback(true);

        let outcome = engine.handle(&FetchRequest::get("/next.js"), &fx.current).await;

        assert_eq!(outcome.state, FetchState::Failed);
        assert!(matches!(outcome.result, Err(FetchFailure::Unavailable { .. })));
        assert_eq!(engine.metrics().snapshot().served_stale, 0);
    }

    #[tokio::test]
    async fn test_varied_request_falls_back_to_plain_entry() {
        let fx = Fixture::new().await;
        fx.seed(V2, "/", "home").await;
        let handle = CacheHandle::new(fx.current.clone());
        let french = RequestKey::get("/").with_header("accept-language", "fr");
        fx.store
            .put(&handle, &french, StoredResponse::new(200, "accueil"))
            .await
            .unwrap();
        fx.network.set_online(false);
        let engine = fx
            .engine()
            .with_key_builder(RequestKeyBuilder::new().vary_on("Accept-Language"));

        let english = FetchRequest::get("/").with_header("accept-language", "en");
        let outcome = engine.handle(&english, &fx.current).await;
        assert_eq!(outcome.cache_status, Some(CacheStatus::Hit));
        assert_eq!(outcome.result.unwrap().body, b"home".to_vec());

        let french = FetchRequest::get("/").with_header("accept-language", "fr");
        let outcome = engine.handle(&french, &fx.current).await;
        assert_eq!(outcome.result.unwrap().body, b"accueil".to_vec());
    }

    #[tokio::test]
    async fn test_scope_matches_relative_and_absolute_urls() {
        let fx = Fixture::new().await;
        fx.network.set_route("/app.js", FetchResponse::ok("fresh"));
        let engine = fx
            .engine()
            .with_key_builder(RequestKeyBuilder::new().with_scope("https://shop.example.com/"));

        let mut outcome = engine.handle(&FetchRequest::get("/app.js"), &fx.current).await;
        outcome.wait_for_cache_write().await;
        fx.network.set_online(false);

        let absolute = FetchRequest::get("https://shop.example.com/app.js");
        let outcome = engine.handle(&absolute, &fx.current).await;
        assert_eq!(outcome.cache_status, Some(CacheStatus::Hit));
        assert_eq!(outcome.result.unwrap().body, b"fresh".to_vec());
    }

    #[tokio::test]
    async fn test_offline_page_for_navigations() {
        let fx = Fixture::new().await;
        fx.seed(V2, "/offline.html", "<h1>offline</h1>").await;
        fx.network.set_online(false);
        let engine = fx
            .engine()
            .with_offline_fallback(OfflineFallback::page("/offline.html"));

        let navigation = FetchRequest::get("/products/42").with_header("accept", "text/html");
        let outcome = engine.handle(&navigation, &fx.current).await;
        assert_eq!(outcome.cache_status, Some(CacheStatus::Offline));
        assert_eq!(outcome.result.unwrap().body, b"<h1>offline</h1>".to_vec());

        let image = FetchRequest::get("/products/42.png").with_header("accept", "image/png");
        let outcome = engine.handle(&image, &fx.current).await;
        assert_eq!(outcome.state, FetchState::Failed);
        assert_eq!(engine.metrics().snapshot().served_offline, 1);
    }

    #[tokio::test]
    async fn test_no_store_response_is_not_cached() {
        let fx = Fixture::new().await;
        fx.network.set_route(
            "/account",
            FetchResponse::ok("private").with_header("cache-control", "no-store"),
        );

        let outcome = fx.engine().handle(&FetchRequest::get("/account"), &fx.current).await;

        assert!(outcome.cache_write.is_none());
        assert!(outcome.is_served());
        assert!(fx.cached("/account").await.is_none());
    }

    #[tokio::test]
    async fn test_write_into_evicted_generation_is_swallowed() {
        let fx = Fixture::new().await;
        fx.network.set_route("/app.js", FetchResponse::ok("fresh"));
        let engine = fx.engine();
        let evicted = GenerationId::new(V0);

        let mut outcome = engine.handle(&FetchRequest::get("/app.js"), &evicted).await;
        outcome.wait_for_cache_write().await;

        assert!(outcome.is_served());
        assert!(fx.store.list_generations().await.unwrap().iter().all(|g| g != &evicted));
        assert_eq!(engine.metrics().snapshot().cache_write_failures, 1);
    }

    #[tokio::test]
    async fn test_explain_headers_on_network_response() {
        let fx = Fixture::new().await;
        fx.network.set_route("/", FetchResponse::ok("home"));
        let engine = fx.engine().with_explain_headers(true);

        let response = engine
            .handle(&FetchRequest::get("/"), &fx.current)
            .await
            .into_result()
            .unwrap();

        assert_eq!(response.header(header_names::X_CACHE_STATUS), Some("NETWORK"));
        assert_eq!(response.header(header_names::X_CACHE_GENERATION), None);
    }

    #[tokio::test]
    async fn test_pass_through_skips_cache() {
        let fx = Fixture::new().await;
        fx.seed(V2, "/app.js", "cached").await;
        fx.network.set_online(false);

        let outcome = fx.engine().pass_through(&FetchRequest::get("/app.js")).await;

        assert_eq!(outcome.state, FetchState::Failed);
        assert!(matches!(outcome.result, Err(FetchFailure::Network(_))));
    }

    #[test]
    fn test_from_config() {
        let config = WorkerConfig::new("v1")
            .with_scope("https://shop.example.com/")
            .with_offline_fallback("/offline.html")
            .with_stale_fallback(true)
            .with_explain_headers(true);
        let engine = NetworkFirst::from_config(
            &config,
            Arc::new(StaticNetwork::new()),
            Arc::new(InMemoryCacheStore::new()),
        );

        assert_eq!(engine.offline, OfflineFallback::page("/offline.html"));
        assert!(engine.stale_fallback);
        assert!(engine.explain_headers);
        assert_eq!(engine.client().timeout().total, Duration::from_millis(3000));
        assert_eq!(engine.keys.resolve("/app.js"), "https://shop.example.com/app.js");
    }
}
