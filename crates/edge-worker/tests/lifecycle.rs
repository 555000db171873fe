//! End-to-end worker scenarios: install, activate, then fetch.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use edge_worker::prelude::*;
use http::StatusCode;

#[derive(Default)]
struct RecordingHost {
    skip_waiting: AtomicUsize,
    claim_clients: AtomicUsize,
}

#[async_trait]
impl WorkerHost for RecordingHost {
    async fn skip_waiting(&self) {
        self.skip_waiting.fetch_add(1, Ordering::SeqCst);
    }

    async fn claim_clients(&self) {
        self.claim_clients.fetch_add(1, Ordering::SeqCst);
    }
}

/// Store wrapper that counts reads.
#[derive(Default)]
struct CountingStore {
    inner: InMemoryCacheStore,
    gets: AtomicUsize,
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

fn site() -> Arc<StaticNetwork> {
    Arc::new(
        StaticNetwork::new()
            .with_route("/app.js", FetchResponse::ok("console.log('v2')"))
            .with_route("/styles.css", FetchResponse::ok("body{}"))
            .with_route(
                "/offline.html",
                FetchResponse::ok("<p>offline</p>").with_header("content-type", "text/html"),
            ),
    )
}

fn worker(
    config: WorkerConfig,
    network: Arc<StaticNetwork>,
    store: Arc<dyn CacheStore>,
) -> LifecycleController {
    LifecycleController::new(config, network, store).unwrap()
}

async fn activated(
    config: WorkerConfig,
    network: Arc<StaticNetwork>,
    store: Arc<dyn CacheStore>,
) -> LifecycleController {
    let worker = worker(config, network, store);
    worker.dispatch(LifecycleEvent::Install).await.unwrap();
    worker.dispatch(LifecycleEvent::Activate).await.unwrap();
    worker
}

#[tokio::test]
async fn install_precaches_every_manifest_url() {
    let store = Arc::new(InMemoryCacheStore::new());
    let config = WorkerConfig::new("v2").with_manifest(["/app.js", "/styles.css"]);
    let worker = worker(config, site(), store.clone());

    let outcome = worker.dispatch(LifecycleEvent::Install).await.unwrap();
    let LifecycleOutcome::Installed(report) = outcome else {
        panic!("expected install report");
    };

    assert!(report.is_complete());
    let handle = store.open(&report.generation).await.unwrap();
    for url in ["/app.js", "/styles.css"] {
        assert!(store.get(&handle, &RequestKey::get(url)).await.unwrap().is_some());
    }
    assert_eq!(worker.metrics().snapshot().precache_succeeded, 2);
}

#[tokio::test]
async fn activate_leaves_only_the_current_generation() {
    let store = Arc::new(InMemoryCacheStore::new());
    for old in ["edge-cache-v0", "edge-cache-v1"] {
        store.open(&GenerationId::new(old)).await.unwrap();
    }

    let worker = activated(WorkerConfig::new("v2"), site(), store.clone()).await;

    assert_eq!(
        store.list_generations().await.unwrap(),
        vec![GenerationId::new("edge-cache-v2")]
    );
    assert_eq!(worker.generations().current(), Some(GenerationId::new("edge-cache-v2")));
    assert_eq!(worker.metrics().snapshot().generations_evicted, 2);
}

#[tokio::test]
async fn offline_fetch_serves_precached_copy_and_fails_otherwise() {
    let network = site();
    let store = Arc::new(InMemoryCacheStore::new());
    let config = WorkerConfig::new("v2").with_manifest(["/app.js"]);
    let worker = activated(config, network.clone(), store).await;

    network.set_online(false);

    let hit = worker.fetch(&FetchRequest::get("/app.js")).await;
    assert_eq!(hit.state, FetchState::Served(ResponseSource::Cache));
    assert_eq!(hit.into_result().unwrap().body, b"console.log('v2')".to_vec());

    let miss = worker.fetch(&FetchRequest::get("/missing.png")).await;
    assert_eq!(miss.state, FetchState::Failed);
    assert!(matches!(miss.into_result(), Err(FetchFailure::Unavailable { .. })));
}

#[tokio::test]
async fn network_responses_refresh_the_cache() {
    let network = site();
    let store = Arc::new(InMemoryCacheStore::new());
    let worker = activated(WorkerConfig::new("v2"), network.clone(), store).await;

    network.set_route("/api/products", FetchResponse::ok("[1,2,3]"));
    let mut first = worker.fetch(&FetchRequest::get("/api/products")).await;
    first.wait_for_cache_write().await;

    network.set_online(false);
    let second = worker.fetch(&FetchRequest::get("/api/products")).await;

    assert_eq!(second.into_result().unwrap().body, b"[1,2,3]".to_vec());
    assert_eq!(worker.metrics().snapshot().cache_writes, 1);
}

#[tokio::test]
async fn non_get_requests_never_reach_the_cache() {
    let network = site();
    let store = Arc::new(InMemoryCacheStore::new());
    let worker = activated(WorkerConfig::new("v2"), network.clone(), store.clone()).await;

    network.set_route("/cart", FetchResponse::ok("ok"));
    let outcome = worker.fetch(&FetchRequest::post("/cart", "sku=7")).await;
    assert!(outcome.cache_write.is_none());

    let handle = store.open(&GenerationId::new("edge-cache-v2")).await.unwrap();
    assert!(store.keys(&handle).await.unwrap().is_empty());
}

#[tokio::test]
async fn offline_post_is_not_answered_from_a_cached_get() {
    let network = site();
    network.set_route("/cart", FetchResponse::ok("<p>cart</p>"));
    let store = Arc::new(CountingStore::default());
    let config = WorkerConfig::new("v2")
        .with_manifest(["/cart"])
        .with_stale_fallback(true);
    let worker = activated(config, network.clone(), store.clone()).await;
    network.set_online(false);
    let reads_before = store.gets.load(Ordering::SeqCst);

    let outcome = worker.fetch(&FetchRequest::post("/cart", "sku=7")).await;

    assert_eq!(outcome.state, FetchState::Failed);
    assert!(matches!(outcome.result, Err(FetchFailure::Network(_))));
    assert_eq!(store.gets.load(Ordering::SeqCst), reads_before);

    let get = worker.fetch(&FetchRequest::get("/cart")).await;
    assert_eq!(get.into_result().unwrap().body, b"<p>cart</p>".to_vec());
}

#[tokio::test]
async fn precached_relative_url_serves_absolute_request() {
    let network = site();
    let config = WorkerConfig::new("v2")
        .with_scope("https://shop.example.com/")
        .with_manifest(["/app.js"]);
    let worker = activated(config, network.clone(), Arc::new(InMemoryCacheStore::new())).await;

    network.set_online(false);
    let outcome = worker
        .fetch(&FetchRequest::get("https://shop.example.com/app.js"))
        .await;

    assert_eq!(outcome.state, FetchState::Served(ResponseSource::Cache));
    assert_eq!(outcome.into_result().unwrap().body, b"console.log('v2')".to_vec());
}

#[tokio::test]
async fn precached_entry_serves_requests_with_vary_headers() {
    let network = site();
    let config = WorkerConfig::new("v2")
        .vary_on("Accept-Language")
        .with_manifest(["/app.js"]);
    let worker = activated(config, network.clone(), Arc::new(InMemoryCacheStore::new())).await;

    network.set_online(false);
    let request = FetchRequest::get("/app.js").with_header("accept-language", "en");
    let outcome = worker.fetch(&request).await;

    assert_eq!(outcome.state, FetchState::Served(ResponseSource::Cache));
    assert_eq!(outcome.into_result().unwrap().body, b"console.log('v2')".to_vec());
}

#[tokio::test]
async fn fetch_before_activation_bypasses_the_cache() {
    let network = site();
    let store = Arc::new(InMemoryCacheStore::new());
    let config = WorkerConfig::new("v2").with_manifest(["/app.js"]);
    let worker = worker(config, network.clone(), store);

    worker.dispatch(LifecycleEvent::Install).await.unwrap();
    network.set_online(false);

    let outcome = worker
        .dispatch(LifecycleEvent::Fetch(FetchRequest::get("/app.js")))
        .await
        .unwrap();
    let LifecycleOutcome::Fetched(outcome) = outcome else {
        panic!("expected fetch outcome");
    };
    assert!(matches!(outcome.result, Err(FetchFailure::Network(_))));
}

#[tokio::test]
async fn host_signals_follow_configuration() {
    let host = Arc::new(RecordingHost::default());
    let config = WorkerConfig::new("v2")
        .with_skip_waiting(true)
        .with_claim_clients(true);
    let worker =
        worker(config, site(), Arc::new(InMemoryCacheStore::new())).with_host(host.clone());

    worker.install().await.unwrap();
    assert_eq!(host.skip_waiting.load(Ordering::SeqCst), 1);
    assert_eq!(host.claim_clients.load(Ordering::SeqCst), 0);

    worker.activate().await.unwrap();
    assert_eq!(host.claim_clients.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn host_signals_are_off_by_default() {
    let host = Arc::new(RecordingHost::default());
    let store = Arc::new(InMemoryCacheStore::new());
    let worker = worker(WorkerConfig::new("v2"), site(), store).with_host(host.clone());

    worker.install().await.unwrap();
    worker.activate().await.unwrap();

    assert_eq!(host.skip_waiting.load(Ordering::SeqCst), 0);
    assert_eq!(host.claim_clients.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn second_activate_is_rejected() {
    let store = Arc::new(InMemoryCacheStore::new());
    let worker = activated(WorkerConfig::new("v2"), site(), store).await;

    let err = worker.dispatch(LifecycleEvent::Activate).await.unwrap_err();
    assert!(matches!(
        err,
        WorkerError::InvalidTransition {
            state: WorkerState::Activated,
            ..
        }
    ));
}

#[tokio::test]
async fn unopenable_generation_makes_worker_redundant() {
    let not_a_dir = tempfile::NamedTempFile::new().unwrap();
    let store = Arc::new(FileCacheStore::new(not_a_dir.path()));
    let worker = worker(WorkerConfig::new("v2"), site(), store);

    let err = worker.dispatch(LifecycleEvent::Install).await.unwrap_err();

    assert!(matches!(err, WorkerError::Install(_)));
    assert_eq!(worker.state(), WorkerState::Redundant);
    assert!(worker.dispatch(LifecycleEvent::Activate).await.is_err());
}

#[tokio::test(start_paused = true)]
async fn install_completes_when_precache_runs_long() {
    let network = site();
    network.set_delay(Duration::from_secs(20));
    let config = WorkerConfig::new("v2")
        .with_manifest(["/app.js"])
        .with_network_timeout(Duration::from_secs(60))
        .with_install_timeout(Duration::from_secs(2));
    let worker = worker(config, network, Arc::new(InMemoryCacheStore::new()));

    let report = worker.install().await.unwrap();

    assert!(report.timed_out);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(worker.state(), WorkerState::Installed);
}

#[tokio::test]
async fn upgrade_replaces_previous_version() {
    let network = site();
    let store: Arc<dyn CacheStore> = Arc::new(InMemoryCacheStore::new());

    let v1 = activated(
        WorkerConfig::new("v1").with_manifest(["/app.js"]),
        network.clone(),
        store.clone(),
    )
    .await;
    assert_eq!(v1.generations().current(), Some(GenerationId::new("edge-cache-v1")));

    network.set_route("/app.js", FetchResponse::ok("console.log('v3')"));
    let v3 = worker(
        WorkerConfig::new("v3").with_manifest(["/app.js"]),
        network.clone(),
        store.clone(),
    );
    v3.install().await.unwrap();
    assert_eq!(store.list_generations().await.unwrap().len(), 2);

    v3.activate().await.unwrap();
    assert_eq!(
        store.list_generations().await.unwrap(),
        vec![GenerationId::new("edge-cache-v3")]
    );

    network.set_online(false);
    let body = v3
        .fetch(&FetchRequest::get("/app.js"))
        .await
        .into_result()
        .unwrap()
        .body;
    assert_eq!(body, b"console.log('v3')".to_vec());
}

#[tokio::test]
async fn offline_navigation_gets_fallback_page() {
    let network = site();
    let config = WorkerConfig::new("v2")
        .with_manifest(["/offline.html"])
        .with_offline_fallback("/offline.html")
        .with_explain_headers(true);
    let worker = activated(config, network.clone(), Arc::new(InMemoryCacheStore::new())).await;

    network.set_online(false);
    let request = FetchRequest::get("/checkout").with_header("accept", "text/html");
    let response = worker.fetch(&request).await.into_result().unwrap();

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body, b"<p>offline</p>".to_vec());
    assert_eq!(response.header(header_names::X_CACHE_STATUS), Some("OFFLINE"));
    assert_eq!(worker.metrics().snapshot().served_offline, 1);
}

#[tokio::test]
async fn file_store_survives_a_restart() {
    let dir = tempfile::tempdir().unwrap();
    let network = site();

    {
        let store = Arc::new(FileCacheStore::new(dir.path()));
        store.init().await.unwrap();
        activated(
            WorkerConfig::new("v2").with_manifest(["/styles.css"]),
            network.clone(),
            store,
        )
        .await;
    }

    let store = Arc::new(FileCacheStore::new(dir.path()));
    store.init().await.unwrap();
    let worker = activated(WorkerConfig::new("v2"), network.clone(), store).await;

    network.set_online(false);
    let body = worker
        .fetch(&FetchRequest::get("/styles.css"))
        .await
        .into_result()
        .unwrap()
        .body;
    assert_eq!(body, b"body{}".to_vec());
}
