//! In-memory network (for development/testing).

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use edge_core::{FetchRequest, FetchResponse};
use http::{Method, StatusCode};

use crate::client::{Network, NetworkError};

/// Network that answers from a fixed route table.
///
/// Unknown URLs get `404 Not Found`. Switching the network offline makes
/// every request fail with a connection error.
#[derive(Debug)]
pub struct StaticNetwork {
    routes: Mutex<HashMap<String, FetchResponse>>,
    requests: Mutex<Vec<(Method, String)>>,
    online: AtomicBool,
    delay_ms: AtomicU64,
}

impl Default for StaticNetwork {
    fn default() -> Self {
        Self::new()
    }
}

impl StaticNetwork {
    /// Create an empty, online network.
    pub fn new() -> Self {
        Self {
            routes: Mutex::new(HashMap::new()),
            requests: Mutex::new(Vec::new()),
            online: AtomicBool::new(true),
            delay_ms: AtomicU64::new(0),
        }
    }

    /// Add a route.
    pub fn with_route(self, url: impl Into<String>, response: FetchResponse) -> Self {
        self.set_route(url, response);
        self
    }

    /// Add or replace a route.
    pub fn set_route(&self, url: impl Into<String>, response: FetchResponse) {
        self.routes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(url.into(), response);
    }

    /// Remove a route so it answers 404.
    pub fn remove_route(&self, url: &str) {
        self.routes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(url);
    }

    /// Bring the network up or down.
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    /// Delay every answer.
    pub fn set_delay(&self, delay: Duration) {
        self.delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Number of requests received.
    pub fn request_count(&self) -> usize {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Requests received, in order.
    pub fn requests(&self) -> Vec<(Method, String)> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl Network for StaticNetwork {
    async fn send(&self, request: &FetchRequest) -> Result<FetchResponse, NetworkError> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((request.method.clone(), request.url.clone()));

        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        if !self.online.load(Ordering::SeqCst) {
            return Err(NetworkError::Connection("network unreachable".to_string()));
        }

        let response = self
            .routes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&request.url)
            .cloned();

        Ok(response.unwrap_or_else(|| FetchResponse::new(StatusCode::NOT_FOUND)))
    }
}
