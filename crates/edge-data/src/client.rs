//! Network seam and timeout/retry client.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use edge_core::{FetchRequest, FetchResponse};
use tracing::debug;

use crate::retry::RetryPolicy;
use crate::timeout::TimeoutConfig;

/// Error type for network operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NetworkError {
    #[error("network timeout after {0:?}")]
    Timeout(Duration),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("request error: {0}")]
    Request(String),
}

impl NetworkError {
    /// Whether the attempt ran out of time.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

/// Transport used to reach the network.
#[async_trait]
pub trait Network: Send + Sync {
    /// Send a request and return whatever response the server produced.
    ///
    /// HTTP error statuses are responses, not errors.
    async fn send(&self, request: &FetchRequest) -> Result<FetchResponse, NetworkError>;
}

/// Network client with a bounded timeout per attempt.
#[derive(Clone)]
pub struct FetchClient {
    network: Arc<dyn Network>,
    timeout: TimeoutConfig,
}

impl FetchClient {
    /// Create a new fetch client.
    pub fn new(network: Arc<dyn Network>, timeout: TimeoutConfig) -> Self {
        Self { network, timeout }
    }

    /// The timeout applied to each attempt.
    pub fn timeout(&self) -> TimeoutConfig {
        self.timeout
    }

    /// Send one attempt, failing with `NetworkError::Timeout` when it runs long.
    ///
    /// Dropping the returned future cancels the in-flight attempt.
    pub async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, NetworkError> {
        match tokio::time::timeout(self.timeout.total, self.network.send(request)).await {
            Ok(result) => result,
            Err(_) => Err(NetworkError::Timeout(self.timeout.total)),
        }
    }

    /// Send with retries according to `policy`.
    pub async fn fetch_with_retry(
        &self,
        request: &FetchRequest,
        policy: &RetryPolicy,
    ) -> Result<FetchResponse, NetworkError> {
        let mut attempt = 0;

        loop {
            match self.fetch(request).await {
                Ok(response) if policy.should_retry_status(response.status.as_u16(), attempt) => {
                    debug!(
                        url = %request.url,
                        status = response.status.as_u16(),
                        attempt,
                        "Retrying after server error"
                    );
                }
                Ok(response) => return Ok(response),
                Err(err) if policy.should_retry_error(&err, attempt) => {
                    debug!(
                        url = %request.url,
                        error = %err,
                        attempt,
                        "Retrying after network error"
                    );
                }
                Err(err) => return Err(err),
            }

            tokio::time::sleep(policy.backoff.delay_for_attempt(attempt)).await;
            attempt += 1;
        }
    }
}

impl std::fmt::Debug for FetchClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchClient")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
