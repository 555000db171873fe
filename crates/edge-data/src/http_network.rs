//! HTTP transport backed by `reqwest`.

use async_trait::async_trait;
use edge_core::{FetchRequest, FetchResponse};
use reqwest::Client;
use tracing::debug;
use url::Url;

use crate::client::{Network, NetworkError};
use crate::timeout::TimeoutConfig;

/// Network that performs real HTTP requests.
///
/// Scope-relative URLs such as `/app.js` are resolved against the configured
/// origin; without an origin they are rejected as invalid.
#[derive(Debug, Clone)]
pub struct HttpNetwork {
    client: Client,
    origin: Option<Url>,
    timeout: TimeoutConfig,
}

impl HttpNetwork {
    /// Create a transport with the given connect timeout.
    pub fn new(timeout: TimeoutConfig) -> Result<Self, NetworkError> {
        let client = Client::builder()
            .connect_timeout(timeout.connect)
            .build()
            .map_err(|e| NetworkError::Request(e.to_string()))?;

        Ok(Self {
            client,
            origin: None,
            timeout,
        })
    }

    /// Resolve relative URLs against `origin`.
    pub fn with_origin(mut self, origin: &str) -> Result<Self, NetworkError> {
        let parsed = Url::parse(origin)
            .map_err(|e| NetworkError::InvalidUrl(format!("{}: {}", origin, e)))?;
        self.origin = Some(parsed);
        Ok(self)
    }

    /// Resolve a request URL to an absolute URL.
    pub fn resolve(&self, url: &str) -> Result<Url, NetworkError> {
        match Url::parse(url) {
            Ok(parsed) => Ok(parsed),
            Err(url::ParseError::RelativeUrlWithoutBase) => self
                .origin
                .as_ref()
                .ok_or_else(|| NetworkError::InvalidUrl(format!("{}: no origin configured", url)))?
                .join(url)
                .map_err(|e| NetworkError::InvalidUrl(format!("{}: {}", url, e))),
            Err(e) => Err(NetworkError::InvalidUrl(format!("{}: {}", url, e))),
        }
    }

    fn classify(&self, err: reqwest::Error) -> NetworkError {
        if err.is_timeout() {
            NetworkError::Timeout(self.timeout.total)
        } else if err.is_connect() {
            NetworkError::Connection(err.to_string())
        } else {
            NetworkError::Request(err.to_string())
        }
    }
}

#[async_trait]
impl Network for HttpNetwork {
    async fn send(&self, request: &FetchRequest) -> Result<FetchResponse, NetworkError> {
        let url = self.resolve(&request.url)?;
        debug!(method = %request.method, url = %url, "Sending network request");

        let response = self
            .client
            .request(request.method.clone(), url)
            .headers(request.headers.clone())
            .body(request.body.clone())
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await.map_err(|e| self.classify(e))?.to_vec();

        Ok(FetchResponse {
            status,
            headers,
            body,
        })
    }
}
