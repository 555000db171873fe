//! Request and response values exchanged with the host.

use std::sync::atomic::{AtomicU32, Ordering};

use http::header::{HeaderName, HeaderValue, ACCEPT};
use http::{HeaderMap, Method, StatusCode};

/// Unique request identifier for tracing.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestId(pub String);

impl RequestId {
    /// Generate a new request ID.
    pub fn generate() -> Self {
        let id = format!(
            "{:x}-{:x}",
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_nanos(),
            next_sequence()
        );
        Self(id)
    }

    /// Create from an existing ID string.
    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

fn next_sequence() -> u32 {
    static SEQUENCE: AtomicU32 = AtomicU32::new(0);
    SEQUENCE.fetch_add(1, Ordering::Relaxed)
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A request intercepted by the worker.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    /// Unique request identifier.
    pub request_id: RequestId,
    /// HTTP method.
    pub method: Method,
    /// Request URL, absolute or scope-relative (e.g. `/app.js`).
    pub url: String,
    /// Request headers.
    pub headers: HeaderMap,
    /// Request body.
    pub body: Vec<u8>,
}

impl FetchRequest {
    /// Create a new request.
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            request_id: RequestId::generate(),
            method,
            url: url.into(),
            headers: HeaderMap::new(),
            body: Vec::new(),
        }
    }

    /// Create a GET request.
    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    /// Create a POST request with a body.
    pub fn post(url: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        Self::new(Method::POST, url).with_body(body)
    }

    /// Add a header. Names or values that are not valid HTTP are ignored.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            self.headers.insert(name, value);
        }
        self
    }

    /// Set the request body.
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Whether this is a GET request.
    pub fn is_get(&self) -> bool {
        self.method == Method::GET
    }

    /// Get a header value by name (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Whether the client asked for an HTML document (a navigation).
    pub fn accepts_html(&self) -> bool {
        self.headers
            .get(ACCEPT)
            .and_then(|v| v.to_str().ok())
            .map(|accept| accept.contains("text/html"))
            .unwrap_or(false)
    }
}

/// A response handed back to the host.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchResponse {
    /// HTTP status.
    pub status: StatusCode,
    /// Response headers.
    pub headers: HeaderMap,
    /// Response body.
    pub body: Vec<u8>,
}

impl FetchResponse {
    /// Create an empty response with the given status.
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: Vec::new(),
        }
    }

    /// Create a `200 OK` response with a body.
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self::new(StatusCode::OK).with_body(body)
    }

    /// Add a header. Names or values that are not valid HTTP are ignored.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            self.headers.insert(name, value);
        }
        self
    }

    /// Set the response body.
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Whether the status is 2xx or 3xx.
    pub fn is_success_or_redirect(&self) -> bool {
        self.status.is_success() || self.status.is_redirection()
    }

    /// Get a header value by name (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}
