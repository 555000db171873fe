//! Stored response copies.

use chrono::{DateTime, Utc};
use edge_core::FetchResponse;
use http::header::{HeaderName, HeaderValue};
use http::{HeaderMap, StatusCode};

/// A response copy owned by exactly one cache generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response headers in wire order.
    pub headers: Vec<(String, String)>,
    /// Response payload.
    pub body: Vec<u8>,
    /// When the copy was written.
    pub stored_at: DateTime<Utc>,
}

impl StoredResponse {
    /// Create a stored response timestamped now.
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
            stored_at: Utc::now(),
        }
    }

    /// Copy a network response for storage.
    pub fn from_response(response: &FetchResponse) -> Self {
        let headers = response
            .headers
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();

        Self {
            status: response.status.as_u16(),
            headers,
            body: response.body.clone(),
            stored_at: Utc::now(),
        }
    }

    /// Rebuild a host response from the stored copy.
    pub fn to_response(&self) -> FetchResponse {
        let mut headers = HeaderMap::new();
        for (name, value) in &self.headers {
            if let (Ok(name), Ok(value)) = (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                headers.append(name, value);
            }
        }

        FetchResponse {
            status: StatusCode::from_u16(self.status).unwrap_or(StatusCode::OK),
            headers,
            body: self.body.clone(),
        }
    }

    /// Add a header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Age in seconds.
    pub fn age_secs(&self) -> u64 {
        (Utc::now() - self.stored_at).num_seconds().max(0) as u64
    }

    /// Approximate storage footprint in bytes.
    pub fn size(&self) -> u64 {
        let header_bytes: usize = self
            .headers
            .iter()
            .map(|(n, v)| n.len() + v.len())
            .sum();
        (self.body.len() + header_bytes) as u64
    }
}
