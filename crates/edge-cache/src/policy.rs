//! Which responses may be stored.

use edge_core::{FetchRequest, FetchResponse};
use http::header::CACHE_CONTROL;
use http::StatusCode;

/// Why a response copy was not stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Only GET responses are cached.
    NonGetMethod,
    /// Status outside 2xx/3xx, or a partial response.
    Status(u16),
    /// The response carried `Cache-Control: no-store`.
    NoStore,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NonGetMethod => write!(f, "non-GET method"),
            Self::Status(code) => write!(f, "status {}", code),
            Self::NoStore => write!(f, "no-store"),
        }
    }
}

/// Outcome of a storage decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreDecision {
    Store,
    Skip(SkipReason),
}

/// Rules for writing network responses into a generation.
#[derive(Debug, Clone)]
pub struct StoragePolicy {
    /// Honour `Cache-Control: no-store` on responses.
    pub respect_no_store: bool,
}

impl Default for StoragePolicy {
    fn default() -> Self {
        Self {
            respect_no_store: true,
        }
    }
}

impl StoragePolicy {
    /// Create the default policy.
    pub fn new() -> Self {
        Self::default()
    }

    /// Ignore `Cache-Control: no-store`.
    pub fn ignore_no_store(mut self) -> Self {
        self.respect_no_store = false;
        self
    }

    /// Decide whether a response to `request` may be stored.
    pub fn decide(&self, request: &FetchRequest, response: &FetchResponse) -> StoreDecision {
        if !request.is_get() {
            return StoreDecision::Skip(SkipReason::NonGetMethod);
        }

        if !response.is_success_or_redirect() || response.status == StatusCode::PARTIAL_CONTENT {
            return StoreDecision::Skip(SkipReason::Status(response.status.as_u16()));
        }

        if self.respect_no_store && has_no_store(response) {
            return StoreDecision::Skip(SkipReason::NoStore);
        }

        StoreDecision::Store
    }
}

fn has_no_store(response: &FetchResponse) -> bool {
    response
        .headers
        .get_all(CACHE_CONTROL)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|directive| directive.trim().eq_ignore_ascii_case("no-store"))
}
