//! Cache debugging headers.

use std::fmt;

use edge_core::FetchResponse;
use http::header::HeaderValue;

use crate::store::GenerationId;

/// Header names for cache debugging.
pub mod header_names {
    /// How the response was served (NETWORK, HIT, STALE, OFFLINE).
    pub const X_CACHE_STATUS: &str = "x-cache-status";
    /// Generation a cached response came from.
    pub const X_CACHE_GENERATION: &str = "x-cache-generation";
    /// Age of a cached response in seconds.
    pub const X_CACHE_AGE: &str = "x-cache-age";
}

/// How a response was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    /// Fresh from the network.
    Network,
    /// From the current generation.
    Hit,
    /// From an older generation.
    Stale,
    /// The configured offline fallback page.
    Offline,
}

impl fmt::Display for CacheStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Network => write!(f, "NETWORK"),
            Self::Hit => write!(f, "HIT"),
            Self::Stale => write!(f, "STALE"),
            Self::Offline => write!(f, "OFFLINE"),
        }
    }
}

/// Cache explain headers for debugging.
#[derive(Debug, Clone)]
pub struct CacheExplainHeaders {
    /// Overall cache status.
    pub status: CacheStatus,
    /// Generation the entry was read from.
    pub generation: Option<GenerationId>,
    /// Age of the cached entry in seconds.
    pub age_secs: Option<u64>,
}

impl CacheExplainHeaders {
    /// Create explain headers with a status.
    pub fn new(status: CacheStatus) -> Self {
        Self {
            status,
            generation: None,
            age_secs: None,
        }
    }

    /// Set the source generation.
    pub fn with_generation(mut self, generation: GenerationId) -> Self {
        self.generation = Some(generation);
        self
    }

    /// Set the entry age.
    pub fn with_age(mut self, age_secs: u64) -> Self {
        self.age_secs = Some(age_secs);
        self
    }

    /// Write the headers onto a response.
    pub fn apply(&self, response: &mut FetchResponse) {
        response.headers.insert(
            header_names::X_CACHE_STATUS,
            HeaderValue::from_static(match self.status {
                CacheStatus::Network => "NETWORK",
                CacheStatus::Hit => "HIT",
                CacheStatus::Stale => "STALE",
                CacheStatus::Offline => "OFFLINE",
            }),
        );

        if let Some(value) = self
            .generation
            .as_ref()
            .and_then(|g| HeaderValue::from_str(g.as_str()).ok())
        {
            response
                .headers
                .insert(header_names::X_CACHE_GENERATION, value);
        }

        if let Some(age) = self.age_secs {
            response
                .headers
                .insert(header_names::X_CACHE_AGE, HeaderValue::from(age));
        }
    }
}
