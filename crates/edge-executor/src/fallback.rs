//! Fallback strategies for requests the network and cache both miss.

use edge_core::FetchRequest;

/// What to do when a request cannot be answered from network or cache.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum OfflineFallback {
    /// Hand the failure to the host.
    #[default]
    Propagate,

    /// Serve a cached page to navigations.
    Page(String),
}

impl OfflineFallback {
    /// Create a fallback that serves the page cached under `url`.
    pub fn page(url: impl Into<String>) -> Self {
        Self::Page(url.into())
    }

    /// Build from the optional `offline_fallback` setting.
    pub fn from_setting(url: Option<&str>) -> Self {
        match url {
            Some(url) if !url.trim().is_empty() => Self::page(url.trim()),
            _ => Self::Propagate,
        }
    }

    /// The fallback page URL for `request`, if one applies.
    ///
    /// Only navigation-style GETs (an `Accept` header naming `text/html`)
    /// receive the page.
    pub fn page_for(&self, request: &FetchRequest) -> Option<&str> {
        match self {
            Self::Page(url) if request.is_get() && request.accepts_html() => Some(url),
            _ => None,
        }
    }
}
