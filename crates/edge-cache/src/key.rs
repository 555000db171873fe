//! Request key composition.

use std::fmt;

use edge_core::{FetchRequest, WorkerConfig};
use http::Method;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::warn;
use url::Url;

/// Normalized identity of a request: method, URL and relevant headers.
///
/// Two requests are equivalent iff their keys are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequestKey {
    method: String,
    url: String,
    /// Lower-cased header names with trimmed values, sorted by name.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    headers: Vec<(String, String)>,
}

impl RequestKey {
    /// Create a key from a method and URL.
    pub fn new(method: &Method, url: &str) -> Self {
        Self {
            method: method.as_str().to_ascii_uppercase(),
            url: normalize_url(url),
            headers: Vec::new(),
        }
    }

    /// Create a GET key for a URL.
    pub fn get(url: &str) -> Self {
        Self::new(&Method::GET, url)
    }

    /// Add a header to the key.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        let name = name.to_ascii_lowercase();
        self.headers.retain(|(n, _)| *n != name);
        self.headers.push((name, value.trim().to_string()));
        self.headers.sort();
        self
    }

    /// The upper-cased method.
    pub fn method(&self) -> &str {
        &self.method
    }

    /// The normalized URL.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Headers taking part in the key.
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// The same key with no varying headers.
    pub fn without_headers(&self) -> Self {
        Self {
            method: self.method.clone(),
            url: self.url.clone(),
            headers: Vec::new(),
        }
    }

    /// Stable SHA-256 digest of the key, hex encoded.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.method.as_bytes());
        hasher.update(b"\n");
        hasher.update(self.url.as_bytes());
        for (name, value) in &self.headers {
            hasher.update(b"\n");
            hasher.update(name.as_bytes());
            hasher.update(b"=");
            hasher.update(value.as_bytes());
        }
        hex::encode(hasher.finalize())
    }
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.url)?;
        for (name, value) in &self.headers {
            write!(f, " [{}={}]", name, value)?;
        }
        Ok(())
    }
}

/// Strip the fragment and canonicalize absolute URLs.
///
/// Scope-relative paths such as `/app.js` cannot be parsed without a base and
/// are kept verbatim apart from the fragment.
pub fn normalize_url(url: &str) -> String {
    let without_fragment = url.split('#').next().unwrap_or(url);

    match Url::parse(without_fragment) {
        Ok(parsed) => parsed.to_string(),
        Err(_) => without_fragment.to_string(),
    }
}

/// Builder for request keys from intercepted requests.
///
/// With a scope set, relative URLs are resolved against it so `/app.js` and
/// `https://shop.example.com/app.js` share one key.
#[derive(Debug, Clone, Default)]
pub struct RequestKeyBuilder {
    vary: Vec<String>,
    scope: Option<Url>,
}

impl RequestKeyBuilder {
    /// Create a builder that keys on method and URL only.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from the worker's `scope` and `vary_headers`.
    pub fn from_config(config: &WorkerConfig) -> Self {
        let builder = Self::from_vary_headers(&config.vary_headers);
        match config.scope.as_deref() {
            Some(scope) => builder.with_scope(scope),
            None => builder,
        }
    }

    /// Resolve relative URLs against `scope`.
    ///
    /// A scope that is not an absolute URL is ignored.
    pub fn with_scope(mut self, scope: &str) -> Self {
        match Url::parse(scope) {
            Ok(url) => self.scope = Some(url),
            Err(e) => warn!(scope = %scope, error = %e, "Ignoring invalid worker scope"),
        }
        self
    }

    /// The URL a key is built from: absolute when a scope is known.
    pub fn resolve(&self, url: &str) -> String {
        match &self.scope {
            Some(scope) if Url::parse(url).is_err() => scope
                .join(url)
                .map(|u| u.to_string())
                .unwrap_or_else(|_| url.to_string()),
            _ => url.to_string(),
        }
    }

    /// Include a request header in the key.
    pub fn vary_on(mut self, header: impl Into<String>) -> Self {
        self.vary.push(header.into().to_ascii_lowercase());
        self
    }

    /// Build from a list of header names.
    pub fn from_vary_headers(headers: &[String]) -> Self {
        headers
            .iter()
            .fold(Self::new(), |builder, h| builder.vary_on(h.as_str()))
    }

    /// Build the key for a request.
    pub fn build(&self, request: &FetchRequest) -> RequestKey {
        self.vary.iter().fold(
            RequestKey::new(&request.method, &self.resolve(&request.url)),
            |key, name| match request.header(name) {
                Some(value) => key.with_header(name, value),
                None => key,
            },
        )
    }

    /// Build the header-less GET key for a URL.
    ///
    /// Manifest and offline-page entries are stored under this key; lookups
    /// for varied requests fall back to it.
    pub fn build_for_url(&self, url: &str) -> RequestKey {
        RequestKey::get(&self.resolve(url))
    }
}
