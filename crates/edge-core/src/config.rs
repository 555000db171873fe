//! Worker configuration supplied at build/deploy time.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Configuration for a worker instance.
///
/// Field names are snake_case; the camelCase spellings emitted by
/// JavaScript build tooling are accepted as aliases.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Build/version token that seeds the generation id.
    #[serde(alias = "cacheVersionToken")]
    pub cache_version_token: String,

    /// Prefix shared by every generation this worker creates.
    #[serde(default = "default_cache_prefix", alias = "cacheNamePrefix")]
    pub cache_name_prefix: String,

    /// Absolute origin (or scope URL) that relative request URLs resolve against.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,

    /// URLs fetched into the new generation on install.
    #[serde(default, alias = "precacheManifest")]
    pub precache_manifest: Vec<String>,

    /// Bound on each network attempt, in milliseconds.
    #[serde(default = "default_network_timeout_ms", alias = "networkTimeoutMs")]
    pub network_timeout_ms: u64,

    /// Bound on the whole precache step, in milliseconds.
    #[serde(default = "default_install_timeout_ms", alias = "installTimeoutMs")]
    pub install_timeout_ms: u64,

    /// Extra attempts per manifest URL during precache.
    #[serde(default, alias = "precacheRetries")]
    pub precache_retries: u32,

    /// Replace the active worker as soon as install completes.
    #[serde(default, alias = "skipWaiting")]
    pub skip_waiting: bool,

    /// Take control of open clients once activate completes.
    #[serde(default, alias = "claimClients")]
    pub claim_clients: bool,

    /// Consult older generations when the current one misses.
    #[serde(default, alias = "fallbackToStaleGeneration")]
    pub fallback_to_stale_generation: bool,

    /// Cached page served to navigations when network and cache both fail.
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "offlineFallback")]
    pub offline_fallback: Option<String>,

    /// Request headers that take part in the cache key.
    #[serde(default, alias = "varyHeaders")]
    pub vary_headers: Vec<String>,

    /// Annotate served responses with cache debugging headers.
    #[serde(default, alias = "explainHeaders")]
    pub explain_headers: bool,
}

fn default_cache_prefix() -> String {
    "edge-cache".to_string()
}

fn default_network_timeout_ms() -> u64 {
    3000
}

fn default_install_timeout_ms() -> u64 {
    30_000
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self::new("v1")
    }
}

impl WorkerConfig {
    /// Create a configuration for a version token with all other defaults.
    pub fn new(cache_version_token: impl Into<String>) -> Self {
        Self {
            cache_version_token: cache_version_token.into(),
            cache_name_prefix: default_cache_prefix(),
            scope: None,
            precache_manifest: Vec::new(),
            network_timeout_ms: default_network_timeout_ms(),
            install_timeout_ms: default_install_timeout_ms(),
            precache_retries: 0,
            skip_waiting: false,
            claim_clients: false,
            fallback_to_stale_generation: false,
            offline_fallback: None,
            vary_headers: Vec::new(),
            explain_headers: false,
        }
    }

    /// Load config from a `.toml` or `.json` file and validate it.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = if path.extension().is_some_and(|ext| ext == "json") {
            serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse JSON config: {}", path.display()))?
        } else {
            toml::from_str(&content)
                .with_context(|| format!("Failed to parse TOML config: {}", path.display()))?
        };

        config
            .validate()
            .with_context(|| format!("Invalid config: {}", path.display()))?;
        Ok(config)
    }

    /// Check the configuration for values the worker cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cache_version_token.trim().is_empty() {
            return Err(ConfigError::MissingVersionToken);
        }
        if self.cache_name_prefix.trim().is_empty() {
            return Err(ConfigError::MissingCachePrefix);
        }
        if self.network_timeout_ms == 0 {
            return Err(ConfigError::ZeroTimeout("network_timeout_ms"));
        }
        if self.install_timeout_ms == 0 {
            return Err(ConfigError::ZeroTimeout("install_timeout_ms"));
        }

        if let Some(scope) = &self.scope {
            let absolute = scope
                .parse::<http::Uri>()
                .is_ok_and(|uri| uri.scheme().is_some() && uri.authority().is_some());
            if !absolute {
                return Err(ConfigError::InvalidScope(scope.clone()));
            }
        }

        let urls = self
            .precache_manifest
            .iter()
            .chain(self.offline_fallback.iter());
        for url in urls {
            if url.is_empty() || url.chars().any(char::is_whitespace) {
                return Err(ConfigError::InvalidUrl(url.clone()));
            }
        }

        Ok(())
    }

    /// Name of the generation this configuration installs.
    pub fn generation_name(&self) -> String {
        format!("{}-{}", self.cache_name_prefix, self.cache_version_token)
    }

    /// Network timeout as a duration.
    pub fn network_timeout(&self) -> Duration {
        Duration::from_millis(self.network_timeout_ms)
    }

    /// Install timeout as a duration.
    pub fn install_timeout(&self) -> Duration {
        Duration::from_millis(self.install_timeout_ms)
    }

    /// Resolve relative request URLs against `scope`.
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    /// Set the precache manifest.
    pub fn with_manifest<I, S>(mut self, urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.precache_manifest = urls.into_iter().map(Into::into).collect();
        self
    }

    /// Set the network timeout.
    pub fn with_network_timeout(mut self, timeout: Duration) -> Self {
        self.network_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set the install timeout.
    pub fn with_install_timeout(mut self, timeout: Duration) -> Self {
        self.install_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set precache retries.
    pub fn with_precache_retries(mut self, retries: u32) -> Self {
        self.precache_retries = retries;
        self
    }

    /// Enable or disable skip-waiting.
    pub fn with_skip_waiting(mut self, enabled: bool) -> Self {
        self.skip_waiting = enabled;
        self
    }

    /// Enable or disable client claiming.
    pub fn with_claim_clients(mut self, enabled: bool) -> Self {
        self.claim_clients = enabled;
        self
    }

    /// Enable or disable stale generation fallback.
    pub fn with_stale_fallback(mut self, enabled: bool) -> Self {
        self.fallback_to_stale_generation = enabled;
        self
    }

    /// Set the offline fallback page.
    pub fn with_offline_fallback(mut self, url: impl Into<String>) -> Self {
        self.offline_fallback = Some(url.into());
        self
    }

    /// Add a request header to the cache key.
    pub fn vary_on(mut self, header: impl Into<String>) -> Self {
        self.vary_headers.push(header.into());
        self
    }

    /// Enable or disable explain headers.
    pub fn with_explain_headers(mut self, enabled: bool) -> Self {
        self.explain_headers = enabled;
        self
    }
}
