//! Configuration error types.

use thiserror::Error;

/// Errors raised when validating a worker configuration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The version token that seeds generation ids is empty.
    #[error("cache_version_token must not be empty")]
    MissingVersionToken,

    /// The cache name prefix is empty.
    #[error("cache_name_prefix must not be empty")]
    MissingCachePrefix,

    /// A timeout was configured as zero.
    #[error("{0} must be greater than zero")]
    ZeroTimeout(&'static str),

    /// A manifest or fallback URL is blank or contains whitespace.
    #[error("invalid resource url: {0:?}")]
    InvalidUrl(String),

    /// The scope is not an absolute URL.
    #[error("scope must be an absolute url: {0:?}")]
    InvalidScope(String),
}
