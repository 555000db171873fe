//! Storage error types.

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StorageError>;

/// Errors reported by a cache store.
///
/// None of these are retried by the store; callers decide whether to skip
/// caching the response.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Writing the entry would exceed the store's byte quota.
    #[error("storage quota exceeded: entry needs {needed} bytes, {available} available")]
    QuotaExceeded { needed: u64, available: u64 },

    /// The generation was never opened or has been deleted.
    #[error("unknown cache generation: {0}")]
    UnknownGeneration(String),

    /// Backend I/O failure.
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to serialize or deserialize an entry.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl StorageError {
    /// Whether this error is a quota rejection.
    pub fn is_quota(&self) -> bool {
        matches!(self, Self::QuotaExceeded { .. })
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
