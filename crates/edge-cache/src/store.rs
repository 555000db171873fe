//! The cache store contract.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::StoreResult;
use crate::key::RequestKey;
use crate::response::StoredResponse;

/// Identifier of a cache generation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GenerationId(String);

impl GenerationId {
    /// Create a generation id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the id string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GenerationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for GenerationId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for GenerationId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Handle to an opened generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheHandle {
    generation: GenerationId,
}

impl CacheHandle {
    /// Create a handle. Stores call this from `open`.
    pub fn new(generation: GenerationId) -> Self {
        Self { generation }
    }

    /// The generation this handle refers to.
    pub fn generation(&self) -> &GenerationId {
        &self.generation
    }
}

/// Persistent key-value store of responses, scoped by generation.
///
/// Writes to distinct keys never conflict. Concurrent writes to the same key
/// are last-writer-wins. Each `put` is atomic: a reader sees either the old
/// entry or the new one.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Open a generation, creating it if absent.
    async fn open(&self, generation: &GenerationId) -> StoreResult<CacheHandle>;

    /// Look up an entry. `None` is a cache miss, including for a generation
    /// that has since been deleted.
    async fn get(
        &self,
        handle: &CacheHandle,
        key: &RequestKey,
    ) -> StoreResult<Option<StoredResponse>>;

    /// Store an entry, replacing any previous one for the key.
    async fn put(
        &self,
        handle: &CacheHandle,
        key: &RequestKey,
        response: StoredResponse,
    ) -> StoreResult<()>;

    /// Delete a generation and all its entries.
    ///
    /// Returns `false` when the generation did not exist; that is not an error.
    async fn delete_generation(&self, generation: &GenerationId) -> StoreResult<bool>;

    /// List generations, oldest first.
    async fn list_generations(&self) -> StoreResult<Vec<GenerationId>>;

    /// List the keys stored in a generation.
    async fn keys(&self, handle: &CacheHandle) -> StoreResult<Vec<RequestKey>>;
}
