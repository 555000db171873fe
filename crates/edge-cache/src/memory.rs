//! In-memory cache store.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::{StorageError, StoreResult};
use crate::key::RequestKey;
use crate::response::StoredResponse;
use crate::store::{CacheHandle, CacheStore, GenerationId};

#[derive(Debug, Default)]
struct Generation {
    /// Creation order, used to list generations oldest first.
    seq: u64,
    entries: HashMap<RequestKey, StoredResponse>,
}

#[derive(Debug, Default)]
struct Inner {
    generations: HashMap<GenerationId, Generation>,
    next_seq: u64,
    used_bytes: u64,
}

/// Process-local cache store with an optional byte quota.
#[derive(Debug, Default)]
pub struct InMemoryCacheStore {
    inner: RwLock<Inner>,
    max_bytes: Option<u64>,
}

impl InMemoryCacheStore {
    /// Create an unbounded store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Limit the total bytes held across all generations.
    pub fn with_quota(mut self, max_bytes: u64) -> Self {
        self.max_bytes = Some(max_bytes);
        self
    }

    /// Bytes currently held.
    pub async fn used_bytes(&self) -> u64 {
        self.inner.read().await.used_bytes
    }
}

#[async_trait]
impl CacheStore for InMemoryCacheStore {
    async fn open(&self, generation: &GenerationId) -> StoreResult<CacheHandle> {
        let mut inner = self.inner.write().await;

        if !inner.generations.contains_key(generation) {
            let seq = inner.next_seq;
            inner.next_seq += 1;
            inner.generations.insert(
                generation.clone(),
                Generation {
                    seq,
                    entries: HashMap::new(),
                },
            );
            debug!(generation = %generation, "Opened new cache generation");
        }

        Ok(CacheHandle::new(generation.clone()))
    }

    async fn get(
        &self,
        handle: &CacheHandle,
        key: &RequestKey,
    ) -> StoreResult<Option<StoredResponse>> {
        let inner = self.inner.read().await;
        Ok(inner
            .generations
            .get(handle.generation())
            .and_then(|g| g.entries.get(key))
            .cloned())
    }

    async fn put(
        &self,
        handle: &CacheHandle,
        key: &RequestKey,
        response: StoredResponse,
    ) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        let used = inner.used_bytes;

        let generation = inner
            .generations
            .get_mut(handle.generation())
            .ok_or_else(|| StorageError::UnknownGeneration(handle.generation().to_string()))?;

        let previous = generation.entries.get(key).map(|r| r.size()).unwrap_or(0);
        let needed = response.size();
        let projected = used - previous + needed;

        if let Some(max) = self.max_bytes {
            if projected > max {
                return Err(StorageError::QuotaExceeded {
                    needed,
                    available: max.saturating_sub(used - previous),
                });
            }
        }

        generation.entries.insert(key.clone(), response);
        inner.used_bytes = projected;
        Ok(())
    }

    async fn delete_generation(&self, generation: &GenerationId) -> StoreResult<bool> {
        let mut inner = self.inner.write().await;

        match inner.generations.remove(generation) {
            Some(removed) => {
                let freed: u64 = removed.entries.values().map(|r| r.size()).sum();
                inner.used_bytes = inner.used_bytes.saturating_sub(freed);
                debug!(generation = %generation, freed, "Deleted cache generation");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn list_generations(&self) -> StoreResult<Vec<GenerationId>> {
        let inner = self.inner.read().await;
        let mut generations: Vec<(&GenerationId, u64)> = inner
            .generations
            .iter()
            .map(|(id, g)| (id, g.seq))
            .collect();
        generations.sort_by_key(|(_, seq)| *seq);
        Ok(generations.into_iter().map(|(id, _)| id.clone()).collect())
    }

    async fn keys(&self, handle: &CacheHandle) -> StoreResult<Vec<RequestKey>> {
        let inner = self.inner.read().await;
        let mut keys: Vec<RequestKey> = inner
            .generations
            .get(handle.generation())
            .map(|g| g.entries.keys().cloned().collect())
            .unwrap_or_default();
        keys.sort();
        Ok(keys)
    }
}
