//! File-backed cache store.
//!
//! Layout: one directory per generation under the store root, named by the
//! hex-encoded generation id. Each directory holds a `_generation.json`
//! marker plus one `<key digest>.json` file per entry. Entry files are written
//! to a temporary name and renamed into place, so an interrupted write never
//! leaves a partial entry behind. Temporary files orphaned by a cancelled write
//! are removed by [`FileCacheStore::init`].

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{debug, info, warn};

use crate::error::{StorageError, StoreResult};
use crate::key::RequestKey;
use crate::response::StoredResponse;
use crate::store::{CacheHandle, CacheStore, GenerationId};

const MARKER_FILE: &str = "_generation.json";
const ENTRY_EXT: &str = "json";
const TMP_EXT_PREFIX: &str = "tmp-";

#[derive(Debug, Serialize, Deserialize)]
struct GenerationMarker {
    id: GenerationId,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
struct EntryFile {
    key: RequestKey,
    status: u16,
    headers: Vec<(String, String)>,
    /// Base64-encoded payload.
    body: String,
    stored_at: DateTime<Utc>,
}

impl EntryFile {
    fn new(key: &RequestKey, response: StoredResponse) -> Self {
        Self {
            key: key.clone(),
            status: response.status,
            headers: response.headers,
            body: BASE64.encode(&response.body),
            stored_at: response.stored_at,
        }
    }

    fn into_response(self) -> StoreResult<StoredResponse> {
        let body = BASE64
            .decode(self.body.as_bytes())
            .map_err(|e| StorageError::Serialization(e.to_string()))?;

        Ok(StoredResponse {
            status: self.status,
            headers: self.headers,
            body,
            stored_at: self.stored_at,
        })
    }
}

/// Cache store persisted on the local filesystem.
#[derive(Debug)]
pub struct FileCacheStore {
    root: PathBuf,
    max_bytes: Option<u64>,
    used_bytes: AtomicU64,
    tmp_seq: AtomicU64,
}

impl FileCacheStore {
    /// Create a store rooted at `root`. Call [`FileCacheStore::init`] before use.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            max_bytes: None,
            used_bytes: AtomicU64::new(0),
            tmp_seq: AtomicU64::new(0),
        }
    }

    /// Limit the total bytes of entry files on disk.
    pub fn with_quota(mut self, max_bytes: u64) -> Self {
        self.max_bytes = Some(max_bytes);
        self
    }

    /// Create the root directory, sweep orphaned temporary files, and account
    /// for entries already on disk.
    pub async fn init(&self) -> StoreResult<()> {
        fs::create_dir_all(&self.root).await?;

        let mut total = 0u64;
        let mut swept = 0usize;
        let mut generations = fs::read_dir(&self.root).await?;
        while let Some(dir) = generations.next_entry().await? {
            if dir.file_type().await?.is_dir() {
                swept += sweep_temp_files(&dir.path()).await?;
                total += entry_bytes(&dir.path()).await?;
            }
        }
        self.used_bytes.store(total, Ordering::Relaxed);

        info!(
            root = ?self.root,
            used_bytes = total,
            swept_temp_files = swept,
            "File cache store initialized"
        );
        Ok(())
    }

    /// Bytes currently held in entry files.
    pub fn used_bytes(&self) -> u64 {
        self.used_bytes.load(Ordering::Relaxed)
    }

    fn generation_dir(&self, generation: &GenerationId) -> PathBuf {
        self.root.join(hex::encode(generation.as_str()))
    }

    fn entry_path(&self, generation: &GenerationId, key: &RequestKey) -> PathBuf {
        self.generation_dir(generation)
            .join(format!("{}.{}", key.digest(), ENTRY_EXT))
    }

    /// Write `bytes` to `path` through a temporary file and a rename.
    async fn write_atomic(&self, path: &Path, bytes: &[u8]) -> StoreResult<()> {
        let seq = self.tmp_seq.fetch_add(1, Ordering::Relaxed);
        let tmp = path.with_extension(format!("{}{}-{}", TMP_EXT_PREFIX, std::process::id(), seq));

        fs::write(&tmp, bytes).await?;
        if let Err(e) = fs::rename(&tmp, path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(())
    }

    async fn read_marker(&self, dir: &Path) -> Option<GenerationMarker> {
        let bytes = fs::read(dir.join(MARKER_FILE)).await.ok()?;
        serde_json::from_slice(&bytes).ok()
    }
}

/// Sum of entry file sizes in a generation directory.
async fn entry_bytes(dir: &Path) -> StoreResult<u64> {
    let mut total = 0u64;
    let mut entries = fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if is_entry_file(&path) {
            total += entry.metadata().await?.len();
        }
    }
    Ok(total)
}

/// Remove temporary files left by writes that never reached their rename.
async fn sweep_temp_files(dir: &Path) -> StoreResult<usize> {
    let mut removed = 0;
    let mut entries = fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if !is_temp_file(&path) {
            continue;
        }
        match fs::remove_file(&path).await {
            Ok(()) => removed += 1,
            Err(e) => warn!(path = ?path, error = %e, "Failed to remove temporary file"),
        }
    }
    Ok(removed)
}

fn is_temp_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.starts_with(TMP_EXT_PREFIX))
}

fn is_entry_file(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == ENTRY_EXT)
        && path.file_name().is_some_and(|name| name != MARKER_FILE)
}

#[async_trait]
impl CacheStore for FileCacheStore {
    async fn open(&self, generation: &GenerationId) -> StoreResult<CacheHandle> {
        let dir = self.generation_dir(generation);

        if self.read_marker(&dir).await.is_none() {
            fs::create_dir_all(&dir).await?;
            let marker = GenerationMarker {
                id: generation.clone(),
                created_at: Utc::now(),
            };
            self.write_atomic(&dir.join(MARKER_FILE), &serde_json::to_vec(&marker)?)
                .await?;
            debug!(generation = %generation, dir = ?dir, "Opened new cache generation");
        }

        Ok(CacheHandle::new(generation.clone()))
    }

    async fn get(
        &self,
        handle: &CacheHandle,
        key: &RequestKey,
    ) -> StoreResult<Option<StoredResponse>> {
        let path = self.entry_path(handle.generation(), key);

        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let entry: EntryFile = serde_json::from_slice(&bytes)?;
        if entry.key != *key {
            // Digest collision; treat as a miss rather than serve the wrong entry.
            warn!(key = %key, stored = %entry.key, "Cache key digest collision");
            return Ok(None);
        }

        entry.into_response().map(Some)
    }

    async fn put(
        &self,
        handle: &CacheHandle,
        key: &RequestKey,
        response: StoredResponse,
    ) -> StoreResult<()> {
        let dir = self.generation_dir(handle.generation());
        if !fs::try_exists(dir.join(MARKER_FILE)).await? {
            return Err(StorageError::UnknownGeneration(
                handle.generation().to_string(),
            ));
        }

        let path = self.entry_path(handle.generation(), key);
        let bytes = serde_json::to_vec(&EntryFile::new(key, response))?;
        let needed = bytes.len() as u64;
        let previous = fs::metadata(&path).await.map(|m| m.len()).unwrap_or(0);

        if let Some(max) = self.max_bytes {
            let used = self.used_bytes().saturating_sub(previous);
            if used + needed > max {
                return Err(StorageError::QuotaExceeded {
                    needed,
                    available: max.saturating_sub(used),
                });
            }
        }

        self.write_atomic(&path, &bytes).await?;
        let _ = self
            .used_bytes
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |used| {
                Some(used.saturating_sub(previous) + needed)
            });
        Ok(())
    }

    async fn delete_generation(&self, generation: &GenerationId) -> StoreResult<bool> {
        let dir = self.generation_dir(generation);

        let freed = match entry_bytes(&dir).await {
            Ok(bytes) => bytes,
            Err(StorageError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(false)
            }
            Err(e) => return Err(e),
        };

        match fs::remove_dir_all(&dir).await {
            Ok(()) => {
                let _ = self
                    .used_bytes
                    .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |used| {
                        Some(used.saturating_sub(freed))
                    });
                debug!(generation = %generation, freed, "Deleted cache generation");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_generations(&self) -> StoreResult<Vec<GenerationId>> {
        let mut markers = Vec::new();
        let mut dirs = match fs::read_dir(&self.root).await {
            Ok(dirs) => dirs,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        while let Some(dir) = dirs.next_entry().await? {
            if let Some(marker) = self.read_marker(&dir.path()).await {
                markers.push(marker);
            }
        }

        markers.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(markers.into_iter().map(|m| m.id).collect())
    }

    async fn keys(&self, handle: &CacheHandle) -> StoreResult<Vec<RequestKey>> {
        let dir = self.generation_dir(handle.generation());
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut keys = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if !is_entry_file(&path) {
                continue;
            }
            match fs::read(&path).await {
                Ok(bytes) => match serde_json::from_slice::<EntryFile>(&bytes) {
                    Ok(file) => keys.push(file.key),
                    Err(e) => warn!(path = ?path, error = %e, "Skipping unreadable cache entry"),
                },
                Err(e) => warn!(path = ?path, error = %e, "Skipping unreadable cache entry"),
            }
        }

        keys.sort();
        Ok(keys)
    }
}
