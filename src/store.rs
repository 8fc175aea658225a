//! Snapshot storage for processing results.
//!
//! The store holds exactly one [`ProcessingResult`] snapshot per transaction
//! id, replaced whole on every write. [`MemoryStore`] is the production
//! implementation: an in-memory map, optionally mirrored to a directory of
//! pretty-printed JSON files so snapshots survive a restart. Mirror writes
//! go through a temp file and an atomic rename, so a crash mid-write never
//! leaves a truncated snapshot behind.
//!
//! Read-modify-write operations ([`ResultStore::set_status`],
//! [`ResultStore::update`]) serialise per transaction id, so two concurrent
//! writers to the same transaction cannot interleave their read and write
//! halves. Writers to different transactions do not contend.

use crate::error::Doc2TreeError;
use crate::model::{ProcessingResult, ProcessingStatus};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

/// Mutation applied under the store's per-transaction lock.
pub type Mutation = Box<dyn FnOnce(&mut ProcessingResult) + Send>;

/// Capability interface for snapshot persistence.
#[async_trait]
pub trait ResultStore: Send + Sync {
    /// Insert or replace the snapshot for its transaction id.
    async fn put(&self, result: ProcessingResult) -> Result<(), Doc2TreeError>;

    /// Fetch a snapshot by transaction id.
    async fn get(&self, transaction_id: &str) -> Result<Option<ProcessingResult>, Doc2TreeError>;

    /// Transition a snapshot's status, recording `message` as the error
    /// message when the new status is `Failed`.
    ///
    /// Terminal snapshots are left untouched. Returns whether a transition
    /// happened.
    async fn set_status(
        &self,
        transaction_id: &str,
        status: ProcessingStatus,
        message: Option<&str>,
    ) -> Result<bool, Doc2TreeError>;

    /// Apply an arbitrary mutation to a snapshot under the per-transaction
    /// lock. Returns `false` when the transaction is unknown.
    async fn update(
        &self,
        transaction_id: &str,
        mutation: Mutation,
    ) -> Result<bool, Doc2TreeError>;

    /// All known snapshots, newest first.
    async fn list(&self) -> Result<Vec<ProcessingResult>, Doc2TreeError>;

    /// Remove a snapshot (and its file mirror). Returns whether it existed.
    async fn delete(&self, transaction_id: &str) -> Result<bool, Doc2TreeError>;
}

/// In-memory snapshot store with an optional JSON file mirror.
pub struct MemoryStore {
    results: RwLock<HashMap<String, ProcessingResult>>,
    // Per-transaction write locks, created lazily and never removed while
    // the transaction exists.
    locks: std::sync::Mutex<HashMap<String, Arc<Mutex<()>>>>,
    storage_dir: Option<PathBuf>,
}

impl MemoryStore {
    /// Purely in-memory store; snapshots vanish when the store is dropped.
    pub fn new() -> Self {
        Self {
            results: RwLock::new(HashMap::new()),
            locks: std::sync::Mutex::new(HashMap::new()),
            storage_dir: None,
        }
    }

    /// Store mirrored to `dir` as one `<transaction_id>.json` per snapshot.
    ///
    /// The directory is created if missing. Snapshots already on disk are
    /// loaded lazily on first access, not eagerly scanned.
    pub async fn with_storage_dir(dir: impl Into<PathBuf>) -> Result<Self, Doc2TreeError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|source| Doc2TreeError::SnapshotWriteFailed {
                path: dir.clone(),
                source,
            })?;
        Ok(Self {
            results: RwLock::new(HashMap::new()),
            locks: std::sync::Mutex::new(HashMap::new()),
            storage_dir: Some(dir),
        })
    }

    fn lock_for(&self, transaction_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self
            .locks
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        locks
            .entry(transaction_id.to_string())
            .or_default()
            .clone()
    }

    fn snapshot_path(&self, transaction_id: &str) -> Option<PathBuf> {
        self.storage_dir
            .as_ref()
            .map(|dir| dir.join(format!("{transaction_id}.json")))
    }

    /// Write the file mirror via temp file + rename.
    async fn persist(&self, result: &ProcessingResult) -> Result<(), Doc2TreeError> {
        let Some(path) = self.snapshot_path(&result.transaction_id) else {
            return Ok(());
        };
        let json = serde_json::to_vec_pretty(result)
            .map_err(|e| Doc2TreeError::Internal(format!("snapshot serialisation: {e}")))?;
        let tmp = path.with_extension("json.tmp");
        let write_err = |source| Doc2TreeError::SnapshotWriteFailed {
            path: path.clone(),
            source,
        };
        tokio::fs::write(&tmp, json).await.map_err(write_err)?;
        tokio::fs::rename(&tmp, &path).await.map_err(write_err)?;
        debug!("persisted snapshot {}", path.display());
        Ok(())
    }

    async fn load_from_disk(
        &self,
        transaction_id: &str,
    ) -> Result<Option<ProcessingResult>, Doc2TreeError> {
        let Some(path) = self.snapshot_path(transaction_id) else {
            return Ok(None);
        };
        match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let result = decode_snapshot(&path, &bytes)?;
                Ok(Some(result))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(Doc2TreeError::ReadFailed { path, source }),
        }
    }

    /// Memory first, disk mirror second; a disk hit is cached back into
    /// memory.
    async fn fetch(
        &self,
        transaction_id: &str,
    ) -> Result<Option<ProcessingResult>, Doc2TreeError> {
        if let Some(result) = self.results.read().await.get(transaction_id) {
            return Ok(Some(result.clone()));
        }
        match self.load_from_disk(transaction_id).await? {
            Some(result) => {
                self.results
                    .write()
                    .await
                    .insert(transaction_id.to_string(), result.clone());
                Ok(Some(result))
            }
            None => Ok(None),
        }
    }

    async fn commit(&self, result: ProcessingResult) -> Result<(), Doc2TreeError> {
        self.persist(&result).await?;
        self.results
            .write()
            .await
            .insert(result.transaction_id.clone(), result);
        Ok(())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ResultStore for MemoryStore {
    async fn put(&self, mut result: ProcessingResult) -> Result<(), Doc2TreeError> {
        result.updated_at = Utc::now();
        self.commit(result).await
    }

    async fn get(&self, transaction_id: &str) -> Result<Option<ProcessingResult>, Doc2TreeError> {
        self.fetch(transaction_id).await
    }

    async fn set_status(
        &self,
        transaction_id: &str,
        status: ProcessingStatus,
        message: Option<&str>,
    ) -> Result<bool, Doc2TreeError> {
        let lock = self.lock_for(transaction_id);
        let _guard = lock.lock().await;

        let Some(mut result) = self.fetch(transaction_id).await? else {
            return Ok(false);
        };
        if result.status.is_terminal() {
            warn!(
                "refusing status {status} for terminal transaction {transaction_id} ({})",
                result.status
            );
            return Ok(false);
        }

        result.status = status;
        if status == ProcessingStatus::Failed {
            result.error_message = message.map(str::to_string);
        }
        result.updated_at = Utc::now();
        self.commit(result).await?;
        Ok(true)
    }

    async fn update(
        &self,
        transaction_id: &str,
        mutation: Mutation,
    ) -> Result<bool, Doc2TreeError> {
        let lock = self.lock_for(transaction_id);
        let _guard = lock.lock().await;

        let Some(mut result) = self.fetch(transaction_id).await? else {
            return Ok(false);
        };
        mutation(&mut result);
        result.updated_at = Utc::now();
        self.commit(result).await?;
        Ok(true)
    }

    async fn list(&self) -> Result<Vec<ProcessingResult>, Doc2TreeError> {
        let mut results: Vec<ProcessingResult> =
            self.results.read().await.values().cloned().collect();

        // Fold in mirrored snapshots not yet cached in memory.
        if let Some(dir) = &self.storage_dir {
            let mut entries = tokio::fs::read_dir(dir).await.map_err(|source| {
                Doc2TreeError::ReadFailed {
                    path: dir.clone(),
                    source,
                }
            })?;
            while let Some(entry) = entries.next_entry().await.map_err(|source| {
                Doc2TreeError::ReadFailed {
                    path: dir.clone(),
                    source,
                }
            })? {
                let path = entry.path();
                if path.extension().map_or(true, |ext| ext != "json") {
                    continue;
                }
                let Some(id) = path.file_stem().and_then(|s| s.to_str()) else {
                    continue;
                };
                if results.iter().any(|r| r.transaction_id == id) {
                    continue;
                }
                if let Some(result) = self.fetch(id).await? {
                    results.push(result);
                }
            }
        }

        results.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(results)
    }

    async fn delete(&self, transaction_id: &str) -> Result<bool, Doc2TreeError> {
        let lock = self.lock_for(transaction_id);
        let _guard = lock.lock().await;

        let in_memory = self.results.write().await.remove(transaction_id).is_some();
        let mut on_disk = false;
        if let Some(path) = self.snapshot_path(transaction_id) {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => on_disk = true,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(source) => {
                    return Err(Doc2TreeError::SnapshotWriteFailed { path, source });
                }
            }
        }
        Ok(in_memory || on_disk)
    }
}

fn decode_snapshot(path: &Path, bytes: &[u8]) -> Result<ProcessingResult, Doc2TreeError> {
    serde_json::from_slice(bytes).map_err(|e| Doc2TreeError::SnapshotCorrupt {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })
}
