//! LMDB-backed disk cache.
//!
//! Uses the heed crate (Rust bindings for LMDB) to provide a memory-mapped
//! key/value store that survives process restarts.
//!
//! # Entry Format
//!
//! Each value is `[expiry_millis: i64 LE][payload]` (see [`StoredEntry`]).
//! Expired entries read as absent and are deleted on the read that finds them.
//!
//! # Thread Safety
//!
//! LMDB provides ACID transactions. The backend uses:
//! - Read transactions for `get` and `exists`
//! - Write transactions for `set`, `remove`, `reset` and expiry eviction

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions};
use recall_core::{
    BackendKind, CacheKey, DiskSettings, Expiry, RecallError, RecallResult, StorageError,
};

use super::traits::{StorageBackend, StoredEntry};

/// Error type for LMDB cache operations.
#[derive(Debug, thiserror::Error)]
pub enum LmdbCacheError {
    /// Failed to open or create the LMDB environment.
    #[error("Failed to open LMDB environment: {0}")]
    EnvOpen(String),

    /// Failed to open the database within the environment.
    #[error("Failed to open database: {0}")]
    DbOpen(String),

    /// Transaction error.
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convert LmdbCacheError to RecallError.
impl From<LmdbCacheError> for RecallError {
    fn from(e: LmdbCacheError) -> Self {
        let reason = e.to_string();
        let storage = match e {
            LmdbCacheError::EnvOpen(_) | LmdbCacheError::DbOpen(_) => {
                StorageError::BackendUnavailable {
                    backend: BackendKind::Disk,
                    reason,
                }
            }
            LmdbCacheError::Transaction(_) | LmdbCacheError::Io(_) => StorageError::Io {
                backend: BackendKind::Disk,
                reason,
            },
        };
        RecallError::Storage(storage)
    }
}

/// LMDB-backed cache reporting [`BackendKind::Disk`].
///
/// # Example
///
/// ```ignore
/// use recall_storage::LmdbBackend;
///
/// let backend = LmdbBackend::new("/var/cache/recall", 200)?;
/// backend.set(&key, bytes, Expiry::Never).await?;
/// ```
pub struct LmdbBackend {
    /// The LMDB environment.
    env: Env,
    /// The main database (single unnamed database).
    db: Database<Bytes, Bytes>,
    path: PathBuf,
}

impl LmdbBackend {
    /// Create a new LMDB cache backend.
    ///
    /// # Arguments
    ///
    /// * `path` - Directory where LMDB files will be stored
    /// * `max_size_mb` - Maximum size of the database in megabytes
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The directory cannot be created
    /// - LMDB environment cannot be opened
    /// - Database cannot be created
    pub fn new<P: AsRef<Path>>(path: P, max_size_mb: usize) -> Result<Self, LmdbCacheError> {
        std::fs::create_dir_all(&path)?;

        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(max_size_mb * 1024 * 1024)
                .max_dbs(1)
                .open(path.as_ref())
        }
        .map_err(|e| LmdbCacheError::EnvOpen(e.to_string()))?;

        let mut wtxn = env
            .write_txn()
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;

        let db: Database<Bytes, Bytes> = env
            .create_database(&mut wtxn, None)
            .map_err(|e| LmdbCacheError::DbOpen(e.to_string()))?;

        wtxn.commit()
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;

        Ok(Self {
            env,
            db,
            path: path.as_ref().to_path_buf(),
        })
    }

    /// Open the backend described by disk settings.
    pub fn open(settings: &DiskSettings) -> Result<Self, LmdbCacheError> {
        Self::new(&settings.path, settings.max_size_mb)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of stored entries, including expired ones not yet evicted.
    pub fn entry_count(&self) -> Result<u64, LmdbCacheError> {
        let rtxn = self
            .env
            .read_txn()
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;
        self.db
            .len(&rtxn)
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))
    }

    /// Delete every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> Result<u64, LmdbCacheError> {
        let expired = self.collect_expired_keys()?;
        if expired.is_empty() {
            return Ok(0);
        }

        let mut wtxn = self
            .env
            .write_txn()
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;

        let mut deleted = 0u64;
        for key in &expired {
            if self.db.delete(&mut wtxn, key).unwrap_or(false) {
                deleted += 1;
            }
        }

        wtxn.commit()
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;

        Ok(deleted)
    }

    /// Keys whose entries have expired or cannot be decoded.
    fn collect_expired_keys(&self) -> Result<Vec<Vec<u8>>, LmdbCacheError> {
        let now = Utc::now();
        let rtxn = self
            .env
            .read_txn()
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;

        let mut keys = Vec::new();
        let iter = self
            .db
            .iter(&rtxn)
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;

        for result in iter {
            let Ok((key, bytes)) = result else {
                continue;
            };
            let stale = StoredEntry::decode(bytes)
                .map(|entry| entry.is_expired(now))
                .unwrap_or(true);
            if stale {
                keys.push(key.to_vec());
            }
        }

        Ok(keys)
    }

    /// Read and decode the raw entry for `key`.
    fn read_entry(&self, key: &CacheKey) -> RecallResult<Option<StoredEntry>> {
        let rtxn = self
            .env
            .read_txn()
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;

        let bytes = match self.db.get(&rtxn, key.as_str().as_bytes()) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return Ok(None),
            Err(e) => return Err(LmdbCacheError::Transaction(e.to_string()).into()),
        };

        StoredEntry::decode(bytes).map(Some).map_err(|reason| {
            StorageError::Corrupt {
                backend: BackendKind::Disk,
                key: key.to_string(),
                reason,
            }
            .into()
        })
    }

    fn delete_key(&self, key: &CacheKey) -> Result<bool, LmdbCacheError> {
        let mut wtxn = self
            .env
            .write_txn()
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;

        let deleted = self
            .db
            .delete(&mut wtxn, key.as_str().as_bytes())
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;

        wtxn.commit()
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;

        Ok(deleted)
    }

    /// Live payload for `key`, deleting it first if it has expired.
    fn live_payload(&self, key: &CacheKey) -> RecallResult<Option<Vec<u8>>> {
        match self.read_entry(key)? {
            None => Ok(None),
            Some(entry) if entry.is_expired(Utc::now()) => {
                self.delete_key(key)?;
                Ok(None)
            }
            Some(entry) => Ok(Some(entry.payload)),
        }
    }
}

#[async_trait]
impl StorageBackend for LmdbBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Disk
    }

    async fn get(&self, key: &CacheKey) -> RecallResult<Option<Vec<u8>>> {
        self.live_payload(key)
    }

    async fn set(&self, key: &CacheKey, value: Vec<u8>, expiry: Expiry) -> RecallResult<()> {
        let encoded = StoredEntry::new(value, expiry, Utc::now()).encode();

        let mut wtxn = self
            .env
            .write_txn()
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;

        self.db
            .put(&mut wtxn, key.as_str().as_bytes(), &encoded)
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;

        wtxn.commit()
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;

        Ok(())
    }

    async fn remove(&self, key: &CacheKey) -> RecallResult<bool> {
        Ok(self.delete_key(key)?)
    }

    async fn exists(&self, key: &CacheKey) -> RecallResult<bool> {
        Ok(self.live_payload(key)?.is_some())
    }

    async fn reset(&self) -> RecallResult<()> {
        let mut wtxn = self
            .env
            .write_txn()
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;

        self.db
            .clear(&mut wtxn)
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;

        wtxn.commit()
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;

        Ok(())
    }
}
