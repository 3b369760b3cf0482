//! Dependency index: validation token → dependent cache entries.
//!
//! Each token's record is itself stored as an entry in the tracking backend
//! under `recall.deps:<token>` (hashed when the token is long), JSON-encoded,
//! with no expiry. Records outlive the entries they point to; stale pairs
//! are pruned whenever the record is next written.
//!
//! # Concurrency
//!
//! Every read-modify-write of a record happens under a per-token async
//! mutex, and invalidation takes the same mutex. Within one process no
//! registration is lost and no in-flight registration escapes an
//! invalidation. Across processes the tracking backend provides whatever
//! atomicity it has; this index adds none.

use std::collections::BTreeSet;
use std::sync::Arc;

use dashmap::DashMap;
use recall_core::{
    BackendKind, CacheKey, Expiry, RecallResult, SerializationFormat, ValidationToken,
};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, warn};

use super::registry::BackendRegistry;
use super::traits::StorageBackend;

/// Key prefix of dependency records in the tracking backend.
pub const RECORD_KEY_PREFIX: &str = "recall.deps:";

const RECORD_FORMAT: SerializationFormat = SerializationFormat::Json;

/// One cached entry that depends on a token.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DependentEntry {
    pub key: CacheKey,
    pub backend: BackendKind,
}

impl DependentEntry {
    pub fn new(key: CacheKey, backend: BackendKind) -> Self {
        Self { key, backend }
    }
}

/// The set of entries registered against one token.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyRecord {
    pub entries: BTreeSet<DependentEntry>,
}

impl DependencyRecord {
    pub fn contains(&self, key: &CacheKey, backend: BackendKind) -> bool {
        self.entries
            .contains(&DependentEntry::new(key.clone(), backend))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Holds a token's lock; drops the lock table entry once nobody else wants it.
///
/// Built before the lock is awaited, so a cancelled wait still cleans up.
struct TokenGuard<'a> {
    token: String,
    locks: &'a DashMap<String, Arc<Mutex<()>>>,
    lock: Option<Arc<Mutex<()>>>,
    held: Option<OwnedMutexGuard<()>>,
}

impl Drop for TokenGuard<'_> {
    fn drop(&mut self) {
        drop(self.held.take());
        drop(self.lock.take());
        self.locks
            .remove_if(&self.token, |_, lock| Arc::strong_count(lock) == 1);
    }
}

/// Durable map from validation tokens to dependent cache entries.
pub struct DependencyIndex {
    tracking: Arc<dyn StorageBackend>,
    backends: Arc<BackendRegistry>,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl DependencyIndex {
    /// Records live in `tracking`; dependent entries are removed through
    /// whichever backend in `backends` their pair names.
    pub fn new(tracking: Arc<dyn StorageBackend>, backends: Arc<BackendRegistry>) -> Self {
        Self {
            tracking,
            backends,
            locks: DashMap::new(),
        }
    }

    /// Compose a token from an entity name and optional property/value.
    pub fn resolve_token(
        entity: &str,
        property: Option<&str>,
        value: Option<&str>,
    ) -> ValidationToken {
        ValidationToken::resolve(entity, property, value)
    }

    pub fn tracking_backend(&self) -> BackendKind {
        self.tracking.kind()
    }

    /// Number of tokens with a live lock entry. Zero when idle.
    pub fn active_locks(&self) -> usize {
        self.locks.len()
    }

    /// Add `(key, backend)` to the record for `token`.
    ///
    /// Pairs whose entries no longer exist are pruned first. Adding a pair
    /// that is already present leaves the record unchanged.
    pub async fn register_dependency(
        &self,
        token: &ValidationToken,
        key: &CacheKey,
        backend: BackendKind,
    ) -> RecallResult<()> {
        let _guard = self.lock(token).await;

        let mut record = self.load_or_default(token).await?;
        let pruned = self.prune_stale(&mut record).await;
        let added = record
            .entries
            .insert(DependentEntry::new(key.clone(), backend));

        self.store(token, &record).await?;

        debug!(
            token = %token,
            key = %key,
            backend = %backend,
            added,
            pruned,
            entries = record.len(),
            "Registered cache dependency"
        );
        Ok(())
    }

    /// Remove every entry registered against `token`.
    ///
    /// An untracked token is not an error. Entries whose removal fails stay
    /// in the record; otherwise the drained record is deleted. Returns the
    /// number of entries that were present and removed.
    pub async fn invalidate(&self, token: &ValidationToken) -> RecallResult<usize> {
        let _guard = self.lock(token).await;

        let Some(record) = self.load(token).await? else {
            debug!(token = %token, "No dependencies to invalidate");
            return Ok(0);
        };

        let mut removed = 0;
        let mut failed = DependencyRecord::default();
        for entry in record.entries {
            let backend = self.backends.resolve(entry.backend);
            match backend.remove(&entry.key).await {
                Ok(true) => removed += 1,
                Ok(false) => {}
                Err(e) => {
                    warn!(
                        token = %token,
                        key = %entry.key,
                        backend = %entry.backend,
                        error = %e,
                        "Failed to remove dependent cache entry"
                    );
                    failed.entries.insert(entry);
                }
            }
        }

        if failed.is_empty() {
            self.tracking.remove(&record_key(token)).await?;
        } else {
            self.store(token, &failed).await?;
        }

        debug!(
            token = %token,
            removed,
            retained = failed.len(),
            "Invalidated cache dependencies"
        );
        Ok(removed)
    }

    /// Current record for `token`, if any.
    pub async fn record(&self, token: &ValidationToken) -> RecallResult<Option<DependencyRecord>> {
        self.load(token).await
    }

    async fn lock(&self, token: &ValidationToken) -> TokenGuard<'_> {
        let lock = Arc::clone(
            self.locks
                .entry(token.as_str().to_string())
                .or_default()
                .value(),
        );
        let mut guard = TokenGuard {
            token: token.as_str().to_string(),
            locks: &self.locks,
            lock: Some(Arc::clone(&lock)),
            held: None,
        };
        guard.held = Some(lock.lock_owned().await);
        guard
    }

    async fn load(&self, token: &ValidationToken) -> RecallResult<Option<DependencyRecord>> {
        let Some(bytes) = self.tracking.get(&record_key(token)).await? else {
            return Ok(None);
        };
        Ok(Some(RECORD_FORMAT.decode(&bytes)?))
    }

    /// Load the record, starting over if the stored one is unreadable.
    async fn load_or_default(&self, token: &ValidationToken) -> RecallResult<DependencyRecord> {
        let Some(bytes) = self.tracking.get(&record_key(token)).await? else {
            return Ok(DependencyRecord::default());
        };
        match RECORD_FORMAT.decode(&bytes) {
            Ok(record) => Ok(record),
            Err(e) => {
                warn!(token = %token, error = %e, "Discarding unreadable dependency record");
                Ok(DependencyRecord::default())
            }
        }
    }

    async fn store(&self, token: &ValidationToken, record: &DependencyRecord) -> RecallResult<()> {
        let bytes = RECORD_FORMAT.encode(record)?;
        self.tracking
            .set(&record_key(token), bytes, Expiry::Never)
            .await
    }

    /// Drop pairs whose backend no longer has the entry. Probe failures keep
    /// the pair.
    async fn prune_stale(&self, record: &mut DependencyRecord) -> usize {
        let mut stale = Vec::new();
        for entry in &record.entries {
            let backend = self.backends.resolve(entry.backend);
            if let Ok(false) = backend.exists(&entry.key).await {
                stale.push(entry.clone());
            }
        }
        for entry in &stale {
            record.entries.remove(entry);
        }
        stale.len()
    }
}

/// Longest record key stored verbatim; LMDB rejects keys over 511 bytes.
const MAX_RECORD_KEY_LEN: usize = 256;

/// `recall.deps:<token>`, or `recall.deps:#<sha256 hex>` for long tokens.
fn record_key(token: &ValidationToken) -> CacheKey {
    let raw = format!("{}{}", RECORD_KEY_PREFIX, token);
    if raw.len() <= MAX_RECORD_KEY_LEN {
        return CacheKey::new(raw);
    }
    let digest = Sha256::digest(token.as_str().as_bytes());
    CacheKey::new(format!("{}#{:x}", RECORD_KEY_PREFIX, digest))
}
