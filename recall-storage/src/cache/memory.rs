//! In-process memory backend.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use recall_core::{BackendKind, CacheKey, Expiry, RecallResult};
use tokio::sync::RwLock;

use super::traits::{StorageBackend, StoredEntry};

/// Memory backend with lazy expiry.
///
/// Expired entries are dropped when they are next read or probed, or in bulk
/// by [`InMemoryBackend::purge_expired`]. There is no capacity bound.
pub struct InMemoryBackend {
    kind: BackendKind,
    entries: RwLock<HashMap<String, StoredEntry>>,
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::with_kind(BackendKind::Memory)
    }
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// A memory store reporting a different kind, e.g. to stand in for a
    /// distributed store in a single process.
    pub fn with_kind(kind: BackendKind) -> Self {
        Self {
            kind,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Number of stored entries, including expired ones not yet purged.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Drop every expired entry. Returns how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        before - entries.len()
    }

    /// Live entry for `key`, evicting it first if it has expired.
    async fn live_entry(&self, key: &CacheKey) -> Option<Vec<u8>> {
        let now = Utc::now();
        {
            let entries = self.entries.read().await;
            match entries.get(key.as_str()) {
                None => return None,
                Some(entry) if !entry.is_expired(now) => return Some(entry.payload.clone()),
                Some(_) => {}
            }
        }

        let mut entries = self.entries.write().await;
        if entries
            .get(key.as_str())
            .is_some_and(|entry| entry.is_expired(now))
        {
            entries.remove(key.as_str());
        }
        None
    }
}

#[async_trait]
impl StorageBackend for InMemoryBackend {
    fn kind(&self) -> BackendKind {
        self.kind
    }

    async fn get(&self, key: &CacheKey) -> RecallResult<Option<Vec<u8>>> {
        Ok(self.live_entry(key).await)
    }

    async fn set(&self, key: &CacheKey, value: Vec<u8>, expiry: Expiry) -> RecallResult<()> {
        let entry = StoredEntry::new(value, expiry, Utc::now());
        self.entries
            .write()
            .await
            .insert(key.as_str().to_string(), entry);
        Ok(())
    }

    async fn remove(&self, key: &CacheKey) -> RecallResult<bool> {
        Ok(self.entries.write().await.remove(key.as_str()).is_some())
    }

    async fn exists(&self, key: &CacheKey) -> RecallResult<bool> {
        Ok(self.live_entry(key).await.is_some())
    }

    async fn reset(&self) -> RecallResult<()> {
        self.entries.write().await.clear();
        Ok(())
    }
}
