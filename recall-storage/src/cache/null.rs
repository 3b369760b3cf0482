//! Backend that stores nothing.

use async_trait::async_trait;
use recall_core::{BackendKind, CacheKey, Expiry, RecallResult};

use super::traits::StorageBackend;

/// Every write is dropped and every probe misses.
///
/// Stands in for any backend that is not configured or failed to open.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullBackend;

#[async_trait]
impl StorageBackend for NullBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Null
    }

    async fn get(&self, _key: &CacheKey) -> RecallResult<Option<Vec<u8>>> {
        Ok(None)
    }

    async fn set(&self, _key: &CacheKey, _value: Vec<u8>, _expiry: Expiry) -> RecallResult<()> {
        Ok(())
    }

    async fn remove(&self, _key: &CacheKey) -> RecallResult<bool> {
        Ok(false)
    }

    async fn exists(&self, _key: &CacheKey) -> RecallResult<bool> {
        Ok(false)
    }

    async fn reset(&self) -> RecallResult<()> {
        Ok(())
    }
}
