//! Result of one orchestrated call, with where the value came from.

use recall_core::CacheKey;

/// How an orchestrated call was answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadSource {
    /// Decoded from the backend; the operation did not run.
    Hit,
    /// The operation ran after a probe found nothing.
    Miss,
    /// The operation ran without consulting the cache.
    Bypass,
}

/// Wraps an operation's result together with how it was obtained.
///
/// Callers that only want the value use [`CacheRead::into_value`]; the
/// source and key are there for diagnostics and tests.
#[derive(Debug, Clone)]
pub struct CacheRead<T> {
    value: Option<T>,
    key: Option<CacheKey>,
    source: ReadSource,
}

impl<T> CacheRead<T> {
    /// Create a read answered by the cache.
    pub fn from_cache(value: T, key: CacheKey) -> Self {
        Self {
            value: Some(value),
            key: Some(key),
            source: ReadSource::Hit,
        }
    }

    /// Create a read answered by the operation after a miss.
    pub fn from_operation(value: Option<T>, key: CacheKey) -> Self {
        Self {
            value,
            key: Some(key),
            source: ReadSource::Miss,
        }
    }

    /// Create a read answered by the operation with the cache bypassed.
    ///
    /// `key` is present when one was derived before bypassing.
    pub fn bypassed(value: Option<T>, key: Option<CacheKey>) -> Self {
        Self {
            value,
            key,
            source: ReadSource::Bypass,
        }
    }

    /// Consume the wrapper and return the underlying value.
    pub fn into_value(self) -> Option<T> {
        self.value
    }

    /// Get a reference to the underlying value.
    pub fn value(&self) -> Option<&T> {
        self.value.as_ref()
    }

    /// The derived key, if key derivation ran and succeeded.
    pub fn key(&self) -> Option<&CacheKey> {
        self.key.as_ref()
    }

    pub fn source(&self) -> ReadSource {
        self.source
    }

    /// Check if this was a cache hit.
    pub fn was_cache_hit(&self) -> bool {
        self.source == ReadSource::Hit
    }

    /// Check if this was a cache miss.
    pub fn was_cache_miss(&self) -> bool {
        self.source == ReadSource::Miss
    }

    pub fn was_bypassed(&self) -> bool {
        self.source == ReadSource::Bypass
    }

    /// Map the value while keeping the source and key.
    pub fn map<U, F>(self, f: F) -> CacheRead<U>
    where
        F: FnOnce(T) -> U,
    {
        CacheRead {
            value: self.value.map(f),
            key: self.key,
            source: self.source,
        }
    }
}
