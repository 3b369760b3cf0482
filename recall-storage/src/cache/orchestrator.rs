//! Cache-aside orchestration.
//!
//! One call runs: resolve the effective policy, derive the key, probe the
//! backend, and on a miss run the operation, store its result and register
//! its dependencies. No cache-layer failure reaches the caller; each one
//! degrades to running the operation uncached.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use recall_core::{
    CacheKey, CachePolicy, CacheSettings, EffectivePolicy, Invocation, KeyDeriver,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{info, trace, warn};

use super::dependency::DependencyIndex;
use super::metrics::{CacheEvent, MetricScope, MetricsSink};
use super::read::CacheRead;
use super::registry::BackendRegistry;
use super::traits::StorageBackend;

/// Runs operations through the cache.
///
/// Concurrent misses on the same key may both run the operation; the last
/// write wins. Callers needing at-most-once recomputation must serialize
/// per key themselves.
pub struct CacheOrchestrator {
    settings: Arc<CacheSettings>,
    backends: Arc<BackendRegistry>,
    index: Arc<DependencyIndex>,
    metrics: Arc<dyn MetricsSink>,
    deriver: KeyDeriver,
    /// Effective policies by key prefix.
    policies: DashMap<String, Arc<EffectivePolicy>>,
    /// Set once the disabled-cache reset has run.
    reset_done: AtomicBool,
}

impl CacheOrchestrator {
    pub fn new(
        settings: Arc<CacheSettings>,
        backends: Arc<BackendRegistry>,
        index: Arc<DependencyIndex>,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        let deriver = KeyDeriver::new(settings.hash_prefix_in_key);
        Self {
            settings,
            backends,
            index,
            metrics,
            deriver,
            policies: DashMap::new(),
            reset_done: AtomicBool::new(false),
        }
    }

    pub fn settings(&self) -> &CacheSettings {
        &self.settings
    }

    /// Effective policy for `key_prefix`, computed once per prefix.
    ///
    /// The declared policy of the first call for a prefix is the one that
    /// sticks; an operation is expected to declare the same policy every time.
    pub fn policy_for(&self, key_prefix: &str, declared: &CachePolicy) -> Arc<EffectivePolicy> {
        if let Some(policy) = self.policies.get(key_prefix) {
            return Arc::clone(policy.value());
        }
        let policy = Arc::new(self.settings.effective_policy(key_prefix, declared));
        Arc::clone(
            self.policies
                .entry(key_prefix.to_string())
                .or_insert(policy)
                .value(),
        )
    }

    /// Like [`Self::call`], returning only the value.
    pub async fn cached<T, E, F, Fut>(
        &self,
        invocation: &Invocation,
        declared: &CachePolicy,
        operation: F,
    ) -> Result<Option<T>, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<T>, E>>,
    {
        self.call(invocation, declared, operation)
            .await
            .map(CacheRead::into_value)
    }

    /// Run `operation` through the cache.
    ///
    /// The operation's own error is returned unchanged and never cached. A
    /// `None` result is returned but not cached.
    pub async fn call<T, E, F, Fut>(
        &self,
        invocation: &Invocation,
        declared: &CachePolicy,
        operation: F,
    ) -> Result<CacheRead<T>, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<T>, E>>,
    {
        if !self.settings.enabled {
            self.reset_once().await;
            return Ok(CacheRead::bypassed(operation().await?, None));
        }

        let prefix = invocation.key_prefix();
        let policy = self.policy_for(&prefix, declared);

        let key = match self.deriver.derive_for(invocation, policy.format) {
            Ok(key) => key,
            Err(e) => {
                warn!(prefix = %prefix, error = %e, "Cache key derivation failed, bypassing cache");
                return Ok(CacheRead::bypassed(operation().await?, None));
            }
        };

        let backend = self.backends.resolve(policy.backend);

        if !policy.enabled {
            if let Err(e) = backend.remove(&key).await {
                warn!(key = %key, error = %e, "Failed to remove entry of disabled cache target");
            }
            return Ok(CacheRead::bypassed(operation().await?, Some(key)));
        }

        if backend.kind().is_null() {
            return Ok(CacheRead::bypassed(operation().await?, Some(key)));
        }

        self.emit(&prefix, CacheEvent::Request);

        if let Some(value) = self.probe::<T>(backend.as_ref(), &key, &policy).await {
            self.emit(&prefix, CacheEvent::Hit);
            trace!(key = %key, backend = %backend.kind(), "Cache hit");
            return Ok(CacheRead::from_cache(value, key));
        }

        self.emit(&prefix, CacheEvent::Miss);
        trace!(key = %key, backend = %backend.kind(), "Cache miss");

        let Some(value) = operation().await? else {
            return Ok(CacheRead::from_operation(None, key));
        };

        if self.store(backend.as_ref(), &key, &value, &policy).await {
            self.register_dependencies(invocation, &key, backend.as_ref(), &policy)
                .await;
        }

        Ok(CacheRead::from_operation(Some(value), key))
    }

    /// Decoded cached value, or `None` for anything that should count as a miss.
    async fn probe<T: DeserializeOwned>(
        &self,
        backend: &dyn StorageBackend,
        key: &CacheKey,
        policy: &EffectivePolicy,
    ) -> Option<T> {
        let bytes = match backend.get(key).await {
            Ok(bytes) => bytes?,
            Err(e) => {
                warn!(key = %key, backend = %backend.kind(), error = %e, "Cache probe failed");
                return None;
            }
        };

        match policy.format.decode(&bytes) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(key = %key, error = %e, "Cached value could not be decoded, treating as miss");
                None
            }
        }
    }

    /// Encode and write the result. Returns whether it was stored.
    async fn store<T: Serialize>(
        &self,
        backend: &dyn StorageBackend,
        key: &CacheKey,
        value: &T,
        policy: &EffectivePolicy,
    ) -> bool {
        let bytes = match policy.format.encode(value) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(key = %key, error = %e, "Result could not be encoded, not caching");
                return false;
            }
        };

        match backend.set(key, bytes, policy.expiry()).await {
            Ok(()) => true,
            Err(e) => {
                warn!(key = %key, backend = %backend.kind(), error = %e, "Failed to store cached result");
                false
            }
        }
    }

    /// Register one token per tracked target. On the first failure the
    /// stored entry is removed again.
    async fn register_dependencies(
        &self,
        invocation: &Invocation,
        key: &CacheKey,
        backend: &dyn StorageBackend,
        policy: &EffectivePolicy,
    ) {
        for target in policy.change_tracking.targets() {
            let token = target.token_for(invocation).unwrap_or_else(|e| {
                warn!(
                    entity = %target.entity,
                    error = %e,
                    "Tracking target did not resolve, using entity-level token"
                );
                target.entity_token()
            });

            if let Err(e) = self
                .index
                .register_dependency(&token, key, backend.kind())
                .await
            {
                // An entry no record points at could never be invalidated.
                warn!(
                    token = %token,
                    key = %key,
                    error = %e,
                    "Failed to register cache dependency, dropping cached entry"
                );
                if let Err(e) = backend.remove(key).await {
                    warn!(key = %key, error = %e, "Failed to drop untracked cache entry");
                }
                return;
            }
        }
    }

    /// Reset every backend the first time a call sees the cache disabled.
    async fn reset_once(&self) {
        if self.reset_done.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("Caching disabled, resetting all cache backends");
        if let Err(e) = self.backends.reset_all().await {
            warn!(error = %e, "Cache reset incomplete");
        }
    }

    fn emit(&self, prefix: &str, event: CacheEvent) {
        let metrics = self.settings.metrics;
        if metrics.total_counts {
            self.metrics.record(MetricScope::Total, event);
        }
        if metrics.target_counts {
            self.metrics
                .record(MetricScope::Target(prefix.to_string()), event);
        }
    }
}
