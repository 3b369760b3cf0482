//! Explicitly constructed cache context.
//!
//! A [`CacheContext`] is built once at startup from [`CacheSettings`] and
//! passed to whatever code runs cached operations or announces changes.

use std::sync::Arc;

use recall_core::{BackendKind, CacheSettings, RecallResult};
use tracing::{info, warn};

use crate::cache::{
    BackendRegistry, CacheOrchestrator, DependencyIndex, InMemoryBackend, InvalidationTrigger,
    MetricsSink, NoopMetrics, StorageBackend,
};

/// Backend handles, configuration and the components built on them.
#[derive(Clone)]
pub struct CacheContext {
    settings: Arc<CacheSettings>,
    backends: Arc<BackendRegistry>,
    index: Arc<DependencyIndex>,
    orchestrator: Arc<CacheOrchestrator>,
    trigger: InvalidationTrigger,
}

impl CacheContext {
    pub fn builder(settings: CacheSettings) -> CacheContextBuilder {
        CacheContextBuilder::new(settings)
    }

    /// Default settings, memory backend only.
    pub fn in_memory() -> RecallResult<Self> {
        Self::builder(CacheSettings::default()).build()
    }

    pub fn settings(&self) -> &CacheSettings {
        &self.settings
    }

    pub fn backends(&self) -> &BackendRegistry {
        &self.backends
    }

    pub fn backend(&self, kind: BackendKind) -> Arc<dyn StorageBackend> {
        self.backends.resolve(kind)
    }

    pub fn dependency_index(&self) -> &DependencyIndex {
        &self.index
    }

    pub fn orchestrator(&self) -> &CacheOrchestrator {
        &self.orchestrator
    }

    pub fn trigger(&self) -> &InvalidationTrigger {
        &self.trigger
    }

    /// Reset every registered backend, dependency records included.
    pub async fn reset_all(&self) -> RecallResult<()> {
        self.backends.reset_all().await
    }
}

/// Builder for [`CacheContext`].
pub struct CacheContextBuilder {
    settings: CacheSettings,
    extra: Vec<Arc<dyn StorageBackend>>,
    metrics: Arc<dyn MetricsSink>,
}

impl CacheContextBuilder {
    pub fn new(settings: CacheSettings) -> Self {
        Self {
            settings,
            extra: Vec::new(),
            metrics: Arc::new(NoopMetrics),
        }
    }

    /// Register a caller-supplied backend, e.g. a distributed store.
    ///
    /// Replaces the built-in backend of the same kind.
    pub fn with_backend(mut self, backend: Arc<dyn StorageBackend>) -> Self {
        self.extra.push(backend);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Validate settings, open the configured backends and wire everything up.
    ///
    /// Memory is always available. Disk opens now if a setting routes to it,
    /// otherwise on first use. Only invalid settings fail the build; a
    /// backend that cannot be opened is logged and resolves to the null
    /// backend.
    pub fn build(self) -> RecallResult<CacheContext> {
        self.settings.validate()?;

        let mut registry = BackendRegistry::new();
        registry.register(Arc::new(InMemoryBackend::new()));
        let supplied_disk = self.extra.iter().any(|b| b.kind() == BackendKind::Disk);
        if !supplied_disk {
            // Operations may declare Disk in their own policy, so it stays
            // reachable even when no setting names it.
            if self.settings.uses_backend(BackendKind::Disk) {
                registry.open_disk(&self.settings.disk);
            } else {
                registry.with_disk_settings(self.settings.disk.clone());
            }
        }
        for backend in self.extra {
            registry.register(backend);
        }

        let backends = Arc::new(registry);
        let tracking = backends.resolve(self.settings.tracking_backend);
        if tracking.kind().is_null() {
            warn!(
                backend = %self.settings.tracking_backend,
                "Tracking backend unavailable, dependencies will not be recorded"
            );
        }

        let settings = Arc::new(self.settings);
        let index = Arc::new(DependencyIndex::new(tracking, Arc::clone(&backends)));
        let orchestrator = Arc::new(CacheOrchestrator::new(
            Arc::clone(&settings),
            Arc::clone(&backends),
            Arc::clone(&index),
            self.metrics,
        ));
        let trigger = InvalidationTrigger::new(Arc::clone(&index));

        info!(
            enabled = settings.enabled,
            default_backend = %settings.default_backend,
            tracking_backend = %settings.tracking_backend,
            backends = ?backends.kinds(),
            "Cache context ready"
        );

        Ok(CacheContext {
            settings,
            backends,
            index,
            orchestrator,
            trigger,
        })
    }
}
