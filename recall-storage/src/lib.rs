//! RECALL Storage - Cache-Aside Orchestration and Backends
//!
//! Memoizes operation results in pluggable backends and evicts them through
//! a durable token → entry dependency index when the underlying data changes.
//! Pure types (keys, tokens, configuration) live in `recall-core`.

pub mod cache;
pub mod context;

pub use cache::{
    BackendRegistry, CacheEvent, CacheOrchestrator, CacheRead, CacheStats, CounterMetrics,
    DependencyIndex, DependencyRecord, DependentEntry, InMemoryBackend, InvalidationTrigger,
    LmdbBackend, LmdbCacheError, MetricScope, MetricsSink, NoopMetrics, NullBackend, ReadSource,
    StorageBackend, StoredEntry, TrackedEntity,
};
pub use context::{CacheContext, CacheContextBuilder};

// ============================================================================
// PROPERTY-BASED TESTS
// ============================================================================
