//! Cache-aside layer with dependency-driven invalidation.
//!
//! Results of arbitrary operations are memoized under deterministic keys.
//! Each cached result is registered against the validation tokens named by
//! its change-tracking spec, so mutation code can evict everything that
//! depends on a piece of data without knowing any cache keys.
//!
//! # Flow
//!
//! ```text
//! caller ─▶ CacheOrchestrator ─▶ KeyDeriver ─▶ StorageBackend (probe)
//!                 │ miss
//!                 ├─▶ operation ─▶ StorageBackend (store)
//!                 └─▶ DependencyIndex (register tokens)
//!
//! mutation ─▶ InvalidationTrigger ─▶ DependencyIndex ─▶ StorageBackend (remove)
//! ```
//!
//! # Example
//!
//! ```ignore
//! let context = CacheContext::builder(settings).build()?;
//! let policy = CachePolicy::new().tracking("Order:CustomerId=customer_id")?;
//!
//! let invocation = Invocation::new("OrderRepository", "by_customer").arg("customer_id", &42);
//! let orders = context
//!     .orchestrator()
//!     .cached(&invocation, &policy, || repo.by_customer(42))
//!     .await?;
//!
//! // Later, after a write
//! context.trigger().refresh_where::<Order, _>("CustomerId", &42).await?;
//! ```

pub mod dependency;
pub mod lmdb_backend;
pub mod memory;
pub mod metrics;
pub mod null;
pub mod orchestrator;
pub mod read;
pub mod registry;
pub mod traits;
pub mod trigger;

pub use dependency::{DependencyIndex, DependencyRecord, DependentEntry, RECORD_KEY_PREFIX};
pub use lmdb_backend::{LmdbBackend, LmdbCacheError};
pub use memory::InMemoryBackend;
pub use metrics::{CacheEvent, CounterMetrics, MetricScope, MetricsSink, NoopMetrics};
pub use null::NullBackend;
pub use orchestrator::CacheOrchestrator;
pub use read::{CacheRead, ReadSource};
pub use registry::BackendRegistry;
pub use traits::{CacheStats, StorageBackend, StoredEntry, TrackedEntity};
pub use trigger::InvalidationTrigger;
