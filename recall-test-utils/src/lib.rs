//! RECALL Test Utilities
//!
//! Shared proptest generators, fixtures and assertions for the RECALL crates.
//!
//! # Modules
//!
//! - `generators`: proptest strategies for keys, tokens and specs
//! - `fixtures`: tracked entities, scripted operations and ready-made contexts
//! - `assertions`: checks for cache reads, errors and backend contents

// Re-export core types for convenience
pub use recall_core::{
    BackendKind, CacheKey, CachePolicy, CacheSettings, ChangeTrackingSpec, ConfigError, Expiry,
    Invocation, RecallError, RecallResult, SerializationFormat, StorageError, TargetSettings,
    TrackedTarget, ValidationToken,
};
pub use recall_storage::{
    CacheContext, CacheRead, InMemoryBackend, InvalidationTrigger, ReadSource, StorageBackend,
    TrackedEntity,
};

/// Install a test-writer tracing subscriber once per process.
///
/// Honors `RUST_LOG`; defaults to debug output from the storage crate.
pub fn init_test_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("recall_storage=debug"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for generating RECALL values.

    use super::*;
    use proptest::prelude::*;
    use serde_json::Value;

    /// Generate an entity name accepted by the spec parser.
    pub fn arb_entity_name() -> impl Strategy<Value = String> {
        "[A-Z][a-z]{0,10}"
    }

    /// Generate a property name.
    pub fn arb_property_name() -> impl Strategy<Value = String> {
        "[A-Z][A-Za-z]{0,10}"
    }

    /// Generate a dotted argument path.
    pub fn arb_argument_path() -> impl Strategy<Value = String> {
        "[a-z]{1,8}(\\.[a-z]{1,8}){0,2}"
    }

    /// Generate an entity-level or property-scoped validation token.
    pub fn arb_token() -> impl Strategy<Value = ValidationToken> {
        prop_oneof![
            arb_entity_name().prop_map(|e| ValidationToken::for_entity(&e)),
            (arb_entity_name(), arb_property_name(), "[a-z0-9]{1,12}")
                .prop_map(|(e, p, v)| ValidationToken::for_property(&e, &p, &v)),
        ]
    }

    /// Generate an opaque cache key.
    pub fn arb_cache_key() -> impl Strategy<Value = CacheKey> {
        "[a-f0-9]{8}-[a-f0-9]{4}-[a-f0-9]{4}-[a-f0-9]{4}-[a-f0-9]{12}".prop_map(CacheKey::new)
    }

    /// Generate a backend kind that stores entries.
    pub fn arb_backend_kind() -> impl Strategy<Value = BackendKind> {
        prop_oneof![
            Just(BackendKind::Memory),
            Just(BackendKind::Disk),
            Just(BackendKind::Distributed),
        ]
    }

    pub fn arb_format() -> impl Strategy<Value = SerializationFormat> {
        prop_oneof![
            Just(SerializationFormat::Json),
            Just(SerializationFormat::Binary),
        ]
    }

    /// Generate a single tracked target.
    pub fn arb_tracked_target() -> impl Strategy<Value = TrackedTarget> {
        prop_oneof![
            arb_entity_name().prop_map(TrackedTarget::entity),
            (arb_entity_name(), arb_property_name(), arb_argument_path())
                .prop_map(|(e, p, path)| TrackedTarget::property(e, p, path)),
        ]
    }

    /// Generate a valid spec with distinct entities.
    pub fn arb_change_tracking_spec() -> impl Strategy<Value = ChangeTrackingSpec> {
        proptest::collection::vec(arb_tracked_target(), 0..5).prop_map(|targets| {
            let mut seen = std::collections::HashSet::new();
            let targets = targets
                .into_iter()
                .filter(|t| seen.insert(t.entity_token()))
                .collect();
            ChangeTrackingSpec::from_targets(targets)
        })
    }

    /// Generate an argument value, nested up to two levels.
    pub fn arb_argument_value() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(Value::from),
            "[a-zA-Z0-9 ]{0,16}".prop_map(Value::String),
        ];
        leaf.prop_recursive(2, 16, 4, |inner| {
            prop_oneof![
                proptest::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
                proptest::collection::btree_map("[a-z]{1,6}", inner, 0..4)
                    .prop_map(|m| Value::Object(m.into_iter().collect())),
            ]
        })
    }

    /// Generate a small positional argument list.
    pub fn arb_arguments() -> impl Strategy<Value = Vec<Value>> {
        proptest::collection::vec(arb_argument_value(), 0..4)
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built test fixtures for common testing scenarios.

    use super::*;
    use async_trait::async_trait;
    use serde::{Deserialize, Serialize};
    use std::future::{ready, Ready};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::TempDir;

    /// Order record tracked under the `Order` entity.
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct Order {
        pub id: u64,
        pub customer_id: u64,
        pub total_cents: i64,
    }

    impl TrackedEntity for Order {
        fn entity_name() -> &'static str {
            "Order"
        }
    }

    /// Customer record tracked under the `Customer` entity.
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct Customer {
        pub id: u64,
        pub region: String,
    }

    impl TrackedEntity for Customer {
        fn entity_name() -> &'static str {
            "Customer"
        }
    }

    /// Orders for `customer_id`, numbered from `first_id`.
    pub fn orders_for(customer_id: u64, first_id: u64, count: u64) -> Vec<Order> {
        (0..count)
            .map(|i| Order {
                id: first_id + i,
                customer_id,
                total_cents: 1_000 * (i as i64 + 1),
            })
            .collect()
    }

    /// Descriptor for `OrderRepository.by_customer(customer_id)`.
    pub fn orders_by_customer(customer_id: u64) -> Invocation {
        Invocation::new("OrderRepository", "by_customer").arg("customer_id", &customer_id)
    }

    /// Policy tracking orders by customer.
    pub fn orders_by_customer_policy() -> CachePolicy {
        CachePolicy::new()
            .tracking("Order:CustomerId=customer_id")
            .expect("fixture spec should parse")
    }

    /// Stand-in for a data-access call that counts how often it runs.
    #[derive(Debug, Clone, Default)]
    pub struct ScriptedOperation {
        calls: Arc<AtomicUsize>,
    }

    impl ScriptedOperation {
        pub fn new() -> Self {
            Self::default()
        }

        /// Number of times any returned closure has run.
        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        /// Operation that yields `value`.
        pub fn returning<T>(&self, value: Option<T>) -> impl FnOnce() -> Ready<Result<Option<T>, String>> {
            let calls = Arc::clone(&self.calls);
            move || {
                calls.fetch_add(1, Ordering::SeqCst);
                ready(Ok(value))
            }
        }

        /// Operation that fails with `message`.
        pub fn failing<T>(&self, message: &str) -> impl FnOnce() -> Ready<Result<Option<T>, String>> {
            let calls = Arc::clone(&self.calls);
            let message = message.to_string();
            move || {
                calls.fetch_add(1, Ordering::SeqCst);
                ready(Err(message))
            }
        }
    }

    /// Backend whose every operation fails with an I/O error.
    #[derive(Debug, Clone)]
    pub struct FailingBackend {
        kind: BackendKind,
    }

    impl FailingBackend {
        pub fn new(kind: BackendKind) -> Self {
            Self { kind }
        }

        fn failure(&self) -> RecallError {
            RecallError::Storage(StorageError::Io {
                backend: self.kind,
                reason: "injected failure".to_string(),
            })
        }
    }

    #[async_trait]
    impl StorageBackend for FailingBackend {
        fn kind(&self) -> BackendKind {
            self.kind
        }

        async fn get(&self, _key: &CacheKey) -> RecallResult<Option<Vec<u8>>> {
            Err(self.failure())
        }

        async fn set(&self, _key: &CacheKey, _value: Vec<u8>, _expiry: Expiry) -> RecallResult<()> {
            Err(self.failure())
        }

        async fn remove(&self, _key: &CacheKey) -> RecallResult<bool> {
            Err(self.failure())
        }

        async fn exists(&self, _key: &CacheKey) -> RecallResult<bool> {
            Err(self.failure())
        }

        async fn reset(&self) -> RecallResult<()> {
            Err(self.failure())
        }
    }

    /// Default settings, memory backend only.
    pub fn memory_context() -> CacheContext {
        CacheContext::in_memory().expect("memory context should build")
    }

    /// Settings routing `ReportRepository.daily` to disk under `dir`.
    pub fn memory_and_disk_settings(dir: &TempDir) -> CacheSettings {
        CacheSettings::default().with_disk(dir.path(), 16).with_target(
            "ReportRepository.daily",
            TargetSettings::default()
                .with_backend(BackendKind::Disk)
                .with_change_tracking(
                    ChangeTrackingSpec::parse("Order:CustomerId=customer_id")
                        .expect("fixture spec should parse"),
                ),
        )
    }

    /// Context with memory and disk backends, disk rooted in `dir`.
    pub fn memory_and_disk_context(dir: &TempDir) -> CacheContext {
        CacheContext::builder(memory_and_disk_settings(dir))
            .build()
            .expect("memory and disk context should build")
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Custom assertion functions for RECALL-specific validation.

    use super::*;

    #[track_caller]
    pub fn assert_cache_hit<T: std::fmt::Debug>(read: &CacheRead<T>) {
        assert_eq!(read.source(), ReadSource::Hit, "Expected cache hit, got: {:?}", read);
    }

    #[track_caller]
    pub fn assert_cache_miss<T: std::fmt::Debug>(read: &CacheRead<T>) {
        assert_eq!(read.source(), ReadSource::Miss, "Expected cache miss, got: {:?}", read);
    }

    #[track_caller]
    pub fn assert_bypassed<T: std::fmt::Debug>(read: &CacheRead<T>) {
        assert_eq!(read.source(), ReadSource::Bypass, "Expected bypass, got: {:?}", read);
    }

    /// Assert that a RecallResult is a Config error.
    #[track_caller]
    pub fn assert_config_error<T: std::fmt::Debug>(result: &RecallResult<T>) {
        match result {
            Err(RecallError::Config(_)) => {}
            other => panic!("Expected Config error, got: {:?}", other),
        }
    }

    /// Assert that a RecallResult is a Storage error.
    #[track_caller]
    pub fn assert_storage_error<T: std::fmt::Debug>(result: &RecallResult<T>) {
        match result {
            Err(RecallError::Storage(_)) => {}
            other => panic!("Expected Storage error, got: {:?}", other),
        }
    }

    /// Assert that a spec string is rejected.
    #[track_caller]
    pub fn assert_malformed_spec(spec: &str) {
        match ChangeTrackingSpec::parse(spec) {
            Err(ConfigError::MalformedChangeTracking { .. }) => {}
            other => panic!("Expected malformed spec for '{}', got: {:?}", spec, other),
        }
    }

    /// Assert that a cache key has the bare hyphenated-GUID form.
    #[track_caller]
    pub fn assert_guid_key(key: &CacheKey) {
        let raw = key.as_str();
        assert_eq!(raw.len(), 36, "Expected 36-char key, got: {}", raw);
        assert!(
            raw.split('-').map(str::len).eq([8, 4, 4, 4, 12]),
            "Expected hyphenated GUID, got: {}",
            raw
        );
    }

    /// Assert that `backend` holds a live entry for `key`.
    pub async fn assert_present(backend: &dyn StorageBackend, key: &CacheKey) {
        let exists = backend
            .exists(key)
            .await
            .expect("exists should succeed");
        assert!(exists, "Expected {} in {} backend", key, backend.kind());
    }

    /// Assert that `backend` has no live entry for `key`.
    pub async fn assert_absent(backend: &dyn StorageBackend, key: &CacheKey) {
        let exists = backend
            .exists(key)
            .await
            .expect("exists should succeed");
        assert!(!exists, "Expected no {} in {} backend", key, backend.kind());
    }
}

// ============================================================================
// TESTS
// ============================================================================
