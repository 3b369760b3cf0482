//! End-to-end cache-aside behavior through a built `CacheContext`.

use std::sync::Arc;
use std::time::Duration;

use recall_storage::CounterMetrics;
use recall_storage::MetricScope;
use recall_test_utils::assertions::*;
use recall_test_utils::fixtures::*;
use recall_test_utils::*;
use tempfile::TempDir;

#[tokio::test]
async fn test_second_call_is_served_from_cache() {
    init_test_tracing();
    let context = memory_context();
    let op = ScriptedOperation::new();
    let orders = orders_for(7, 1, 3);

    let first = context
        .orchestrator()
        .call(&orders_by_customer(7), &orders_by_customer_policy(), op.returning(Some(orders.clone())))
        .await
        .expect("first call should succeed");
    assert_cache_miss(&first);

    let second = context
        .orchestrator()
        .call(&orders_by_customer(7), &orders_by_customer_policy(), op.returning(Some(Vec::<Order>::new())))
        .await
        .expect("second call should succeed");
    assert_cache_hit(&second);

    assert_eq!(second.value(), Some(&orders));
    assert_eq!(first.key(), second.key());
    assert_eq!(op.calls(), 1);
}

#[tokio::test]
async fn test_keys_are_deterministic_across_contexts() {
    let a = memory_context();
    let b = memory_context();
    let op = ScriptedOperation::new();

    let ka = a
        .orchestrator()
        .call(&orders_by_customer(7), &CachePolicy::new(), op.returning(Some(1u32)))
        .await
        .expect("call should succeed");
    let kb = b
        .orchestrator()
        .call(&orders_by_customer(7), &CachePolicy::new(), op.returning(Some(1u32)))
        .await
        .expect("call should succeed");
    let other = b
        .orchestrator()
        .call(&orders_by_customer(8), &CachePolicy::new(), op.returning(Some(1u32)))
        .await
        .expect("call should succeed");

    assert_eq!(ka.key(), kb.key());
    assert_ne!(ka.key(), other.key());
    let key = ka.key().expect("key should be derived");
    assert!(key.as_str().starts_with("OrderRepository.by_customer_"));
}

#[tokio::test]
async fn test_hashed_prefix_yields_bare_guid() {
    let context = CacheContext::builder(CacheSettings::default().with_hash_prefix_in_key(true))
        .build()
        .expect("context should build");
    let op = ScriptedOperation::new();

    let read = context
        .orchestrator()
        .call(&orders_by_customer(7), &CachePolicy::new(), op.returning(Some(1u32)))
        .await
        .expect("call should succeed");
    assert_guid_key(read.key().expect("key should be derived"));
}

#[tokio::test]
async fn test_repeated_registration_keeps_single_entry() {
    let context = memory_context();
    let op = ScriptedOperation::new();
    let invocation = orders_by_customer(7);
    let policy = orders_by_customer_policy();

    let read = context
        .orchestrator()
        .call(&invocation, &policy, op.returning(Some(orders_for(7, 1, 1))))
        .await
        .expect("call should succeed");
    let key = read.key().expect("key should be derived").clone();

    let token = ValidationToken::for_property("Order", "CustomerId", "7");
    context
        .dependency_index()
        .register_dependency(&token, &key, BackendKind::Memory)
        .await
        .expect("register should succeed");

    let record = context
        .dependency_index()
        .record(&token)
        .await
        .expect("record should load")
        .expect("record should exist");
    assert_eq!(record.len(), 1);
    assert!(record.contains(&key, BackendKind::Memory));
}

#[tokio::test]
async fn test_refresh_evicts_entries_in_memory_and_disk() {
    init_test_tracing();
    let temp_dir = TempDir::new().expect("TempDir creation should succeed");
    let context = memory_and_disk_context(&temp_dir);
    let op = ScriptedOperation::new();

    let orders = context
        .orchestrator()
        .call(&orders_by_customer(7), &orders_by_customer_policy(), op.returning(Some(orders_for(7, 1, 2))))
        .await
        .expect("orders call should succeed");
    let report_invocation = Invocation::new("ReportRepository", "daily").arg("customer_id", &7u64);
    let report = context
        .orchestrator()
        .call(&report_invocation, &CachePolicy::new(), op.returning(Some("report".to_string())))
        .await
        .expect("report call should succeed");
    let untouched = context
        .orchestrator()
        .call(&orders_by_customer(8), &orders_by_customer_policy(), op.returning(Some(orders_for(8, 10, 1))))
        .await
        .expect("other customer call should succeed");

    let memory = context.backend(BackendKind::Memory);
    let disk = context.backend(BackendKind::Disk);
    let orders_key = orders.key().expect("key should be derived");
    let report_key = report.key().expect("key should be derived");
    assert_present(memory.as_ref(), orders_key).await;
    assert_present(disk.as_ref(), report_key).await;

    let removed = context
        .trigger()
        .refresh_where::<Order, _>("CustomerId", &7u64)
        .await
        .expect("refresh should succeed");
    assert_eq!(removed, 2);

    assert_absent(memory.as_ref(), orders_key).await;
    assert_absent(disk.as_ref(), report_key).await;
    assert_present(memory.as_ref(), untouched.key().expect("key should be derived")).await;

    let token = ValidationToken::for_property("Order", "CustomerId", "7");
    let record = context
        .dependency_index()
        .record(&token)
        .await
        .expect("record should load");
    assert!(record.is_none());

    let again = context
        .orchestrator()
        .call(&orders_by_customer(7), &orders_by_customer_policy(), op.returning(Some(orders_for(7, 1, 2))))
        .await
        .expect("call should succeed");
    assert_cache_miss(&again);
}

#[tokio::test]
async fn test_unresolved_path_registers_entity_token() {
    let context = memory_context();
    let op = ScriptedOperation::new();
    let policy = CachePolicy::new()
        .tracking("Order:CustomerId=account.id")
        .expect("spec should parse");

    let read = context
        .orchestrator()
        .call(&orders_by_customer(7), &policy, op.returning(Some(1u32)))
        .await
        .expect("call should succeed");
    let key = read.key().expect("key should be derived");

    let record = context
        .dependency_index()
        .record(&ValidationToken::for_entity("Order"))
        .await
        .expect("record should load")
        .expect("entity-level record should exist");
    assert!(record.contains(key, BackendKind::Memory));

    assert_eq!(
        context.trigger().refresh::<Order>().await.expect("refresh should succeed"),
        1
    );
    assert_absent(context.backend(BackendKind::Memory).as_ref(), key).await;
}

#[tokio::test]
async fn test_disabled_cache_runs_operation_every_time() {
    let context = CacheContext::builder(CacheSettings::default().with_enabled(false))
        .build()
        .expect("context should build");
    let op = ScriptedOperation::new();

    for _ in 0..2 {
        let read = context
            .orchestrator()
            .call(&orders_by_customer(7), &orders_by_customer_policy(), op.returning(Some(5u32)))
            .await
            .expect("call should succeed");
        assert_bypassed(&read);
        assert_eq!(read.value(), Some(&5));
    }
    assert_eq!(op.calls(), 2);
}

#[tokio::test]
async fn test_disabling_cache_resets_previous_entries() {
    let memory = Arc::new(InMemoryBackend::new());
    let key = CacheKey::new("left-over");
    memory
        .set(&key, b"stale".to_vec(), Expiry::Never)
        .await
        .expect("set should succeed");

    let context = CacheContext::builder(CacheSettings::default().with_enabled(false))
        .with_backend(memory.clone())
        .build()
        .expect("context should build");
    let op = ScriptedOperation::new();
    context
        .orchestrator()
        .call(&orders_by_customer(7), &CachePolicy::new(), op.returning(Some(1u32)))
        .await
        .expect("call should succeed");

    assert!(memory.is_empty().await);
}

#[tokio::test]
async fn test_none_result_is_not_cached() {
    let context = memory_context();
    let op = ScriptedOperation::new();

    for _ in 0..2 {
        let read = context
            .orchestrator()
            .call(&orders_by_customer(7), &orders_by_customer_policy(), op.returning(None::<Vec<Order>>))
            .await
            .expect("call should succeed");
        assert_cache_miss(&read);
        assert!(read.value().is_none());
        assert_absent(
            context.backend(BackendKind::Memory).as_ref(),
            read.key().expect("key should be derived"),
        )
        .await;
    }
    assert_eq!(op.calls(), 2);
}

#[tokio::test]
async fn test_operation_error_propagates_and_is_not_cached() {
    let context = memory_context();
    let op = ScriptedOperation::new();

    let result = context
        .orchestrator()
        .cached(&orders_by_customer(7), &CachePolicy::new(), op.failing::<u32>("database unavailable"))
        .await;
    assert_eq!(result, Err("database unavailable".to_string()));

    let result = context
        .orchestrator()
        .cached(&orders_by_customer(7), &CachePolicy::new(), op.returning(Some(3u32)))
        .await;
    assert_eq!(result, Ok(Some(3)));
    assert_eq!(op.calls(), 2);
}

#[tokio::test]
async fn test_failing_cache_backend_degrades_to_uncached() {
    init_test_tracing();
    let settings = CacheSettings::default().with_default_backend(BackendKind::Distributed);
    let context = CacheContext::builder(settings)
        .with_backend(Arc::new(FailingBackend::new(BackendKind::Distributed)))
        .build()
        .expect("context should build");
    let op = ScriptedOperation::new();

    for _ in 0..2 {
        let value = context
            .orchestrator()
            .cached(&orders_by_customer(7), &orders_by_customer_policy(), op.returning(Some(9u32)))
            .await
            .expect("call should succeed");
        assert_eq!(value, Some(9));
    }
    assert_eq!(op.calls(), 2);

    let token = ValidationToken::for_property("Order", "CustomerId", "7");
    let record = context
        .dependency_index()
        .record(&token)
        .await
        .expect("record should load");
    assert!(record.is_none());
}

#[tokio::test]
async fn test_failing_tracking_backend_leaves_nothing_cached() {
    let settings = CacheSettings::default().with_tracking_backend(BackendKind::Distributed);
    let context = CacheContext::builder(settings)
        .with_backend(Arc::new(FailingBackend::new(BackendKind::Distributed)))
        .build()
        .expect("context should build");
    let op = ScriptedOperation::new();

    for _ in 0..2 {
        let read = context
            .orchestrator()
            .call(&orders_by_customer(7), &orders_by_customer_policy(), op.returning(Some(9u32)))
            .await
            .expect("call should succeed");
        assert_cache_miss(&read);
        assert_eq!(read.value(), Some(&9));
        assert_absent(
            context.backend(BackendKind::Memory).as_ref(),
            read.key().expect("key should be derived"),
        )
        .await;
    }
    assert_eq!(op.calls(), 2);

    let result = context
        .trigger()
        .refresh_where::<Order, _>("CustomerId", &7u64)
        .await;
    assert_storage_error(&result);
}

#[tokio::test]
async fn test_declared_disk_policy_is_cached() {
    let temp_dir = TempDir::new().expect("TempDir creation should succeed");
    let settings = CacheSettings::default().with_disk(temp_dir.path(), 16);
    let context = CacheContext::builder(settings)
        .build()
        .expect("context should build");
    let op = ScriptedOperation::new();
    let policy = orders_by_customer_policy().with_backend(BackendKind::Disk);

    let first = context
        .orchestrator()
        .call(&orders_by_customer(7), &policy, op.returning(Some(orders_for(7, 1, 2))))
        .await
        .expect("first call should succeed");
    assert_cache_miss(&first);
    assert!(context.backends().is_registered(BackendKind::Disk));

    let second = context
        .orchestrator()
        .call(&orders_by_customer(7), &policy, op.returning(Some(Vec::<Order>::new())))
        .await
        .expect("second call should succeed");
    assert_cache_hit(&second);
    assert_eq!(second.value(), first.value());
    assert_eq!(op.calls(), 1);

    let removed = context
        .trigger()
        .refresh_where::<Order, _>("CustomerId", &7u64)
        .await
        .expect("refresh should succeed");
    assert_eq!(removed, 1);
    assert_absent(
        context.backend(BackendKind::Disk).as_ref(),
        first.key().expect("key should be derived"),
    )
    .await;
}

#[tokio::test]
async fn test_long_token_value_is_invalidated_with_disk_tracking() {
    let temp_dir = TempDir::new().expect("TempDir creation should succeed");
    let settings = CacheSettings::default()
        .with_disk(temp_dir.path(), 16)
        .with_tracking_backend(BackendKind::Disk);
    let context = CacheContext::builder(settings)
        .build()
        .expect("context should build");
    let op = ScriptedOperation::new();
    let policy = CachePolicy::new()
        .tracking("Order:Name=name")
        .expect("spec should parse");
    let name = "x".repeat(600);
    let invocation = Invocation::new("OrderRepository", "by_name").arg("name", &name);

    let read = context
        .orchestrator()
        .call(&invocation, &policy, op.returning(Some(3u32)))
        .await
        .expect("call should succeed");
    let key = read.key().expect("key should be derived");
    assert_present(context.backend(BackendKind::Memory).as_ref(), key).await;

    let removed = context
        .trigger()
        .refresh_property("Order", "Name", &name)
        .await
        .expect("refresh should succeed");
    assert_eq!(removed, 1);
    assert_absent(context.backend(BackendKind::Memory).as_ref(), key).await;
}

#[tokio::test]
async fn test_lifespan_expires_entries() {
    let context = memory_context();
    let op = ScriptedOperation::new();
    let policy = CachePolicy::new().with_lifespan(Duration::from_millis(50));

    context
        .orchestrator()
        .call(&orders_by_customer(7), &policy, op.returning(Some(1u32)))
        .await
        .expect("call should succeed");
    tokio::time::sleep(Duration::from_millis(120)).await;

    let read = context
        .orchestrator()
        .call(&orders_by_customer(7), &policy, op.returning(Some(2u32)))
        .await
        .expect("call should succeed");
    assert_cache_miss(&read);
    assert_eq!(read.value(), Some(&2));
    assert_eq!(op.calls(), 2);
}

#[tokio::test]
async fn test_configured_target_overrides_declared_policy() {
    let source = r#"
        default_backend = "memory"

        [targets."OrderRepository.by_customer"]
        enabled = false
    "#;
    let settings = CacheSettings::from_toml_str(source).expect("settings should parse");
    let context = CacheContext::builder(settings)
        .build()
        .expect("context should build");
    let op = ScriptedOperation::new();

    for _ in 0..2 {
        let read = context
            .orchestrator()
            .call(&orders_by_customer(7), &orders_by_customer_policy(), op.returning(Some(1u32)))
            .await
            .expect("call should succeed");
        assert_bypassed(&read);
    }
    assert_eq!(op.calls(), 2);
}

#[tokio::test]
async fn test_metrics_count_requests_hits_and_misses() {
    let metrics = Arc::new(CounterMetrics::new());
    let context = CacheContext::builder(CacheSettings::default().with_metrics(true, true))
        .with_metrics(metrics.clone())
        .build()
        .expect("context should build");
    let op = ScriptedOperation::new();

    for _ in 0..3 {
        context
            .orchestrator()
            .call(&orders_by_customer(7), &CachePolicy::new(), op.returning(Some(1u32)))
            .await
            .expect("call should succeed");
    }

    let total = metrics.stats(&MetricScope::Total);
    assert_eq!((total.requests, total.hits, total.misses), (3, 2, 1));
    let target = metrics.stats(&MetricScope::Target("OrderRepository.by_customer".to_string()));
    assert_eq!(target.requests, 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_calls_register_every_entry() {
    let context = memory_context();
    let policy = CachePolicy::new().tracking("Order").expect("spec should parse");

    let mut handles = Vec::new();
    for customer_id in 0..32u64 {
        let context = context.clone();
        let policy = policy.clone();
        handles.push(tokio::spawn(async move {
            let op = ScriptedOperation::new();
            context
                .orchestrator()
                .call(&orders_by_customer(customer_id), &policy, op.returning(Some(customer_id)))
                .await
                .expect("call should succeed")
        }));
    }
    for handle in handles {
        handle.await.expect("task should complete");
    }

    let record = context
        .dependency_index()
        .record(&ValidationToken::for_entity("Order"))
        .await
        .expect("record should load")
        .expect("record should exist");
    assert_eq!(record.len(), 32);
    assert_eq!(context.dependency_index().active_locks(), 0);

    assert_eq!(
        context.trigger().refresh::<Order>().await.expect("refresh should succeed"),
        32
    );
}
