#![cfg(feature = "test-utils")]

use std::sync::Arc;
use std::time::Duration;

use cdc::connection::postgres::{PgConnectionPoolFactory, PgConnectionPools};
use cdc::connection::{ConnectionPoolId, ConnectionPools, KeyedConnectionPools};
use cdc::error::ErrorKind;
use cdc::source::mongodb::MongoDbSourceConfig;
use cdc::source::postgres::PgSourceConfig;
use cdc::test_utils::pool::TestPoolFactory;
use cdc_config::shared::{PgConnectionConfig, TlsConfig};
use cdc_telemetry::tracing::init_test_tracing;
use futures::future::join_all;
use tokio::time::timeout;

fn source_config(hosts: &str) -> MongoDbSourceConfig {
    MongoDbSourceConfig::builder()
        .hosts(hosts)
        .username("cdc")
        .password("secret")
        .build()
        .unwrap()
}

fn pools_with_factory() -> (KeyedConnectionPools<TestPoolFactory>, TestPoolFactory) {
    let factory = TestPoolFactory::new();
    let pools = KeyedConnectionPools::new(factory.clone());

    (pools, factory)
}

#[tokio::test(flavor = "multi_thread")]
async fn concurrent_callers_share_a_single_creation() {
    init_test_tracing();

    let (pools, factory) = pools_with_factory();
    factory.set_delay(Duration::from_millis(100)).await;

    let config = source_config("db1:27017,db2:27017");
    let pool_id = config.connection_pool_id().clone();

    let tasks = (0..16).map(|_| {
        let pools = pools.clone();
        let config = config.clone();
        let pool_id = pool_id.clone();
        tokio::spawn(async move { pools.get_or_create_connection_pool(&pool_id, &config).await })
    });
    let results = join_all(tasks).await;

    let pools_returned: Vec<_> = results
        .into_iter()
        .map(|result| result.unwrap().unwrap())
        .collect();

    assert_eq!(factory.attempts(), 1);
    assert_eq!(factory.creations(), 1);
    for pool in &pools_returned {
        assert!(Arc::ptr_eq(pool, &pools_returned[0]));
    }

    let again = pools.get_or_create_connection_pool(&pool_id, &config).await.unwrap();
    assert!(Arc::ptr_eq(&again, &pools_returned[0]));
    assert_eq!(factory.attempts(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn distinct_ids_get_distinct_pools() {
    init_test_tracing();

    let (pools, factory) = pools_with_factory();

    let first = source_config("db1:27017");
    let second = source_config("db2:27017");

    let first_pool = pools
        .get_or_create_connection_pool(first.connection_pool_id(), &first)
        .await
        .unwrap();
    let second_pool = pools
        .get_or_create_connection_pool(second.connection_pool_id(), &second)
        .await
        .unwrap();

    assert!(!Arc::ptr_eq(&first_pool, &second_pool));
    assert_eq!(&first_pool.pool_id, first.connection_pool_id());
    assert_eq!(&second_pool.pool_id, second.connection_pool_id());
    assert_eq!(factory.creations(), 2);
    assert_eq!(pools.len().await, 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn slow_creation_does_not_block_other_ids() {
    init_test_tracing();

    let (pools, factory) = pools_with_factory();

    let slow = source_config("slow:27017");
    let fast = source_config("fast:27017");
    factory.hold(slow.connection_pool_id()).await;

    let slow_task = {
        let pools = pools.clone();
        let slow = slow.clone();
        tokio::spawn(async move {
            pools
                .get_or_create_connection_pool(slow.connection_pool_id(), &slow)
                .await
        })
    };
    factory.wait_for_attempts(1).await;

    let fast_pool = timeout(
        Duration::from_secs(5),
        pools.get_or_create_connection_pool(fast.connection_pool_id(), &fast),
    )
    .await
    .expect("creation of an unrelated id was blocked")
    .unwrap();
    assert_eq!(&fast_pool.pool_id, fast.connection_pool_id());
    assert!(!pools.contains(slow.connection_pool_id()).await);

    factory.release(slow.connection_pool_id()).await;
    let slow_pool = slow_task.await.unwrap().unwrap();

    assert_eq!(&slow_pool.pool_id, slow.connection_pool_id());
    assert_eq!(factory.creations(), 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn failed_creation_is_reported_and_retried() {
    init_test_tracing();

    let (pools, factory) = pools_with_factory();
    factory.fail_next(1);

    let config = source_config("db1:27017");
    let pool_id = config.connection_pool_id();

    let err = pools
        .get_or_create_connection_pool(pool_id, &config)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::SourceConnectionFailed);
    assert!(err.detail().unwrap().contains("server selection timed out"));
    assert!(!pools.contains(pool_id).await);
    assert!(pools.is_empty().await);

    let pool = pools
        .get_or_create_connection_pool(pool_id, &config)
        .await
        .unwrap();

    assert_eq!(pool.serial, 1);
    assert_eq!(factory.attempts(), 2);
    assert_eq!(factory.creations(), 1);
    assert!(pools.contains(pool_id).await);
}

#[tokio::test(flavor = "multi_thread")]
async fn waiters_observe_the_same_failure() {
    init_test_tracing();

    let (pools, factory) = pools_with_factory();
    factory.set_delay(Duration::from_millis(100)).await;
    factory.fail_next(1);

    let config = source_config("db1:27017");
    let pool_id = config.connection_pool_id().clone();

    let tasks = (0..8).map(|_| {
        let pools = pools.clone();
        let config = config.clone();
        let pool_id = pool_id.clone();
        tokio::spawn(async move { pools.get_or_create_connection_pool(&pool_id, &config).await })
    });

    for result in join_all(tasks).await {
        let err = result.unwrap().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SourceConnectionFailed);
    }

    assert_eq!(factory.attempts(), 1);
    assert_eq!(factory.creations(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn panicking_creation_becomes_an_error() {
    init_test_tracing();

    let (pools, factory) = pools_with_factory();
    factory.panic_next(1);

    let config = source_config("db1:27017");
    let pool_id = config.connection_pool_id();

    let err = pools
        .get_or_create_connection_pool(pool_id, &config)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ConnectionPoolCreationPanic);
    assert!(!pools.contains(pool_id).await);

    let pool = pools
        .get_or_create_connection_pool(pool_id, &config)
        .await
        .unwrap();

    assert_eq!(pool.serial, 1);
    assert_eq!(factory.attempts(), 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn cancelled_caller_does_not_cancel_creation() {
    init_test_tracing();

    let (pools, factory) = pools_with_factory();

    let config = source_config("db1:27017");
    let pool_id = config.connection_pool_id().clone();
    factory.hold(&pool_id).await;

    let caller = {
        let pools = pools.clone();
        let config = config.clone();
        let pool_id = pool_id.clone();
        tokio::spawn(async move { pools.get_or_create_connection_pool(&pool_id, &config).await })
    };
    factory.wait_for_attempts(1).await;

    caller.abort();
    assert!(caller.await.unwrap_err().is_cancelled());

    factory.release(&pool_id).await;

    let pool = pools
        .get_or_create_connection_pool(&pool_id, &config)
        .await
        .unwrap();

    assert_eq!(pool.serial, 1);
    assert_eq!(factory.attempts(), 1);
    assert_eq!(factory.creations(), 1);
    assert!(pools.contains(&pool_id).await);
}

#[tokio::test(flavor = "multi_thread")]
async fn existing_pool_ignores_new_config() {
    init_test_tracing();

    let (pools, factory) = pools_with_factory();

    let first = MongoDbSourceConfig::builder()
        .hosts("db1:27017")
        .batch_size(10)
        .build()
        .unwrap();
    let second = MongoDbSourceConfig::builder()
        .hosts("db1:27017")
        .batch_size(500)
        .build()
        .unwrap();
    assert_ne!(first, second);
    assert_eq!(first.connection_pool_id(), second.connection_pool_id());

    let created = pools
        .get_or_create_connection_pool(first.connection_pool_id(), &first)
        .await
        .unwrap();
    let reused = pools
        .get_or_create_connection_pool(second.connection_pool_id(), &second)
        .await
        .unwrap();

    assert!(Arc::ptr_eq(&created, &reused));
    assert_eq!(reused.batch_size, 10);
    assert_eq!(factory.creations(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn pool_id_is_the_only_key() {
    init_test_tracing();

    let (pools, factory) = pools_with_factory();

    let config = source_config("db1:27017");
    let other_id = ConnectionPoolId::new("mongodb", ["analytics:27017"], None);

    let pool = pools
        .get_or_create_connection_pool(&other_id, &config)
        .await
        .unwrap();

    assert_eq!(pool.pool_id, other_id);
    assert!(pools.contains(&other_id).await);
    assert!(!pools.contains(config.connection_pool_id()).await);
    assert_eq!(factory.creations(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn clones_share_pools() {
    init_test_tracing();

    let (pools, factory) = pools_with_factory();
    let clone = pools.clone();

    let config = source_config("db1:27017");
    let pool_id = config.connection_pool_id();

    let from_original = pools.get_or_create_connection_pool(pool_id, &config).await.unwrap();
    let from_clone = clone.get_or_create_connection_pool(pool_id, &config).await.unwrap();

    assert!(Arc::ptr_eq(&from_original, &from_clone));
    assert_eq!(clone.len().await, 1);
    assert_eq!(factory.creations(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn unreachable_postgres_source_is_not_cached() {
    init_test_tracing();

    let connection = PgConnectionConfig {
        host: "127.0.0.1".to_string(),
        port: 1,
        name: "inventory".to_string(),
        username: "postgres".to_string(),
        password: Some("postgres".into()),
        tls: TlsConfig::default(),
    };
    let config = PgSourceConfig::builder(connection)
        .connection_pool_size(2)
        .connect_timeout(Duration::from_millis(500))
        .build()
        .unwrap();
    let pool_id = config.connection_pool_id();

    let pools = PgConnectionPools::new(PgConnectionPoolFactory::new());
    let err = pools
        .get_or_create_connection_pool(&pool_id, &config)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::SourceConnectionFailed);
    assert!(!pools.contains(&pool_id).await);
    assert!(pools.is_empty().await);
}

#[tokio::test(flavor = "multi_thread")]
async fn panic_before_creation_future_is_retried() {
    init_test_tracing();

    let (pools, factory) = pools_with_factory();
    factory.panic_on_call_next(1);

    let config = source_config("db1:27017");
    let pool_id = config.connection_pool_id();

    let err = pools
        .get_or_create_connection_pool(pool_id, &config)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ConnectionPoolCreationPanic);
    assert!(!pools.contains(pool_id).await);

    let pool = pools
        .get_or_create_connection_pool(pool_id, &config)
        .await
        .unwrap();

    assert_eq!(pool.serial, 1);
    assert_eq!(factory.attempts(), 2);
}

#[test]
fn creation_lost_with_its_runtime_is_retried() {
    init_test_tracing();

    let (pools, factory) = pools_with_factory();
    let config = source_config("db1:27017");
    let pool_id = config.connection_pool_id().clone();

    let first_runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .unwrap();
    first_runtime.block_on(async {
        factory.hold(&pool_id).await;

        let pools = pools.clone();
        let config = config.clone();
        let pool_id = pool_id.clone();
        tokio::spawn(async move {
            let _ = pools.get_or_create_connection_pool(&pool_id, &config).await;
        });

        factory.wait_for_attempts(1).await;
    });
    // Cancels the held creation task along with the caller.
    drop(first_runtime);

    let second_runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .unwrap();
    second_runtime.block_on(async {
        factory.release(&pool_id).await;

        let err = pools
            .get_or_create_connection_pool(&pool_id, &config)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConnectionPoolCreationCancelled);
        assert!(!pools.contains(&pool_id).await);

        let pool = pools
            .get_or_create_connection_pool(&pool_id, &config)
            .await
            .unwrap();

        assert_eq!(pool.serial, 1);
        assert_eq!(factory.attempts(), 2);
        assert!(pools.contains(&pool_id).await);
    });
}

#[tokio::test(flavor = "multi_thread")]
async fn failure_for_one_id_does_not_affect_others() {
    init_test_tracing();

    let (pools, factory) = pools_with_factory();

    let failing = source_config("failing:27017");
    let healthy = source_config("healthy:27017");
    factory.hold(failing.connection_pool_id()).await;

    let failing_task = {
        let pools = pools.clone();
        let failing = failing.clone();
        tokio::spawn(async move {
            pools
                .get_or_create_connection_pool(failing.connection_pool_id(), &failing)
                .await
        })
    };
    factory.wait_for_attempts(1).await;

    let healthy_pool = pools
        .get_or_create_connection_pool(healthy.connection_pool_id(), &healthy)
        .await
        .unwrap();

    factory.fail_next(1);
    factory.release(failing.connection_pool_id()).await;

    let err = failing_task.await.unwrap().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SourceConnectionFailed);

    assert!(pools.contains(healthy.connection_pool_id()).await);
    assert!(!pools.contains(failing.connection_pool_id()).await);

    let reused = pools
        .get_or_create_connection_pool(healthy.connection_pool_id(), &healthy)
        .await
        .unwrap();
    assert!(Arc::ptr_eq(&healthy_pool, &reused));
    assert_eq!(factory.creations(), 1);
}
