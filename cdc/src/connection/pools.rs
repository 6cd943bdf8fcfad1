use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use metrics::{counter, gauge, histogram};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::cdc_error;
use crate::connection::ConnectionPoolId;
use crate::error::{CdcResult, ErrorKind};
use crate::metrics::{
    CDC_CONNECTION_POOL_CREATION_DURATION_SECONDS, CDC_CONNECTION_POOL_CREATION_FAILURES_TOTAL,
    CDC_CONNECTION_POOL_CREATIONS_TOTAL, CDC_CONNECTION_POOLS_CACHED, ENGINE_LABEL,
};
use crate::source::SourceConfig;

/// A collection of connection pools, one per connection target.
///
/// Read tasks call [`ConnectionPools::get_or_create_connection_pool`] before they start
/// reading. The returned pool is shared with the collection and with every other caller
/// for the same id: callers use it through the driver's API and never close it.
pub trait ConnectionPools<P, C>
where
    C: SourceConfig,
{
    /// Returns the pool for `pool_id`, creating it from `source_config` if none exists.
    ///
    /// `source_config` is only read when a pool has to be created. A pool that already
    /// exists for `pool_id` is returned as is, even if it was created from a different
    /// configuration.
    fn get_or_create_connection_pool(
        &self,
        pool_id: &ConnectionPoolId,
        source_config: &C,
    ) -> impl Future<Output = CdcResult<Arc<P>>> + Send;
}

/// Builds driver specific connection pools.
///
/// Implemented once per engine and plugged into [`KeyedConnectionPools`], which takes
/// care of caching and deduplication.
pub trait ConnectionPoolFactory: Send + Sync + 'static {
    /// The driver's pool handle.
    type Pool: Send + Sync + 'static;

    /// The source configuration that parameterizes new pools.
    type Config: SourceConfig + Clone + 'static;

    /// Short engine name used in logs and metric labels.
    fn engine(&self) -> &'static str;

    /// Builds a new pool for `pool_id`.
    ///
    /// May perform network I/O. Errors must keep the driver's error as their source so
    /// the cause reaches the caller.
    fn create_pool(
        &self,
        pool_id: &ConnectionPoolId,
        source_config: &Self::Config,
    ) -> impl Future<Output = CdcResult<Self::Pool>> + Send;
}

/// Outcome of a pool creation, shared by every task waiting on it.
type PoolCreation<P> = Shared<BoxFuture<'static, CdcResult<Arc<P>>>>;

enum PoolSlot<P> {
    /// The pool exists.
    Ready(Arc<P>),
    /// A task is building the pool.
    Creating(PoolCreation<P>),
}

/// Slot map shared by the clones of a [`KeyedConnectionPools`] and its creation tasks.
struct PoolSlots<P> {
    engine: &'static str,
    slots: Mutex<HashMap<ConnectionPoolId, PoolSlot<P>>>,
}

impl<P> PoolSlots<P> {
    /// Drops the slot for `pool_id` if it still holds an unfinished creation.
    async fn discard_creation(&self, pool_id: &ConnectionPoolId) {
        let mut slots = self.slots.lock().await;
        if matches!(slots.get(pool_id), Some(PoolSlot::Creating(_))) {
            slots.remove(pool_id);
        }
    }
}

impl<P> Drop for PoolSlots<P> {
    fn drop(&mut self) {
        let ready = self
            .slots
            .get_mut()
            .values()
            .filter(|slot| matches!(slot, PoolSlot::Ready(_)))
            .count();

        if ready > 0 {
            gauge!(CDC_CONNECTION_POOLS_CACHED, ENGINE_LABEL => self.engine)
                .decrement(ready as f64);
        }
    }
}

/// [`ConnectionPools`] implementation that creates at most one pool per id.
///
/// The first caller for an id spawns the creation on its own task and records it in the
/// map; concurrent callers for the same id wait on that same creation. The map lock is
/// only held to look up or update a slot, never while a pool is being built, so
/// creations for different ids run in parallel.
///
/// A creation that fails, panics or never finishes removes its slot, so the next call
/// for that id tries again. A caller that stops waiting does not cancel the creation:
/// the pool still lands in the map for later callers.
///
/// Pools are kept until the last clone of the collection is dropped. There is no
/// eviction.
pub struct KeyedConnectionPools<F>
where
    F: ConnectionPoolFactory,
{
    factory: Arc<F>,
    slots: Arc<PoolSlots<F::Pool>>,
}

impl<F> KeyedConnectionPools<F>
where
    F: ConnectionPoolFactory,
{
    /// Creates an empty collection that builds pools with `factory`.
    pub fn new(factory: F) -> Self {
        let engine = factory.engine();

        Self {
            factory: Arc::new(factory),
            slots: Arc::new(PoolSlots {
                engine,
                slots: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Returns the factory used to build pools.
    pub fn factory(&self) -> &F {
        &self.factory
    }

    /// Returns the number of pools that finished creation.
    pub async fn len(&self) -> usize {
        let slots = self.slots.slots.lock().await;
        slots
            .values()
            .filter(|slot| matches!(slot, PoolSlot::Ready(_)))
            .count()
    }

    /// Returns `true` when no pool finished creation.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Returns `true` when a pool for `pool_id` exists.
    pub async fn contains(&self, pool_id: &ConnectionPoolId) -> bool {
        let slots = self.slots.slots.lock().await;
        matches!(slots.get(pool_id), Some(PoolSlot::Ready(_)))
    }

    /// Starts building the pool for `pool_id` on a separate task.
    fn spawn_creation(
        &self,
        pool_id: ConnectionPoolId,
        source_config: F::Config,
    ) -> PoolCreation<F::Pool> {
        let factory = self.factory.clone();
        let task_slots = self.slots.clone();
        let engine = factory.engine();

        let task_pool_id = pool_id.clone();
        let handle = tokio::spawn(async move {
            let pool_id = task_pool_id;
            let started_at = Instant::now();

            // The factory call itself runs inside the guard, so a panic raised before
            // its future is returned is caught too.
            let creation = async { factory.create_pool(&pool_id, &source_config).await };
            let result = AssertUnwindSafe(creation)
                .catch_unwind()
                .await
                .unwrap_or_else(|_| {
                    warn!(%pool_id, "connection pool creation panicked");
                    Err(cdc_error!(
                        ErrorKind::ConnectionPoolCreationPanic,
                        "Connection pool creation panicked",
                        pool_id.to_string()
                    ))
                });

            let mut slots = task_slots.slots.lock().await;
            match result {
                Ok(pool) => {
                    let pool = Arc::new(pool);
                    slots.insert(pool_id.clone(), PoolSlot::Ready(pool.clone()));

                    let elapsed = started_at.elapsed();
                    counter!(CDC_CONNECTION_POOL_CREATIONS_TOTAL, ENGINE_LABEL => engine)
                        .increment(1);
                    gauge!(CDC_CONNECTION_POOLS_CACHED, ENGINE_LABEL => engine).increment(1.0);
                    histogram!(
                        CDC_CONNECTION_POOL_CREATION_DURATION_SECONDS,
                        ENGINE_LABEL => engine
                    )
                    .record(elapsed.as_secs_f64());

                    info!(
                        %pool_id,
                        elapsed_ms = elapsed.as_millis() as u64,
                        "connection pool created"
                    );

                    Ok(pool)
                }
                Err(err) => {
                    slots.remove(&pool_id);

                    counter!(CDC_CONNECTION_POOL_CREATION_FAILURES_TOTAL, ENGINE_LABEL => engine)
                        .increment(1);

                    error!(%pool_id, error = %err, "connection pool creation failed");

                    Err(err)
                }
            }
        });

        let slots = self.slots.clone();
        async move {
            match handle.await {
                Ok(result) => result,
                // The task was dropped before it could settle its slot, e.g. because its
                // runtime shut down.
                Err(join_err) => {
                    slots.discard_creation(&pool_id).await;

                    counter!(CDC_CONNECTION_POOL_CREATION_FAILURES_TOTAL, ENGINE_LABEL => engine)
                        .increment(1);
                    warn!(%pool_id, "connection pool creation task did not complete");

                    let kind = if join_err.is_panic() {
                        ErrorKind::ConnectionPoolCreationPanic
                    } else {
                        ErrorKind::ConnectionPoolCreationCancelled
                    };
                    Err(cdc_error!(
                        kind,
                        "Connection pool creation task did not complete",
                        pool_id.to_string(),
                        source: join_err
                    ))
                }
            }
        }
        .boxed()
        .shared()
    }
}

impl<F> ConnectionPools<F::Pool, F::Config> for KeyedConnectionPools<F>
where
    F: ConnectionPoolFactory,
{
    async fn get_or_create_connection_pool(
        &self,
        pool_id: &ConnectionPoolId,
        source_config: &F::Config,
    ) -> CdcResult<Arc<F::Pool>> {
        let creation = {
            let mut slots = self.slots.slots.lock().await;
            match slots.entry(pool_id.clone()) {
                Entry::Occupied(entry) => match entry.get() {
                    PoolSlot::Ready(pool) => {
                        debug!(%pool_id, "reusing connection pool");
                        return Ok(pool.clone());
                    }
                    PoolSlot::Creating(creation) => {
                        debug!(%pool_id, "waiting for connection pool creation");
                        creation.clone()
                    }
                },
                Entry::Vacant(entry) => {
                    debug!(%pool_id, "creating connection pool");
                    let creation = self.spawn_creation(pool_id.clone(), source_config.clone());
                    entry.insert(PoolSlot::Creating(creation.clone()));
                    creation
                }
            }
        };

        creation.await
    }
}

impl<F> Clone for KeyedConnectionPools<F>
where
    F: ConnectionPoolFactory,
{
    /// Clones share the same pools.
    fn clone(&self) -> Self {
        Self {
            factory: self.factory.clone(),
            slots: self.slots.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;

    use futures::future;
    use metrics::{
        Counter, Gauge, GaugeFn, Histogram, Key, KeyName, Metadata, Recorder, SharedString, Unit,
    };

    use super::*;

    #[derive(Default)]
    struct GaugeTotal(StdMutex<f64>);

    impl GaugeFn for GaugeTotal {
        fn increment(&self, value: f64) {
            *self.0.lock().unwrap() += value;
        }

        fn decrement(&self, value: f64) {
            *self.0.lock().unwrap() -= value;
        }

        fn set(&self, value: f64) {
            *self.0.lock().unwrap() = value;
        }
    }

    /// Routes the cached pools gauge into a [`GaugeTotal`] and ignores everything else.
    struct CachedPoolsRecorder {
        total: Arc<GaugeTotal>,
    }

    impl Recorder for CachedPoolsRecorder {
        fn describe_counter(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}

        fn describe_gauge(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}

        fn describe_histogram(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}

        fn register_counter(&self, _: &Key, _: &Metadata<'_>) -> Counter {
            Counter::noop()
        }

        fn register_gauge(&self, key: &Key, _: &Metadata<'_>) -> Gauge {
            if key.name() == CDC_CONNECTION_POOLS_CACHED {
                Gauge::from_arc(self.total.clone())
            } else {
                Gauge::noop()
            }
        }

        fn register_histogram(&self, _: &Key, _: &Metadata<'_>) -> Histogram {
            Histogram::noop()
        }
    }

    #[test]
    fn test_dropping_slots_releases_cached_pools_gauge() {
        let total = Arc::new(GaugeTotal::default());
        let recorder = CachedPoolsRecorder {
            total: total.clone(),
        };

        let pending: PoolCreation<()> = future::ready::<CdcResult<Arc<()>>>(Ok(Arc::new(())))
            .boxed()
            .shared();
        let mut slots = HashMap::new();
        slots.insert(
            ConnectionPoolId::new("mongodb", ["db1"], None),
            PoolSlot::Ready(Arc::new(())),
        );
        slots.insert(
            ConnectionPoolId::new("mongodb", ["db2"], None),
            PoolSlot::Ready(Arc::new(())),
        );
        slots.insert(
            ConnectionPoolId::new("mongodb", ["db3"], None),
            PoolSlot::Creating(pending),
        );
        let pool_slots = PoolSlots {
            engine: "mongodb",
            slots: Mutex::new(slots),
        };

        metrics::with_local_recorder(&recorder, || drop(pool_slots));

        assert_eq!(*total.0.lock().unwrap(), -2.0);
    }
}
