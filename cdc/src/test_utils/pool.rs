use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::{Mutex, Notify};

use crate::bail;
use crate::connection::{ConnectionPoolFactory, ConnectionPoolId};
use crate::error::{CdcResult, ErrorKind};
use crate::source::mongodb::{MONGODB_ENGINE, MongoDbSourceConfig};

/// Pool handed out by [`TestPoolFactory`].
#[derive(Debug)]
pub struct TestPool {
    pub pool_id: ConnectionPoolId,
    /// Position of this pool in the factory's creation order, starting at 1.
    pub serial: usize,
    /// Batch size of the configuration the pool was created from.
    pub batch_size: u32,
}

#[derive(Debug, Default)]
struct Inner {
    attempts: AtomicUsize,
    creations: AtomicUsize,
    failures_to_inject: AtomicUsize,
    panics_to_inject: AtomicUsize,
    call_panics_to_inject: AtomicUsize,
    delay: Mutex<Option<Duration>>,
    gates: Mutex<HashMap<ConnectionPoolId, Arc<Notify>>>,
}

/// [`ConnectionPoolFactory`] that records and controls every creation.
///
/// Creations can be slowed down, held until released per id, or made to fail or panic.
/// Clones share their state so a test can keep a handle after moving the factory into
/// a pool cache.
#[derive(Debug, Clone, Default)]
pub struct TestPoolFactory {
    inner: Arc<Inner>,
}

impl TestPoolFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns how many times [`ConnectionPoolFactory::create_pool`] was entered.
    pub fn attempts(&self) -> usize {
        self.inner.attempts.load(Ordering::SeqCst)
    }

    /// Returns how many pools were created successfully.
    pub fn creations(&self) -> usize {
        self.inner.creations.load(Ordering::SeqCst)
    }

    /// Makes every creation sleep for `delay` before completing.
    pub async fn set_delay(&self, delay: Duration) {
        *self.inner.delay.lock().await = Some(delay);
    }

    /// Makes the next `count` creations fail with [`ErrorKind::SourceConnectionFailed`].
    pub fn fail_next(&self, count: usize) {
        self.inner.failures_to_inject.store(count, Ordering::SeqCst);
    }

    /// Makes the next `count` creations panic.
    pub fn panic_next(&self, count: usize) {
        self.inner.panics_to_inject.store(count, Ordering::SeqCst);
    }

    /// Makes the next `count` calls to [`ConnectionPoolFactory::create_pool`] panic before
    /// they return a future.
    pub fn panic_on_call_next(&self, count: usize) {
        self.inner.call_panics_to_inject.store(count, Ordering::SeqCst);
    }

    /// Holds creations for `pool_id` until [`TestPoolFactory::release`] is called.
    pub async fn hold(&self, pool_id: &ConnectionPoolId) {
        let mut gates = self.inner.gates.lock().await;
        gates.insert(pool_id.clone(), Arc::new(Notify::new()));
    }

    /// Lets a held creation for `pool_id` continue. Later creations are not held.
    pub async fn release(&self, pool_id: &ConnectionPoolId) {
        let mut gates = self.inner.gates.lock().await;
        if let Some(gate) = gates.remove(pool_id) {
            gate.notify_one();
        }
    }

    /// Waits until [`ConnectionPoolFactory::create_pool`] was entered `count` times.
    pub async fn wait_for_attempts(&self, count: usize) {
        while self.attempts() < count {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    fn take_one(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |remaining| {
                remaining.checked_sub(1)
            })
            .is_ok()
    }
}

impl ConnectionPoolFactory for TestPoolFactory {
    type Pool = TestPool;
    type Config = MongoDbSourceConfig;

    fn engine(&self) -> &'static str {
        MONGODB_ENGINE
    }

    fn create_pool(
        &self,
        pool_id: &ConnectionPoolId,
        source_config: &MongoDbSourceConfig,
    ) -> impl Future<Output = CdcResult<TestPool>> + Send {
        self.inner.attempts.fetch_add(1, Ordering::SeqCst);

        if Self::take_one(&self.inner.call_panics_to_inject) {
            panic!("injected panic while starting creation of {pool_id}");
        }

        let inner = self.inner.clone();
        let pool_id = pool_id.clone();
        let batch_size = source_config.batch_size();

        async move {
            let gate = inner.gates.lock().await.get(&pool_id).cloned();
            if let Some(gate) = gate {
                gate.notified().await;
            }

            let delay = *inner.delay.lock().await;
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }

            if Self::take_one(&inner.panics_to_inject) {
                panic!("injected panic while creating {pool_id}");
            }

            if Self::take_one(&inner.failures_to_inject) {
                bail!(
                    ErrorKind::SourceConnectionFailed,
                    "Injected connection failure",
                    format!("server selection timed out for {pool_id}")
                );
            }

            let serial = inner.creations.fetch_add(1, Ordering::SeqCst) + 1;

            Ok(TestPool {
                pool_id,
                serial,
                batch_size,
            })
        }
    }
}
