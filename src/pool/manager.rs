//! Named resource pools.

use super::factory::ResourceFactory;
use crate::{Error, Result};
use serde::Serialize;
use std::collections::HashMap;
use std::ops::Deref;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

/// A resource checked out of a pool. Hand it back with [`ResourcePoolManager::release`].
pub struct Lease<T> {
    id: u64,
    pool_instance: u64,
    pool: String,
    resource: Arc<T>,
}

impl<T> Lease<T> {
    pub fn pool(&self) -> &str {
        &self.pool
    }

    pub fn resource(&self) -> &Arc<T> {
        &self.resource
    }
}

impl<T> Deref for Lease<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.resource
    }
}

impl<T> std::fmt::Debug for Lease<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lease")
            .field("id", &self.id)
            .field("pool", &self.pool)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PoolStats {
    pub name: String,
    pub max_size: usize,
    pub current_size: usize,
    pub available: usize,
    pub in_use: usize,
    /// `in_use / current_size`, zero for an empty pool.
    pub utilization_rate: f64,
}

struct PoolState<T> {
    available: Vec<Arc<T>>,
    in_use: HashMap<u64, Arc<T>>,
    // Counts available + in use + resources being validated or created.
    current_size: usize,
    max_size: usize,
    next_lease: u64,
}

struct Pool<T> {
    name: String,
    instance: u64,
    initial_max: usize,
    factory: Arc<dyn ResourceFactory<T>>,
    state: Mutex<PoolState<T>>,
}

impl<T> Pool<T> {
    fn lock(&self) -> MutexGuard<'_, PoolState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lease(&self, resource: Arc<T>) -> Lease<T> {
        let mut st = self.lock();
        let id = st.next_lease;
        st.next_lease += 1;
        st.in_use.insert(id, resource.clone());
        Lease {
            id,
            pool_instance: self.instance,
            pool: self.name.clone(),
            resource,
        }
    }

    fn stats(&self) -> PoolStats {
        let st = self.lock();
        PoolStats {
            name: self.name.clone(),
            max_size: st.max_size,
            current_size: st.current_size,
            available: st.available.len(),
            in_use: st.in_use.len(),
            utilization_rate: if st.current_size > 0 {
                st.in_use.len() as f64 / st.current_size as f64
            } else {
                0.0
            },
        }
    }
}

/// Bounded pools of expensive resources, addressed by name.
///
/// Per pool, `in_use + available <= current_size <= max_size` holds at all times.
/// `acquire` never waits: a full pool yields `None`.
pub struct ResourcePoolManager<T> {
    pools: RwLock<HashMap<String, Arc<Pool<T>>>>,
    instances: AtomicU64,
}

impl<T> ResourcePoolManager<T>
where
    T: Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            pools: RwLock::new(HashMap::new()),
            instances: AtomicU64::new(0),
        }
    }

    fn pool(&self, name: &str) -> Result<Arc<Pool<T>>> {
        self.pools
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
            .ok_or_else(|| Error::UnknownPool(name.to_string()))
    }

    pub fn create_pool(
        &self,
        name: &str,
        max_size: usize,
        factory: Arc<dyn ResourceFactory<T>>,
    ) -> Result<()> {
        let max_size = max_size.max(1);
        let mut pools = self.pools.write().unwrap_or_else(PoisonError::into_inner);
        if pools.contains_key(name) {
            return Err(Error::DuplicatePool(name.to_string()));
        }
        let pool = Pool {
            name: name.to_string(),
            instance: self.instances.fetch_add(1, Ordering::Relaxed),
            initial_max: max_size,
            factory,
            state: Mutex::new(PoolState {
                available: Vec::new(),
                in_use: HashMap::new(),
                current_size: 0,
                max_size,
                next_lease: 0,
            }),
        };
        pools.insert(name.to_string(), Arc::new(pool));
        tracing::info!(pool = %name, max_size, "resource pool created");
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.pools
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }

    /// Reuse a valid idle resource, else create one if below capacity.
    ///
    /// `Ok(None)` when the pool is full or construction failed.
    pub async fn acquire(&self, name: &str) -> Result<Option<Lease<T>>> {
        let pool = self.pool(name)?;

        loop {
            let candidate = pool.lock().available.pop();
            let Some(resource) = candidate else {
                break;
            };
            if pool.factory.validate(&resource) {
                return Ok(Some(pool.lease(resource)));
            }
            pool.factory.destroy(&resource).await;
            let mut st = pool.lock();
            st.current_size = st.current_size.saturating_sub(1);
            tracing::debug!(pool = %name, current_size = st.current_size, "invalid idle resource destroyed");
        }

        let reserved = {
            let mut st = pool.lock();
            if st.current_size < st.max_size {
                st.current_size += 1;
                true
            } else {
                false
            }
        };
        if !reserved {
            tracing::debug!(pool = %name, "resource pool exhausted");
            return Ok(None);
        }

        match pool.factory.create().await {
            Ok(resource) => {
                let lease = pool.lease(Arc::new(resource));
                tracing::debug!(pool = %name, current_size = pool.lock().current_size, "new resource created");
                Ok(Some(lease))
            }
            Err(e) => {
                let mut st = pool.lock();
                st.current_size = st.current_size.saturating_sub(1);
                tracing::error!(pool = %name, error = %e, "failed to create resource");
                Ok(None)
            }
        }
    }

    /// Return a lease; invalid resources are destroyed instead of pooled.
    pub async fn release(&self, lease: Lease<T>) -> Result<()> {
        let pool = self.pool(&lease.pool)?;
        let tracked = if pool.instance == lease.pool_instance {
            pool.lock().in_use.remove(&lease.id)
        } else {
            None
        };
        let Some(resource) = tracked else {
            tracing::warn!(pool = %lease.pool, "attempted to release a resource the pool does not track");
            return Ok(());
        };

        if pool.factory.validate(&resource) {
            pool.lock().available.push(resource);
            return Ok(());
        }
        pool.factory.destroy(&resource).await;
        let mut st = pool.lock();
        st.current_size = st.current_size.saturating_sub(1);
        tracing::debug!(pool = %lease.pool, current_size = st.current_size, "invalid resource destroyed on release");
        Ok(())
    }

    pub fn pool_stats(&self, name: &str) -> Option<PoolStats> {
        self.pools
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .map(|p| p.stats())
    }

    pub fn pool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .pools
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// Destroy every idle and leased resource, then forget the pool.
    ///
    /// Outstanding leases become untracked; releasing them later is an `UnknownPool` error.
    pub async fn destroy_pool(&self, name: &str) -> bool {
        let Some(pool) = self
            .pools
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name)
        else {
            return false;
        };
        let doomed: Vec<Arc<T>> = {
            let mut st = pool.lock();
            let mut all: Vec<Arc<T>> = st.available.drain(..).collect();
            all.extend(st.in_use.drain().map(|(_, r)| r));
            st.current_size = 0;
            all
        };
        for resource in &doomed {
            pool.factory.destroy(resource).await;
        }
        tracing::info!(pool = %name, destroyed = doomed.len(), "resource pool destroyed");
        true
    }

    /// Change a pool's capacity, destroying surplus idle resources.
    ///
    /// Capacity never drops below the number of leased resources; the applied
    /// capacity is returned.
    pub async fn resize_pool(&self, name: &str, max_size: usize) -> Result<usize> {
        let pool = self.pool(name)?;
        let (applied, surplus) = {
            let mut st = pool.lock();
            let floor = st.in_use.len().max(1);
            let applied = max_size.max(floor);
            st.max_size = applied;
            let mut surplus = Vec::new();
            while st.current_size > applied {
                match st.available.pop() {
                    Some(r) => {
                        surplus.push(r);
                        st.current_size -= 1;
                    }
                    None => break,
                }
            }
            (applied, surplus)
        };
        for resource in &surplus {
            pool.factory.destroy(resource).await;
        }
        tracing::info!(pool = %name, max_size = applied, destroyed = surplus.len(), "resource pool resized");
        Ok(applied)
    }

    /// Raise every pool to twice its initial capacity. Returns how many pools grew.
    pub fn expand_all(&self) -> usize {
        let pools: Vec<Arc<Pool<T>>> = self
            .pools
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        let mut grown = 0;
        for pool in pools {
            let ceiling = pool.initial_max.saturating_mul(2);
            let mut st = pool.lock();
            if st.max_size < ceiling {
                st.max_size = ceiling;
                grown += 1;
                tracing::info!(pool = %pool.name, max_size = ceiling, "resource pool expanded");
            }
        }
        grown
    }
}

impl<T> Default for ResourcePoolManager<T>
where
    T: Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::FnFactory;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize};

    #[derive(Debug)]
    struct Conn {
        id: usize,
        alive: AtomicBool,
    }

    #[derive(Default)]
    struct ConnFactory {
        created: AtomicUsize,
        destroyed: AtomicUsize,
        fail: AtomicBool,
    }

    #[async_trait]
    impl ResourceFactory<Conn> for ConnFactory {
        async fn create(&self) -> anyhow::Result<Conn> {
            if self.fail.load(Ordering::SeqCst) {
                anyhow::bail!("connect refused");
            }
            let id = self.created.fetch_add(1, Ordering::SeqCst);
            Ok(Conn {
                id,
                alive: AtomicBool::new(true),
            })
        }

        fn validate(&self, conn: &Conn) -> bool {
            conn.alive.load(Ordering::SeqCst)
        }

        async fn destroy(&self, _conn: &Conn) {
            self.destroyed.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn manager(max: usize) -> (ResourcePoolManager<Conn>, Arc<ConnFactory>) {
        let factory = Arc::new(ConnFactory::default());
        let mgr = ResourcePoolManager::new();
        mgr.create_pool("db", max, factory.clone()).unwrap();
        (mgr, factory)
    }

    #[tokio::test]
    async fn test_capacity_is_never_exceeded() {
        let (mgr, _) = manager(3);
        let mut leases = Vec::new();
        for _ in 0..3 {
            leases.push(mgr.acquire("db").await.unwrap().unwrap());
        }
        assert!(mgr.acquire("db").await.unwrap().is_none());
        let stats = mgr.pool_stats("db").unwrap();
        assert_eq!(stats.current_size, 3);
        assert_eq!(stats.in_use, 3);
        assert!((stats.utilization_rate - 1.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_release_makes_resource_reusable() {
        let (mgr, factory) = manager(1);
        let lease = mgr.acquire("db").await.unwrap().unwrap();
        let first_id = lease.resource().id;
        mgr.release(lease).await.unwrap();
        let again = mgr.acquire("db").await.unwrap().unwrap();
        assert_eq!(first_id, 0);
        assert_eq!(again.resource().id, 0);
        assert_eq!(factory.created.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_invalid_idle_resource_is_replaced() {
        let (mgr, factory) = manager(1);
        let lease = mgr.acquire("db").await.unwrap().unwrap();
        let conn = lease.resource().clone();
        mgr.release(lease).await.unwrap();
        conn.alive.store(false, Ordering::SeqCst);

        let fresh = mgr.acquire("db").await.unwrap().unwrap();
        assert_eq!(fresh.resource().id, 1);
        assert_eq!(factory.destroyed.load(Ordering::SeqCst), 1);
        assert_eq!(mgr.pool_stats("db").unwrap().current_size, 1);
    }

    #[tokio::test]
    async fn test_invalid_resource_destroyed_on_release() {
        let (mgr, factory) = manager(2);
        let lease = mgr.acquire("db").await.unwrap().unwrap();
        lease.alive.store(false, Ordering::SeqCst);
        mgr.release(lease).await.unwrap();
        let stats = mgr.pool_stats("db").unwrap();
        assert_eq!(stats.current_size, 0);
        assert_eq!(stats.available, 0);
        assert_eq!(factory.destroyed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_create_failure_yields_none_and_frees_slot() {
        let (mgr, factory) = manager(1);
        factory.fail.store(true, Ordering::SeqCst);
        assert!(mgr.acquire("db").await.unwrap().is_none());
        assert_eq!(mgr.pool_stats("db").unwrap().current_size, 0);
        factory.fail.store(false, Ordering::SeqCst);
        assert!(mgr.acquire("db").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_unknown_pool_is_a_contract_violation() {
        let (mgr, factory) = manager(1);
        assert!(matches!(
            mgr.acquire("nope").await,
            Err(Error::UnknownPool(name)) if name == "nope"
        ));
        assert!(matches!(
            mgr.create_pool("db", 1, factory),
            Err(Error::DuplicatePool(_))
        ));
        assert!(mgr.pool_stats("nope").is_none());
    }

    #[tokio::test]
    async fn test_destroy_pool_destroys_everything() {
        let (mgr, factory) = manager(3);
        let a = mgr.acquire("db").await.unwrap().unwrap();
        let b = mgr.acquire("db").await.unwrap().unwrap();
        mgr.release(a).await.unwrap();
        assert!(mgr.destroy_pool("db").await);
        assert_eq!(factory.destroyed.load(Ordering::SeqCst), 2);
        assert!(!mgr.contains("db"));
        assert!(matches!(mgr.release(b).await, Err(Error::UnknownPool(_))));
        assert!(!mgr.destroy_pool("db").await);
    }

    #[tokio::test]
    async fn test_stale_lease_from_recreated_pool_is_ignored() {
        let (mgr, factory) = manager(2);
        let stale = mgr.acquire("db").await.unwrap().unwrap();
        mgr.destroy_pool("db").await;
        mgr.create_pool("db", 2, factory).unwrap();
        let _fresh = mgr.acquire("db").await.unwrap().unwrap();
        mgr.release(stale).await.unwrap();
        let stats = mgr.pool_stats("db").unwrap();
        assert_eq!(stats.in_use, 1);
        assert_eq!(stats.available, 0);
    }

    #[tokio::test]
    async fn test_resize_and_expand() {
        let (mgr, factory) = manager(4);
        let mut leases = Vec::new();
        for _ in 0..4 {
            leases.push(mgr.acquire("db").await.unwrap().unwrap());
        }
        let keep = leases.pop().unwrap();
        for lease in leases {
            mgr.release(lease).await.unwrap();
        }
        // One leased: shrinking to 0 clamps at 1 and destroys the idle three.
        assert_eq!(mgr.resize_pool("db", 0).await.unwrap(), 1);
        assert_eq!(factory.destroyed.load(Ordering::SeqCst), 3);
        let stats = mgr.pool_stats("db").unwrap();
        assert_eq!((stats.current_size, stats.max_size), (1, 1));

        mgr.release(keep).await.unwrap();
        assert_eq!(mgr.expand_all(), 1);
        assert_eq!(mgr.pool_stats("db").unwrap().max_size, 8);
        assert_eq!(mgr.expand_all(), 0);
    }

    #[tokio::test]
    async fn test_closure_factory() {
        let mgr: ResourcePoolManager<String> = ResourcePoolManager::new();
        let factory = FnFactory::new(|| async { Ok::<_, anyhow::Error>("conn".to_string()) })
            .with_validator(|s: &String| !s.is_empty());
        mgr.create_pool("strings", 1, Arc::new(factory)).unwrap();
        let lease = mgr.acquire("strings").await.unwrap().unwrap();
        assert_eq!(lease.as_str(), "conn");
        assert_eq!(lease.pool(), "strings");
    }
}
