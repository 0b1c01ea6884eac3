//! Strategy-driven in-memory cache.

use super::strategy::{adaptive_score, EvictionStrategy};
use lru::LruCache;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub max_size: usize,
    pub strategy: EvictionStrategy,
    /// TTL applied by [`IntelligentCache::set`]; `None` means entries never expire.
    #[serde(rename = "default_ttl_ms", with = "crate::config::option_duration_ms")]
    pub default_ttl: Option<Duration>,
    #[serde(rename = "sweep_interval_ms", with = "crate::config::duration_ms")]
    pub sweep_interval: Duration,
    /// Upper bound for capacity growth requested by tuning directives.
    pub max_growth_size: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size: 1000,
            strategy: EvictionStrategy::Adaptive,
            default_ttl: Some(Duration::from_secs(300)),
            sweep_interval: Duration::from_secs(60),
            max_growth_size: 4000,
        }
    }
}

impl CacheConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_size(mut self, max_size: usize) -> Self {
        self.max_size = max_size;
        self
    }

    pub fn with_strategy(mut self, strategy: EvictionStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_default_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.default_ttl = ttl;
        self
    }

    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    pub fn with_max_growth_size(mut self, size: usize) -> Self {
        self.max_growth_size = size;
        self
    }
}

/// Resident entry.
#[derive(Debug, Clone)]
pub struct CacheItem<T> {
    pub key: String,
    pub value: T,
    pub inserted_at: Instant,
    /// Starts at 1 on insertion; every hit adds one.
    pub access_count: u64,
    /// Survives overwrites of the same key; dropped on delete.
    pub frequency: u64,
    pub last_accessed: Instant,
    pub ttl: Option<Duration>,
    /// Approximate size: JSON-encoded length.
    pub size: usize,
    pub priority: u32,
}

impl<T> CacheItem<T> {
    pub fn is_expired(&self) -> bool {
        self.ttl.map_or(false, |ttl| self.inserted_at.elapsed() > ttl)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct IntelligentCacheStats {
    pub size: usize,
    pub max_size: usize,
    /// `Σ(access_count - 1) / Σ access_count` over resident items.
    pub hit_rate: f64,
    pub total_accesses: u64,
    pub total_hits: u64,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub strategy: EvictionStrategy,
    pub approximate_bytes: usize,
}

struct State<T> {
    // Iteration order of LruCache is MRU first; reversed it is the access order.
    items: LruCache<String, CacheItem<T>>,
    max_size: usize,
    strategy: EvictionStrategy,
    hits: u64,
    misses: u64,
    evictions: u64,
}

impl<T> State<T> {
    fn pick_victim(&self) -> Option<String> {
        let oldest_first = || self.items.iter().rev();
        match self.strategy {
            EvictionStrategy::Lru => self.items.peek_lru().map(|(k, _)| k.clone()),
            EvictionStrategy::Lfu => oldest_first()
                .min_by_key(|(_, item)| item.frequency)
                .map(|(k, _)| k.clone()),
            EvictionStrategy::Ttl => oldest_first()
                .find(|(_, item)| item.is_expired())
                .map(|(k, _)| k.clone())
                .or_else(|| self.items.peek_lru().map(|(k, _)| k.clone())),
            EvictionStrategy::Adaptive => {
                let now = Instant::now();
                oldest_first()
                    .map(|(k, item)| {
                        let idle = now.saturating_duration_since(item.last_accessed);
                        let score = adaptive_score(
                            item.frequency,
                            item.priority,
                            idle.as_secs_f64() * 1000.0,
                        );
                        (k, score)
                    })
                    .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
                    .map(|(k, _)| k.clone())
            }
        }
    }

    fn evict_one(&mut self) -> Option<String> {
        let victim = self.pick_victim()?;
        self.items.pop(&victim);
        self.evictions += 1;
        tracing::debug!(key = %victim, strategy = %self.strategy, "cache item evicted");
        Some(victim)
    }

    fn purge_expired(&mut self) -> usize {
        let expired: Vec<String> = self
            .items
            .iter()
            .filter(|(_, item)| item.is_expired())
            .map(|(k, _)| k.clone())
            .collect();
        for key in &expired {
            self.items.pop(key);
        }
        expired.len()
    }
}

/// Generic key/value cache with pluggable eviction.
///
/// Resident item count never exceeds `max_size`.
pub struct IntelligentCache<T> {
    default_ttl: Option<Duration>,
    max_growth_size: usize,
    state: Mutex<State<T>>,
}

impl<T> IntelligentCache<T>
where
    T: Clone + Serialize + Send + 'static,
{
    pub fn new(config: CacheConfig) -> Self {
        let max_size = config.max_size.max(1);
        Self {
            default_ttl: config.default_ttl,
            max_growth_size: config.max_growth_size.max(max_size),
            state: Mutex::new(State {
                items: LruCache::unbounded(),
                max_size,
                strategy: config.strategy,
                hits: 0,
                misses: 0,
                evictions: 0,
            }),
        }
    }

    pub fn with_capacity(max_size: usize, strategy: EvictionStrategy) -> Self {
        Self::new(
            CacheConfig::default()
                .with_max_size(max_size)
                .with_strategy(strategy),
        )
    }

    fn lock(&self) -> MutexGuard<'_, State<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Expired entries read as absent and are removed.
    pub fn get(&self, key: &str) -> Option<T> {
        let mut st = self.lock();
        let expired = match st.items.peek(key) {
            None => {
                st.misses += 1;
                return None;
            }
            Some(item) => item.is_expired(),
        };
        if expired {
            st.items.pop(key);
            st.misses += 1;
            tracing::debug!(key = %key, "cache item expired");
            return None;
        }
        st.hits += 1;
        let item = st.items.get_mut(key)?;
        item.access_count += 1;
        item.frequency += 1;
        item.last_accessed = Instant::now();
        Some(item.value.clone())
    }

    /// Insert with the configured default TTL and priority 1.
    pub fn set(&self, key: impl Into<String>, value: T) {
        self.set_with_ttl(key, value, self.default_ttl, 1);
    }

    pub fn set_with_ttl(
        &self,
        key: impl Into<String>,
        value: T,
        ttl: Option<Duration>,
        priority: u32,
    ) {
        let key = key.into();
        let size = serde_json::to_vec(&value).map(|v| v.len()).unwrap_or(1);
        let mut st = self.lock();

        let previous_frequency = st.items.peek(&key).map(|i| i.frequency);
        if previous_frequency.is_none() && st.items.len() >= st.max_size {
            st.evict_one();
        }

        let now = Instant::now();
        let item = CacheItem {
            key: key.clone(),
            value,
            inserted_at: now,
            access_count: 1,
            frequency: previous_frequency.unwrap_or(0) + 1,
            last_accessed: now,
            ttl,
            size,
            priority: priority.max(1),
        };
        tracing::debug!(key = %key, size, ttl_ms = ttl.map(|t| t.as_millis() as u64), "cache item set");
        st.items.put(key, item);
    }

    pub fn delete(&self, key: &str) -> bool {
        self.lock().items.pop(key).is_some()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.lock()
            .items
            .peek(key)
            .map_or(false, |item| !item.is_expired())
    }

    /// Drops every item; counters are kept.
    pub fn clear(&self) {
        self.lock().items.clear();
    }

    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn purge_expired(&self) -> usize {
        let removed = self.lock().purge_expired();
        if removed > 0 {
            tracing::debug!(removed, "expired cache items purged");
        }
        removed
    }

    /// Change capacity; shrinking evicts by the current strategy until it fits.
    pub fn resize(&self, max_size: usize) {
        let mut st = self.lock();
        st.max_size = max_size.max(1);
        while st.items.len() > st.max_size {
            if st.evict_one().is_none() {
                break;
            }
        }
        tracing::info!(max_size = st.max_size, "cache resized");
    }

    pub fn max_size(&self) -> usize {
        self.lock().max_size
    }

    pub fn max_growth_size(&self) -> usize {
        self.max_growth_size
    }

    pub fn strategy(&self) -> EvictionStrategy {
        self.lock().strategy
    }

    pub fn set_strategy(&self, strategy: EvictionStrategy) {
        let mut st = self.lock();
        if st.strategy != strategy {
            tracing::info!(from = %st.strategy, to = %strategy, "cache strategy changed");
            st.strategy = strategy;
        }
    }

    pub fn stats(&self) -> IntelligentCacheStats {
        let st = self.lock();
        let (total_accesses, total_hits, bytes) =
            st.items
                .iter()
                .fold((0u64, 0u64, 0usize), |(acc, hits, bytes), (_, item)| {
                    (
                        acc + item.access_count,
                        hits + item.access_count.saturating_sub(1),
                        bytes + item.size,
                    )
                });
        IntelligentCacheStats {
            size: st.items.len(),
            max_size: st.max_size,
            hit_rate: if total_accesses > 0 {
                total_hits as f64 / total_accesses as f64
            } else {
                0.0
            },
            total_accesses,
            total_hits,
            hits: st.hits,
            misses: st.misses,
            evictions: st.evictions,
            strategy: st.strategy,
            approximate_bytes: bytes,
        }
    }
}

impl<T> IntelligentCache<T>
where
    T: Clone + Serialize + Send + Sync + 'static,
{
    /// Purge expired entries every `interval` until `token` is cancelled.
    pub fn spawn_ttl_sweep(
        self: &Arc<Self>,
        interval: Duration,
        token: CancellationToken,
    ) -> JoinHandle<()> {
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            let start = tokio::time::Instant::now() + interval;
            let mut ticker = tokio::time::interval_at(start, interval);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        cache.purge_expired();
                    }
                }
            }
        })
    }
}

impl<T> Default for IntelligentCache<T>
where
    T: Clone + Serialize + Send + 'static,
{
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}
