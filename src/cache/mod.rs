//! 智能缓存模块：支持 LRU、LFU、TTL 与自适应淘汰策略的泛型内存缓存。
//!
//! # Intelligent Caching Module
//!
//! A generic in-process key/value cache whose eviction policy is chosen at
//! construction and can be switched at runtime by tuning directives.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`IntelligentCache`] | Bounded cache with per-item TTL and priority |
//! | [`CacheConfig`] | Capacity, strategy, default TTL and sweep interval |
//! | [`EvictionStrategy`] | LRU, LFU, TTL or Adaptive victim selection |
//! | [`IntelligentCacheStats`] | Size, capacity and hit-rate snapshot |
//!
//! ## Example
//!
//! ```rust
//! use adaptive_resilience::cache::{CacheConfig, EvictionStrategy, IntelligentCache};
//! use std::time::Duration;
//!
//! let cache: IntelligentCache<String> = IntelligentCache::new(
//!     CacheConfig::new()
//!         .with_max_size(2)
//!         .with_strategy(EvictionStrategy::Lru),
//! );
//! cache.set("a", "1".to_string());
//! cache.set_with_ttl("b", "2".to_string(), Some(Duration::from_secs(1)), 5);
//! assert_eq!(cache.get("a").as_deref(), Some("1"));
//! cache.set("c", "3".to_string()); // evicts "b", the least recently used
//! assert!(cache.get("b").is_none());
//! ```
//!
//! ## Hit Rate
//!
//! Every item starts with one access when it is set; each later `get` counts as
//! a hit. The reported hit rate is `Σ(access_count - 1) / Σ access_count` over
//! resident items, alongside plain hit/miss counters.

mod intelligent;
mod strategy;

pub use intelligent::{CacheConfig, CacheItem, IntelligentCache, IntelligentCacheStats};
pub use strategy::{adaptive_score, EvictionStrategy};
