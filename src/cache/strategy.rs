use serde::{Deserialize, Serialize};
use std::fmt;

/// Which resident item gives way when the cache is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvictionStrategy {
    /// Least recently touched.
    Lru,
    /// Lowest cumulative access frequency.
    Lfu,
    /// First expired item, else least recently touched.
    Ttl,
    /// Lowest `(frequency * priority) / (ms_since_access + 1)`.
    #[default]
    Adaptive,
}

impl EvictionStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Lru => "lru",
            Self::Lfu => "lfu",
            Self::Ttl => "ttl",
            Self::Adaptive => "adaptive",
        }
    }
}

impl fmt::Display for EvictionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Eviction score of the adaptive strategy. Lower is evicted first.
///
/// The blend of frequency, priority and recency is a heuristic; callers that
/// need a different balance can weight `priority` at insertion time.
#[inline]
pub fn adaptive_score(frequency: u64, priority: u32, ms_since_access: f64) -> f64 {
    (frequency as f64 * priority as f64) / (ms_since_access + 1.0)
}
