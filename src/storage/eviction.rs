//! Approximate eviction.
//!
//! Exact LRU/LFU needs per-access bookkeeping on a global order. Instead, we
//! sample a handful of random keys, score them, and keep the best victims in a
//! small sorted pool that survives between eviction passes. Over time the pool
//! converges on keys that really are cold, at O(sample size) cost per refill.
//!
//! ```text
//!  sample 5 random keys ──► score ──► merge into pool (cap 16, sorted asc)
//!                                          │
//!                        evict from front ◄┘  (lowest score = coldest)
//! ```

use bytes::Bytes;
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;

/// Which keys to reclaim when the key budget is exceeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EvictionPolicy {
    /// Never evict; writes that would create a key are rejected when full.
    #[serde(rename = "noeviction")]
    NoEviction,
    /// Evict uniformly random keys.
    #[default]
    AllkeysRandom,
    /// Evict the least recently used of a random sample.
    AllkeysLru,
    /// Evict the least frequently used of a random sample.
    AllkeysLfu,
}

impl EvictionPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            EvictionPolicy::NoEviction => "noeviction",
            EvictionPolicy::AllkeysRandom => "allkeys-random",
            EvictionPolicy::AllkeysLru => "allkeys-lru",
            EvictionPolicy::AllkeysLfu => "allkeys-lfu",
        }
    }

    /// True for the policies that rank candidates through the pool.
    pub fn uses_pool(&self) -> bool {
        matches!(self, EvictionPolicy::AllkeysLru | EvictionPolicy::AllkeysLfu)
    }
}

impl fmt::Display for EvictionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown eviction policy '{0}'")]
pub struct UnknownPolicy(pub String);

impl FromStr for EvictionPolicy {
    type Err = UnknownPolicy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "noeviction" => Ok(EvictionPolicy::NoEviction),
            "allkeys-random" => Ok(EvictionPolicy::AllkeysRandom),
            "allkeys-lru" => Ok(EvictionPolicy::AllkeysLru),
            "allkeys-lfu" => Ok(EvictionPolicy::AllkeysLfu),
            _ => Err(UnknownPolicy(s.to_string())),
        }
    }
}

/// A sampled key and its eviction score. Lower scores are evicted first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolItem {
    pub key: Bytes,
    pub score: u64,
}

/// Bounded, score-ordered set of eviction candidates.
#[derive(Debug, Clone)]
pub struct EvictionPool {
    capacity: usize,
    /// Sorted ascending by score; ties keep insertion order
    items: Vec<PoolItem>,
}

impl EvictionPool {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            items: Vec::with_capacity(capacity + 1),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.items.len() >= self.capacity
    }

    pub fn contains(&self, key: &[u8]) -> bool {
        self.items.iter().any(|item| item.key == key)
    }

    /// Inserts a candidate in score order.
    ///
    /// Keys already pooled are ignored. When the pool overflows, the highest
    /// score (the least attractive victim) is dropped.
    pub fn push(&mut self, key: Bytes, score: u64) {
        if self.contains(&key) {
            return;
        }
        let pos = self.items.partition_point(|item| item.score <= score);
        self.items.insert(pos, PoolItem { key, score });
        if self.items.len() > self.capacity {
            self.items.pop();
        }
    }

    /// Removes and returns the best victim.
    pub fn pop_best(&mut self) -> Option<PoolItem> {
        if self.items.is_empty() {
            None
        } else {
            Some(self.items.remove(0))
        }
    }

    pub fn remove(&mut self, key: &[u8]) {
        self.items.retain(|item| item.key != key);
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &PoolItem> {
        self.items.iter()
    }
}
