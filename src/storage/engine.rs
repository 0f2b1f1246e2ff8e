//! Key-space engine with expiry and approximate eviction.
//!
//! The engine is owned by the event loop thread and every operation takes
//! `&mut self`; there are no locks anywhere in the storage layer.
//!
//! ## Layout
//!
//! ```text
//! ┌──────────────────────────── StorageEngine ───────────────────────────┐
//! │  data:     SampledMap<Entry>   every live key, O(1) random sample    │
//! │  volatile: SampledMap<()>      keys carrying a TTL                   │
//! │  sketch:   CountMinSketch      access frequencies (LFU scores)       │
//! │  pool:     EvictionPool        best eviction candidates so far       │
//! │  clock:    u64                 logical access tick (LRU scores)      │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Expiry
//!
//! Lookups check the deadline first and delete stale entries on the spot
//! (passive expiry), so an expired value is never returned. The event loop
//! also calls [`StorageEngine::sweep_expired`] periodically, which samples
//! TTL-bearing keys and deletes the expired ones (active expiry).

use crate::storage::eviction::{EvictionPolicy, EvictionPool};
use crate::storage::sampled::SampledMap;
use crate::storage::sketch::CountMinSketch;
use bytes::Bytes;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, trace};

/// Keys sampled per active-expiry round.
pub const ACTIVE_EXPIRE_SAMPLE: usize = 20;

/// Upper bound on rounds per `sweep_expired` call.
pub const ACTIVE_EXPIRE_MAX_ROUNDS: usize = 16;

/// Errors surfaced by write operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// The key budget is exhausted and eviction could not make room
    #[error("max keys reached and no key could be evicted")]
    OutOfCapacity,

    /// INCR on a value that is not a base-10 i64
    #[error("value is not an integer or out of range")]
    NotAnInteger,

    /// INCR would overflow i64
    #[error("increment or decrement would overflow")]
    Overflow,

    /// The TTL puts the deadline past what the clock can represent
    #[error("invalid expire time")]
    InvalidExpireTime,
}

/// Tunables for the key-space.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Eviction starts once the key count exceeds this
    pub max_keys: usize,
    /// Fraction of keys reclaimed per eviction pass
    pub eviction_ratio: f64,
    pub eviction_policy: EvictionPolicy,
    /// Capacity of the eviction candidate pool
    pub pool_size: usize,
    /// Keys sampled per pool refill
    pub sample_size: usize,
    /// Relative error of the frequency sketch
    pub sketch_error_rate: f64,
    /// Failure probability of the frequency sketch
    pub sketch_failure_prob: f64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            max_keys: 1_000_000,
            eviction_ratio: 0.1,
            eviction_policy: EvictionPolicy::AllkeysRandom,
            pool_size: 16,
            sample_size: 5,
            sketch_error_rate: 0.001,
            sketch_failure_prob: 0.01,
        }
    }
}

/// A stored value and its metadata.
#[derive(Debug, Clone)]
pub struct Entry {
    pub value: Bytes,
    /// Absolute deadline; `None` never expires
    pub expires_at: Option<Instant>,
    /// Logical tick of the last access
    pub last_access: u64,
}

impl Entry {
    #[inline]
    pub fn is_expired_at(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|exp| now >= exp)
    }

    #[inline]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Instant::now())
    }

    /// Remaining time to live, or `None` without a deadline.
    pub fn ttl(&self) -> Option<Duration> {
        self.expires_at
            .map(|exp| exp.saturating_duration_since(Instant::now()))
    }
}

/// Operation counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StorageStats {
    /// Keys currently stored (expired-but-unswept included)
    pub keys: u64,
    /// Keys carrying a TTL
    pub expires: u64,
    pub get_ops: u64,
    pub set_ops: u64,
    pub del_ops: u64,
    /// Keys removed by passive or active expiry
    pub expired: u64,
    /// Keys removed by eviction
    pub evicted: u64,
}

/// The key-space.
///
/// # Example
///
/// ```
/// use emberkv::storage::StorageEngine;
/// use bytes::Bytes;
/// use std::time::Duration;
///
/// let mut engine = StorageEngine::new();
/// engine.set(Bytes::from("name"), Bytes::from("ember")).unwrap();
/// assert_eq!(engine.get(b"name"), Some(Bytes::from("ember")));
///
/// engine
///     .set_with_ttl(Bytes::from("session"), Bytes::from("abc"), Duration::ZERO)
///     .unwrap();
/// assert_eq!(engine.get(b"session"), None);
/// ```
pub struct StorageEngine {
    data: SampledMap<Entry>,
    volatile: SampledMap<()>,
    sketch: CountMinSketch,
    pool: EvictionPool,
    config: StorageConfig,
    rng: StdRng,
    clock: u64,
    stats: StorageStats,
}

impl std::fmt::Debug for StorageEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageEngine")
            .field("keys", &self.data.len())
            .field("volatile", &self.volatile.len())
            .field("policy", &self.config.eviction_policy)
            .field("max_keys", &self.config.max_keys)
            .finish()
    }
}

impl Default for StorageEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageEngine {
    pub fn new() -> Self {
        Self::with_config(StorageConfig::default())
    }

    pub fn with_config(config: StorageConfig) -> Self {
        Self::build(config, StdRng::from_entropy())
    }

    /// Like [`with_config`](Self::with_config) but with reproducible sampling.
    pub fn with_seed(config: StorageConfig, seed: u64) -> Self {
        Self::build(config, StdRng::seed_from_u64(seed))
    }

    fn build(config: StorageConfig, rng: StdRng) -> Self {
        Self {
            data: SampledMap::default(),
            volatile: SampledMap::default(),
            sketch: CountMinSketch::with_error(config.sketch_error_rate, config.sketch_failure_prob),
            pool: EvictionPool::new(config.pool_size),
            config,
            rng,
            clock: 0,
            stats: StorageStats::default(),
        }
    }

    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    pub fn sketch(&self) -> &CountMinSketch {
        &self.sketch
    }

    // ========================================================================
    // Internal helpers
    // ========================================================================

    #[inline]
    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    fn remove_entry(&mut self, key: &[u8]) -> Option<Entry> {
        let entry = self.data.remove(key)?;
        if entry.expires_at.is_some() {
            self.volatile.remove(key);
        }
        self.pool.remove(key);
        Some(entry)
    }

    /// Deletes `key` if its deadline has passed. Returns true if it did.
    fn expire_if_stale(&mut self, key: &[u8]) -> bool {
        let stale = self.data.get(key).is_some_and(Entry::is_expired);
        if stale {
            self.remove_entry(key);
            self.stats.expired += 1;
            trace!(key = ?Bytes::copy_from_slice(key), "passively expired");
        }
        stale
    }

    fn record_access(&mut self, key: &[u8]) {
        let tick = self.tick();
        if let Some(entry) = self.data.get_mut(key) {
            entry.last_access = tick;
            self.sketch.increment_by(key, 1);
        }
    }

    fn write(
        &mut self,
        key: Bytes,
        value: Bytes,
        expires_at: Option<Instant>,
    ) -> Result<bool, StorageError> {
        self.stats.set_ops += 1;
        self.expire_if_stale(&key);

        let is_new = !self.data.contains_key(&key);
        if is_new {
            self.make_room()?;
        }

        match expires_at {
            Some(_) => {
                self.volatile.insert(key.clone(), ());
            }
            None if !is_new => {
                self.volatile.remove(&key);
            }
            None => {}
        }

        let last_access = self.tick();
        self.sketch.increment_by(&key, 1);
        self.data.insert(
            key,
            Entry {
                value,
                expires_at,
                last_access,
            },
        );
        Ok(is_new)
    }

    /// Ensures there is room for one more key.
    fn make_room(&mut self) -> Result<(), StorageError> {
        let max = self.config.max_keys;
        if self.data.len() < max {
            return Ok(());
        }
        if self.config.eviction_policy != EvictionPolicy::NoEviction && max > 0 {
            self.evict(max - 1);
        }
        if self.data.len() < max {
            Ok(())
        } else {
            Err(StorageError::OutOfCapacity)
        }
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Gets a value, counting the lookup as an access.
    pub fn get(&mut self, key: &[u8]) -> Option<Bytes> {
        self.stats.get_ops += 1;
        if self.expire_if_stale(key) {
            return None;
        }
        let value = self.data.get(key)?.value.clone();
        self.record_access(key);
        Some(value)
    }

    /// Gets the entry with its metadata, without counting an access.
    pub fn get_entry(&mut self, key: &[u8]) -> Option<&Entry> {
        if self.expire_if_stale(key) {
            return None;
        }
        self.data.get(key)
    }

    /// Records an access without reading the value.
    ///
    /// Returns false if the key does not exist.
    pub fn touch(&mut self, key: &[u8]) -> bool {
        if self.expire_if_stale(key) || !self.data.contains_key(key) {
            return false;
        }
        self.record_access(key);
        true
    }

    pub fn exists(&mut self, key: &[u8]) -> bool {
        !self.expire_if_stale(key) && self.data.contains_key(key)
    }

    pub fn exists_many(&mut self, keys: &[Bytes]) -> u64 {
        keys.iter().filter(|k| self.exists(k)).count() as u64
    }

    /// Seconds to live: `Some(-1)` without expiry, `None` if missing.
    pub fn ttl(&mut self, key: &[u8]) -> Option<i64> {
        self.get_entry(key)
            .map(|e| e.ttl().map_or(-1, |d| ((d.as_millis() + 500) / 1000) as i64))
    }

    /// Milliseconds to live: `Some(-1)` without expiry, `None` if missing.
    pub fn pttl(&mut self, key: &[u8]) -> Option<i64> {
        self.get_entry(key)
            .map(|e| e.ttl().map_or(-1, |d| d.as_millis() as i64))
    }

    /// Returns all live keys matching a glob pattern.
    ///
    /// Supports `*`, `?`, `[abc]`, `[^a-z]` and `\` escapes. Scans every key.
    pub fn keys(&self, pattern: &str) -> Vec<Bytes> {
        let now = Instant::now();
        self.data
            .iter()
            .filter(|(_, entry)| !entry.is_expired_at(now))
            .filter(|(key, _)| glob_match(pattern.as_bytes(), key))
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// Number of stored keys, including expired keys not yet reclaimed.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn stats(&self) -> StorageStats {
        StorageStats {
            keys: self.data.len() as u64,
            expires: self.volatile.len() as u64,
            ..self.stats
        }
    }

    // ========================================================================
    // Writes
    // ========================================================================

    /// Sets a value without expiry, clearing any previous TTL.
    ///
    /// Returns true if the key was created.
    pub fn set(&mut self, key: Bytes, value: Bytes) -> Result<bool, StorageError> {
        self.write(key, value, None)
    }

    /// Sets a value that expires after `ttl`. A zero TTL is already expired.
    pub fn set_with_ttl(
        &mut self,
        key: Bytes,
        value: Bytes,
        ttl: Duration,
    ) -> Result<bool, StorageError> {
        let deadline = Self::deadline(ttl)?;
        self.write(key, value, Some(deadline))
    }

    pub fn delete(&mut self, key: &[u8]) -> bool {
        self.stats.del_ops += 1;
        if self.expire_if_stale(key) {
            return false;
        }
        self.remove_entry(key).is_some()
    }

    pub fn delete_many(&mut self, keys: &[Bytes]) -> u64 {
        keys.iter().filter(|k| self.delete(k)).count() as u64
    }

    /// Sets a deadline on an existing key. Returns false if it does not exist.
    pub fn expire(&mut self, key: &[u8], ttl: Duration) -> Result<bool, StorageError> {
        let deadline = Self::deadline(ttl)?;
        if self.expire_if_stale(key) {
            return Ok(false);
        }
        let Some(entry) = self.data.get_mut(key) else {
            return Ok(false);
        };
        entry.expires_at = Some(deadline);
        self.volatile.insert(Bytes::copy_from_slice(key), ());
        Ok(true)
    }

    fn deadline(ttl: Duration) -> Result<Instant, StorageError> {
        Instant::now()
            .checked_add(ttl)
            .ok_or(StorageError::InvalidExpireTime)
    }

    /// Removes the deadline. Returns false if the key is missing or had none.
    pub fn persist(&mut self, key: &[u8]) -> bool {
        if self.expire_if_stale(key) {
            return false;
        }
        match self.data.get_mut(key) {
            Some(entry) if entry.expires_at.is_some() => {
                entry.expires_at = None;
                self.volatile.remove(key);
                true
            }
            _ => false,
        }
    }

    /// Adds `delta` to an integer value, creating it at 0 if missing.
    /// The TTL of an existing key is kept.
    pub fn incr_by(&mut self, key: &[u8], delta: i64) -> Result<i64, StorageError> {
        self.expire_if_stale(key);

        let (current, expires_at) = match self.data.get(key) {
            Some(entry) => {
                let n = std::str::from_utf8(&entry.value)
                    .ok()
                    .and_then(|s| s.parse::<i64>().ok())
                    .ok_or(StorageError::NotAnInteger)?;
                (n, entry.expires_at)
            }
            None => (0, None),
        };

        let next = current.checked_add(delta).ok_or(StorageError::Overflow)?;
        self.write(
            Bytes::copy_from_slice(key),
            Bytes::from(next.to_string()),
            expires_at,
        )?;
        Ok(next)
    }

    /// Removes every key. Frequency history is kept.
    pub fn flush(&mut self) {
        self.data.clear();
        self.volatile.clear();
        self.pool.clear();
    }

    // ========================================================================
    // Maintenance
    // ========================================================================

    /// Active expiry: deletes expired keys found by sampling.
    ///
    /// Each round samples up to [`ACTIVE_EXPIRE_SAMPLE`] TTL-bearing keys and
    /// deletes the expired ones. Another round follows only while more than a
    /// quarter of the sample was expired, and never more than
    /// [`ACTIVE_EXPIRE_MAX_ROUNDS`], so the cost per call is bounded no matter
    /// how large the key-space is.
    ///
    /// Returns the number of keys removed.
    pub fn sweep_expired(&mut self) -> u64 {
        let mut removed = 0u64;

        for _ in 0..ACTIVE_EXPIRE_MAX_ROUNDS {
            if self.volatile.is_empty() {
                break;
            }

            let now = Instant::now();
            let sample = ACTIVE_EXPIRE_SAMPLE.min(self.volatile.len());
            let mut expired = 0usize;

            for _ in 0..sample {
                let Some((key, _)) = self.volatile.random(&mut self.rng) else {
                    break;
                };
                let key = key.clone();
                let stale = self.data.get(&key).map_or(true, |e| e.is_expired_at(now));
                if stale {
                    if self.remove_entry(&key).is_none() {
                        self.volatile.remove(&key);
                    }
                    expired += 1;
                }
            }

            removed += expired as u64;
            if expired * 4 <= sample {
                break;
            }
        }

        self.stats.expired += removed;
        if removed > 0 {
            debug!(expired = removed, keys_remaining = self.data.len(), "active expiry sweep");
        }
        removed
    }

    /// Evicts keys if the key count exceeds `max_keys`.
    ///
    /// Returns the number of keys evicted.
    pub fn evict_if_over_budget(&mut self) -> usize {
        if self.data.len() <= self.config.max_keys
            || self.config.eviction_policy == EvictionPolicy::NoEviction
        {
            return 0;
        }
        self.evict(self.config.max_keys)
    }

    /// One eviction pass that leaves at most `budget` keys and removes at
    /// least `ceil(eviction_ratio * len)` keys, never more than exist.
    fn evict(&mut self, budget: usize) -> usize {
        let len = self.data.len();
        let by_ratio = (self.config.eviction_ratio * len as f64).ceil() as usize;
        let target = len.saturating_sub(budget).max(by_ratio).min(len);

        let mut evicted = 0;
        while evicted < target {
            let victim = match self.config.eviction_policy {
                EvictionPolicy::NoEviction => None,
                EvictionPolicy::AllkeysRandom => {
                    self.data.random(&mut self.rng).map(|(k, _)| k.clone())
                }
                EvictionPolicy::AllkeysLru | EvictionPolicy::AllkeysLfu => self.next_pooled_victim(),
            };
            let Some(key) = victim else {
                break;
            };
            if self.remove_entry(&key).is_some() {
                evicted += 1;
            }
        }

        self.stats.evicted += evicted as u64;
        debug!(
            policy = %self.config.eviction_policy,
            evicted,
            keys_remaining = self.data.len(),
            "eviction pass"
        );
        evicted
    }

    /// Samples keys into the pool and returns the best live candidate.
    fn next_pooled_victim(&mut self) -> Option<Bytes> {
        loop {
            if !self.pool.is_full() {
                self.refill_pool();
            }
            let item = self.pool.pop_best()?;
            if self.data.contains_key(&item.key) {
                return Some(item.key);
            }
            // Stale: removed since it was sampled.
        }
    }

    fn refill_pool(&mut self) {
        let lfu = self.config.eviction_policy == EvictionPolicy::AllkeysLfu;
        for _ in 0..self.config.sample_size {
            let Some((key, entry)) = self.data.random(&mut self.rng) else {
                return;
            };
            let score = if lfu {
                self.sketch.count(key)
            } else {
                entry.last_access
            };
            let key = key.clone();
            self.pool.push(key, score);
        }
    }
}

/// Glob matching over raw key bytes.
pub(crate) fn glob_match(pattern: &[u8], text: &[u8]) -> bool {
    match pattern.split_first() {
        None => text.is_empty(),
        Some((b'*', rest)) => (0..=text.len()).any(|i| glob_match(rest, &text[i..])),
        Some((b'?', rest)) => !text.is_empty() && glob_match(rest, &text[1..]),
        Some((b'[', rest)) => {
            let Some((&c, tail)) = text.split_first() else {
                return false;
            };
            let Some(close) = rest.iter().skip(1).position(|&b| b == b']').map(|p| p + 1) else {
                return false;
            };
            let (class, negate) = match rest[..close].split_first() {
                Some((b'^', class)) => (class, true),
                _ => (&rest[..close], false),
            };
            class_contains(class, c) != negate && glob_match(&rest[close + 1..], tail)
        }
        Some((b'\\', rest)) if !rest.is_empty() => {
            text.first() == Some(&rest[0]) && glob_match(&rest[1..], &text[1..])
        }
        Some((&p, rest)) => text.first() == Some(&p) && glob_match(rest, &text[1..]),
    }
}

fn class_contains(class: &[u8], c: u8) -> bool {
    let mut i = 0;
    while i < class.len() {
        if i + 2 < class.len() && class[i + 1] == b'-' {
            if (class[i]..=class[i + 2]).contains(&c) {
                return true;
            }
            i += 3;
        } else {
            if class[i] == c {
                return true;
            }
            i += 1;
        }
    }
    false
}
