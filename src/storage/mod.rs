//! Storage Engine Module
//!
//! This module provides the key-space for emberkv: a single-threaded store
//! with TTL support, approximate LRU/LFU/random eviction and a frequency
//! sketch.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     StorageEngine                           │
//! │  ┌────────────┐ ┌────────────┐ ┌────────────┐ ┌──────────┐  │
//! │  │ SampledMap │ │ SampledMap │ │ CountMin   │ │ Eviction │  │
//! │  │ (data)     │ │ (TTL keys) │ │ Sketch     │ │ Pool     │  │
//! │  └────────────┘ └────────────┘ └────────────┘ └──────────┘  │
//! └─────────────────────────────────────────────────────────────┘
//!                            ▲
//!                            │ sweep_expired()
//!              ┌─────────────┴─────────────┐
//!              │      ExpirySchedule       │
//!              │  (driven by event loop)   │
//!              └───────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```
//! use emberkv::storage::{EvictionPolicy, StorageConfig, StorageEngine};
//! use bytes::Bytes;
//!
//! let mut engine = StorageEngine::with_config(StorageConfig {
//!     max_keys: 2,
//!     eviction_policy: EvictionPolicy::AllkeysLru,
//!     ..StorageConfig::default()
//! });
//!
//! engine.set(Bytes::from("a"), Bytes::from("1")).unwrap();
//! engine.set(Bytes::from("b"), Bytes::from("2")).unwrap();
//! engine.set(Bytes::from("c"), Bytes::from("3")).unwrap();
//! assert!(engine.len() <= 2);
//! assert!(engine.exists(b"c"));
//! ```

pub mod engine;
pub mod eviction;
pub mod expiry;
mod sampled;
pub mod sketch;

pub use engine::{Entry, StorageConfig, StorageEngine, StorageError, StorageStats};
pub use eviction::{EvictionPolicy, EvictionPool, PoolItem, UnknownPolicy};
pub use expiry::ExpirySchedule;
pub use sketch::CountMinSketch;
