//! # emberkv - An In-Memory Key-Value Cache Server
//!
//! emberkv is a Redis-compatible, in-memory key-value cache written in Rust.
//! One thread multiplexes every client connection through a readiness-driven
//! event loop, and the key-space evicts approximately cold keys once it grows
//! past its key budget.
//!
//! ## Features
//!
//! - **Redis-Compatible**: Speaks RESP and supports the common string and key commands
//! - **Single-Threaded**: No locks; one event loop owns all state
//! - **TTL Support**: Keys expire lazily on access and through periodic sampling
//! - **Approximate Eviction**: Sampled LRU, LFU (Count-Min Sketch) or random victims
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                              emberkv                                    │
//! │                                                                         │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐                  │
//! │  │  Reactor    │───>│ Connection  │───>│  Command    │                  │
//! │  │ (mio poll)  │    │  (buffer)   │    │  Handler    │                  │
//! │  └──────┬──────┘    └─────────────┘    └──────┬──────┘                  │
//! │         │                                     │                         │
//! │         │ sweep timer                         ▼                         │
//! │         │           ┌──────────────────────────────────────────────┐    │
//! │         └──────────>│              StorageEngine                   │    │
//! │                     │  ┌────────┐ ┌────────┐ ┌────────┐ ┌────────┐ │    │
//! │  ┌─────────────┐    │  │  data  │ │  TTL   │ │ sketch │ │  pool  │ │    │
//! │  │ RESP codec  │    │  └────────┘ └────────┘ └────────┘ └────────┘ │    │
//! │  └─────────────┘    └──────────────────────────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```no_run
//! use emberkv::commands::CommandHandler;
//! use emberkv::reactor::{Reactor, ReactorConfig};
//! use emberkv::storage::StorageEngine;
//!
//! let handler = CommandHandler::new(StorageEngine::new());
//! let mut reactor = Reactor::bind("127.0.0.1:6380".parse()?, handler, ReactorConfig::default())?;
//! reactor.run()?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Module Overview
//!
//! - [`protocol`]: RESP codec and request decoding
//! - [`storage`]: Key-space with expiry, eviction and the frequency sketch
//! - [`commands`]: Command handlers for all supported commands
//! - [`connection`]: Per-client buffering and request processing
//! - [`reactor`]: The readiness poller and event loop
//! - [`config`]: CLI and TOML configuration
//!
//! ## Design Highlights
//!
//! ### Lazy + Active Expiry
//!
//! Keys with TTL are expired in two ways:
//! 1. **Lazy**: When a key is accessed, we check if it's expired
//! 2. **Active**: The event loop periodically samples TTL keys and deletes expired ones
//!
//! ### Sampling Eviction
//!
//! Exact LRU/LFU needs a global order updated on every access. Instead, a few
//! random keys are scored per eviction step and the coldest candidates are
//! kept in a small pool between steps.

pub mod commands;
pub mod config;
pub mod connection;
pub mod protocol;
pub mod reactor;
pub mod storage;

// Re-export commonly used types for convenience
pub use commands::CommandHandler;
pub use config::{Config, ConfigError};
pub use protocol::{ParseError, RespValue};
pub use reactor::{Reactor, ShutdownHandle};
pub use storage::{EvictionPolicy, StorageEngine};

/// The default port emberkv listens on
pub const DEFAULT_PORT: u16 = 6380;

/// The default host emberkv binds to
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Version of emberkv
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
