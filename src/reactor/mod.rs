//! Readiness-driven networking.
//!
//! - `poller`: the [`Poller`] trait and its mio implementation
//! - `event_loop`: the [`Reactor`] that accepts clients and serves requests
//!
//! ## Example
//!
//! ```no_run
//! use emberkv::commands::CommandHandler;
//! use emberkv::reactor::{Reactor, ReactorConfig};
//! use emberkv::storage::StorageEngine;
//!
//! let handler = CommandHandler::new(StorageEngine::new());
//! let mut reactor = Reactor::bind("127.0.0.1:6380".parse()?, handler, ReactorConfig::default())?;
//!
//! let shutdown = reactor.shutdown_handle();
//! ctrlc::set_handler(move || shutdown.shutdown())?;
//!
//! reactor.run()?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod event_loop;
pub mod poller;

pub use event_loop::{Reactor, ReactorConfig, ShutdownHandle};
pub use poller::{MioPoller, Poller, ReadyEvent};
