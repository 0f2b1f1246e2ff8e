//! Connection Handler Module
//!
//! This module manages individual client connections to emberkv.
//! Connections are owned by the event loop, which calls into them whenever
//! their socket is ready.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Event Loop                              │
//! │                  (reactor module)                           │
//! └──────────────────────┬──────────────────────────────────────┘
//!                        │
//!                        │ readable / writable
//!                        ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Connection                               │
//! │                                                             │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐      │
//! │  │ Read bytes  │───>│ Parse RESP  │───>│ Execute cmd │      │
//! │  └─────────────┘    └─────────────┘    └─────────────┘      │
//! │                                               │             │
//! │                                               ▼             │
//! │                                      ┌─────────────┐        │
//! │                                      │ Send reply  │        │
//! │                                      └─────────────┘        │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Features
//!
//! - **Non-blocking I/O**: Reads until WouldBlock, never waits on a socket
//! - **Buffer Management**: Partial requests survive across wakes
//! - **Pipelining**: Supports multiple commands in a single TCP packet
//! - **Statistics**: Tracks per-connection command and byte counts

pub mod handler;

pub use handler::{
    Connection, ConnectionError, ConnectionStats, Status, MAX_BUFFER_SIZE, MAX_PENDING_SIZE,
};
