//! Connection Handler Module
//!
//! This module handles individual client connections to emberkv.
//! The event loop owns every connection and calls into it whenever the
//! socket is ready; a connection never blocks.
//!
//! ## Connection Lifecycle
//!
//! ```text
//! 1. Client connects, event loop accepts and registers the socket
//!        │
//!        ▼
//! 2. ┌──────────────────────────────┐
//!    │   on_readable (per wake)     │
//!    │                              │
//!    │  ┌─────────────────────────┐ │
//!    │  │ Read 512-byte chunks    │ │
//!    │  │ until WouldBlock        │ │
//!    │  └───────────┬─────────────┘ │
//!    │              ▼               │
//!    │  ┌─────────────────────────┐ │
//!    │  │ Execute every complete  │ │
//!    │  │ request in the buffer   │ │
//!    │  └───────────┬─────────────┘ │
//!    │              ▼               │
//!    │  ┌─────────────────────────┐ │
//!    │  │ Write replies           │ │
//!    │  └─────────────────────────┘ │
//!    └──────────────────────────────┘
//!        │
//!        ▼
//! 3. EOF, QUIT, protocol error or I/O error: event loop closes it
//! ```
//!
//! ## Buffer Management
//!
//! Incoming bytes accumulate in a `BytesMut`. TCP is a stream protocol, so
//! one read may hold half a request or several pipelined ones; the unparsed
//! tail is kept until the next wake. The tail may grow to the request size
//! limit, which by default fits one maximum-size bulk string.
//!
//! Replies that the socket cannot take yet stay in an output buffer and are
//! flushed when it becomes writable. Once that buffer holds
//! [`MAX_PENDING_SIZE`] bytes the connection stops reading and executing
//! requests until the client has drained it.

use crate::commands::CommandHandler;
use crate::protocol::parser::MAX_BULK_SIZE;
use crate::protocol::{parse_request, ParseError, RespValue};
use bytes::{Buf, BytesMut};
use std::io::{self, Read, Write};
use std::net::SocketAddr;
use tracing::{debug, trace, warn};

/// Bytes requested from the socket per read call
pub const READ_CHUNK_SIZE: usize = 512;

/// Default limit on an unparsed request tail: one maximum-size bulk
/// string plus room for the command and key
pub const MAX_BUFFER_SIZE: usize = MAX_BULK_SIZE + 64 * 1024;

/// Buffered input is parsed after this many new bytes even if the socket
/// still has more
pub const PROCESS_BATCH_SIZE: usize = 64 * 1024;

/// Output high-water mark; above it no further requests are executed
pub const MAX_PENDING_SIZE: usize = 16 * 1024 * 1024;

/// Initial buffer capacity
const INITIAL_BUFFER_SIZE: usize = 4096;

/// Per-connection counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectionStats {
    pub commands_processed: u64,
    pub bytes_read: u64,
    pub bytes_written: u64,
}

/// What the event loop should do with the connection after a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Open,
    /// The client asked to leave (QUIT); replies are already flushed.
    Close,
}

/// A single client connection.
///
/// Generic over the stream so the read/execute/write cycle can be driven by
/// anything that behaves like a non-blocking socket.
pub struct Connection<S> {
    /// The non-blocking stream for this connection
    stream: S,

    /// Client's address (for logging)
    addr: SocketAddr,

    /// Unparsed incoming bytes
    buffer: BytesMut,

    /// Limit on `buffer` while it holds an incomplete request
    max_buffer: usize,

    /// Encoded replies not yet accepted by the socket
    pending: Vec<u8>,

    /// Reading stopped with input possibly left unread
    read_paused: bool,

    /// Whether the event loop currently watches for writability
    write_armed: bool,

    stats: ConnectionStats,
}

impl<S: Read + Write> Connection<S> {
    pub fn new(stream: S, addr: SocketAddr) -> Self {
        Self {
            stream,
            addr,
            buffer: BytesMut::with_capacity(INITIAL_BUFFER_SIZE),
            max_buffer: MAX_BUFFER_SIZE,
            pending: Vec::new(),
            read_paused: false,
            write_armed: false,
            stats: ConnectionStats::default(),
        }
    }

    /// Sets the largest request, in bytes, the connection will buffer.
    pub fn with_buffer_limit(mut self, limit: usize) -> Self {
        self.max_buffer = limit;
        self
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn stream_mut(&mut self) -> &mut S {
        &mut self.stream
    }

    pub fn stats(&self) -> &ConnectionStats {
        &self.stats
    }

    /// Bytes of unparsed input currently buffered.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// True while replies are waiting for the socket to drain.
    pub fn wants_write(&self) -> bool {
        !self.pending.is_empty()
    }

    fn output_backlogged(&self) -> bool {
        self.pending.len() >= MAX_PENDING_SIZE
    }

    pub fn is_write_armed(&self) -> bool {
        self.write_armed
    }

    pub fn set_write_armed(&mut self, armed: bool) {
        self.write_armed = armed;
    }

    /// Handles read readiness: drains the socket, executes every complete
    /// request and writes the replies.
    ///
    /// Returns `ClientDisconnected` once the peer has closed its side and all
    /// replies to the requests it sent have been written. While the output
    /// is backlogged the socket is left unread.
    pub fn on_readable(&mut self, handler: &mut CommandHandler) -> Result<Status, ConnectionError> {
        let mut chunk = [0u8; READ_CHUNK_SIZE];
        let mut eof = false;
        let mut drained = false;
        let mut next_batch = self.buffer.len() + PROCESS_BATCH_SIZE;

        while !self.output_backlogged() {
            match self.stream.read(&mut chunk) {
                Ok(0) => {
                    eof = true;
                    break;
                }
                Ok(n) => {
                    self.buffer.extend_from_slice(&chunk[..n]);
                    self.stats.bytes_read += n as u64;
                    trace!(client = %self.addr, bytes = n, "Read data");

                    if self.buffer.len() >= next_batch || self.buffer.len() >= self.max_buffer {
                        if self.process_requests(handler)? == Status::Close {
                            return self.finish_close();
                        }
                        if self.buffer.len() >= self.max_buffer && !self.output_backlogged() {
                            warn!(
                                client = %self.addr,
                                size = self.buffer.len(),
                                limit = self.max_buffer,
                                "Buffer size limit exceeded"
                            );
                            return Err(ConnectionError::BufferFull);
                        }
                        next_batch = self.buffer.len() + PROCESS_BATCH_SIZE;
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    drained = true;
                    break;
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        self.read_paused = !drained && !eof;

        if self.process_requests(handler)? == Status::Close {
            return self.finish_close();
        }
        self.flush()?;

        if eof {
            if self.wants_write() {
                // Half-closed peer: deliver the remaining replies first.
                self.read_paused = true;
                return Ok(Status::Open);
            }
            if self.buffer.is_empty() {
                return Err(ConnectionError::ClientDisconnected);
            }
            return Err(ConnectionError::UnexpectedEof);
        }
        if self.read_paused {
            debug!(
                client = %self.addr,
                pending = self.pending.len(),
                "Output backlogged, pausing reads"
            );
        }
        Ok(Status::Open)
    }

    /// Handles write readiness by flushing buffered replies, then resumes
    /// any input left behind while the output was backlogged.
    pub fn on_writable(&mut self, handler: &mut CommandHandler) -> Result<Status, ConnectionError> {
        self.flush()?;
        if !self.output_backlogged() && (self.read_paused || !self.buffer.is_empty()) {
            return self.on_readable(handler);
        }
        Ok(Status::Open)
    }

    /// Executes every complete request in the buffer, in order.
    fn process_requests(&mut self, handler: &mut CommandHandler) -> Result<Status, ConnectionError> {
        while !self.buffer.is_empty() {
            if self.output_backlogged() {
                self.flush()?;
                if self.output_backlogged() {
                    break;
                }
            }

            match parse_request(&self.buffer) {
                Ok((request, consumed)) => {
                    self.buffer.advance(consumed);
                    trace!(
                        client = %self.addr,
                        command = %request.command,
                        consumed,
                        remaining = self.buffer.len(),
                        "Parsed request"
                    );

                    let reply = handler.execute(&request);
                    reply.serialize_into(&mut self.pending);
                    self.stats.commands_processed += 1;

                    if request.command == "QUIT" {
                        return Ok(Status::Close);
                    }
                }
                Err(e) if e.is_incomplete() => {
                    trace!(
                        client = %self.addr,
                        buffered = self.buffer.len(),
                        "Incomplete request, need more data"
                    );
                    break;
                }
                Err(e) => {
                    warn!(client = %self.addr, error = %e, "Protocol error");
                    RespValue::error(format!("ERR Protocol error: {}", e))
                        .serialize_into(&mut self.pending);
                    // Best effort; the connection is closed either way.
                    let _ = self.flush();
                    return Err(ConnectionError::Parse(e));
                }
            }
        }
        Ok(Status::Open)
    }

    fn finish_close(&mut self) -> Result<Status, ConnectionError> {
        self.flush()?;
        Ok(Status::Close)
    }

    /// Writes as much of the pending output as the socket accepts.
    pub fn flush(&mut self) -> Result<(), ConnectionError> {
        let mut written = 0;
        while written < self.pending.len() {
            match self.stream.write(&self.pending[written..]) {
                Ok(0) => return Err(io::Error::from(io::ErrorKind::WriteZero).into()),
                Ok(n) => written += n,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }

        if written > 0 {
            self.pending.drain(..written);
            self.stats.bytes_written += written as u64;
            trace!(client = %self.addr, bytes = written, "Sent replies");
        }
        Ok(())
    }
}

/// Errors that can occur while handling a connection.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// I/O error (network issue)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Malformed request
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    /// Client disconnected normally
    #[error("Client disconnected")]
    ClientDisconnected,

    /// Client closed its side with a partial request buffered
    #[error("Unexpected end of stream")]
    UnexpectedEof,

    /// Buffer size limit exceeded
    #[error("Buffer size limit exceeded")]
    BufferFull,
}

impl ConnectionError {
    /// True for the ways a client normally goes away.
    pub fn is_disconnect(&self) -> bool {
        match self {
            ConnectionError::ClientDisconnected | ConnectionError::UnexpectedEof => true,
            ConnectionError::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::BrokenPipe
            ),
            _ => false,
        }
    }
}
