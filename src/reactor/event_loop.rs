//! The single-threaded event loop.
//!
//! One thread owns the listener, every connection and the command handler
//! (and through it the key-space). Each turn of the loop:
//!
//! 1. runs active expiry if the sweep schedule is due,
//! 2. waits for readiness, at most until the next sweep is due,
//! 3. handles every ready event in the order the poller reported them.
//!
//! Nothing here is shared with other threads except [`ShutdownHandle`].

use crate::commands::CommandHandler;
use crate::connection::{Connection, ConnectionError, Status, MAX_BUFFER_SIZE};
use crate::reactor::poller::{MioPoller, Poller, ReadyEvent};
use crate::storage::ExpirySchedule;
use mio::net::{TcpListener, TcpStream};
use mio::{Interest, Token, Waker};
use slab::Slab;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Token offset for the listener and waker to avoid collision with
/// connections, whose tokens are their slab keys.
const LISTENER_TOKEN: Token = Token(1 << 30);
const WAKER_TOKEN: Token = Token((1 << 30) + 1);

/// Event loop settings.
#[derive(Debug, Clone)]
pub struct ReactorConfig {
    /// Connections beyond this are closed right after accept
    pub max_connections: usize,
    /// Time between active expiry sweeps
    pub expiry_interval: Duration,
    /// Largest request a connection may buffer, in bytes
    pub max_request_size: usize,
}

impl Default for ReactorConfig {
    fn default() -> Self {
        Self {
            max_connections: 20_000,
            expiry_interval: Duration::from_millis(100),
            max_request_size: MAX_BUFFER_SIZE,
        }
    }
}

/// Stops a running [`Reactor`] from any thread.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    flag: Arc<AtomicBool>,
    waker: Arc<Waker>,
}

impl ShutdownHandle {
    /// Requests shutdown and wakes the event loop if it is blocked.
    pub fn shutdown(&self) {
        self.flag.store(true, Ordering::SeqCst);
        if let Err(e) = self.waker.wake() {
            error!(error = %e, "Failed to wake event loop");
        }
    }

    pub fn is_shutdown(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Accepts clients and serves their requests until shut down.
pub struct Reactor<P: Poller = MioPoller> {
    poller: P,
    listener: TcpListener,
    connections: Slab<Connection<TcpStream>>,
    handler: CommandHandler,
    config: ReactorConfig,
    schedule: ExpirySchedule,
    shutdown: ShutdownHandle,
    events: Vec<ReadyEvent>,
}

impl Reactor<MioPoller> {
    /// Binds `addr` and builds a reactor on the platform poller.
    pub fn bind(addr: SocketAddr, handler: CommandHandler, config: ReactorConfig) -> io::Result<Self> {
        // One event per connection, plus the listener and the waker.
        let poller = MioPoller::new(config.max_connections.saturating_add(2))?;
        let listener = TcpListener::bind(addr)?;
        Self::with_poller(poller, listener, handler, config)
    }
}

impl<P: Poller> Reactor<P> {
    pub fn with_poller(
        poller: P,
        mut listener: TcpListener,
        handler: CommandHandler,
        config: ReactorConfig,
    ) -> io::Result<Self> {
        poller.register(&mut listener, LISTENER_TOKEN, Interest::READABLE)?;
        let waker = Arc::new(poller.waker(WAKER_TOKEN)?);

        Ok(Self {
            poller,
            listener,
            connections: Slab::with_capacity(config.max_connections.min(4096)),
            handler,
            schedule: ExpirySchedule::new(config.expiry_interval, Instant::now()),
            config,
            shutdown: ShutdownHandle {
                flag: Arc::new(AtomicBool::new(false)),
                waker,
            },
            events: Vec::with_capacity(1024),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    pub fn handler(&self) -> &CommandHandler {
        &self.handler
    }

    /// Number of open client connections.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Runs until [`ShutdownHandle::shutdown`] is called.
    ///
    /// Only poller failures are returned; per-connection errors close that
    /// connection and the loop carries on.
    pub fn run(&mut self) -> io::Result<()> {
        info!(
            addr = %self.local_addr()?,
            max_connections = self.config.max_connections,
            "Event loop started"
        );

        while !self.shutdown.is_shutdown() {
            self.turn()?;
        }

        let open: Vec<usize> = self.connections.iter().map(|(key, _)| key).collect();
        for key in open {
            self.close(key);
        }
        info!("Event loop stopped");
        Ok(())
    }

    /// One iteration: maintenance, wait, dispatch.
    pub fn turn(&mut self) -> io::Result<()> {
        if self.schedule.is_due(Instant::now()) {
            self.maintenance();
        }

        let timeout = self.schedule.time_until_due(Instant::now());
        let mut events = std::mem::take(&mut self.events);
        events.clear();
        let result = self.poller.wait(&mut events, Some(timeout));
        if let Err(e) = result {
            self.events = events;
            error!(error = %e, "Poll failed");
            return Err(e);
        }

        for event in &events {
            match event.token {
                LISTENER_TOKEN => self.accept_pending(),
                WAKER_TOKEN => debug!("Event loop woken"),
                token => self.handle_connection_event(token, event),
            }
        }
        self.events = events;
        Ok(())
    }

    /// Active expiry plus a budget check.
    fn maintenance(&mut self) {
        let storage = self.handler.storage_mut();
        let expired = storage.sweep_expired();
        let evicted = storage.evict_if_over_budget();
        if evicted > 0 {
            debug!(evicted, "Evicted keys over budget");
        }
        self.schedule.record_sweep(Instant::now(), expired);
    }

    /// Accepts until the listener would block.
    fn accept_pending(&mut self) {
        loop {
            let (mut stream, addr) = match self.listener.accept() {
                Ok(accepted) => accepted,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    error!(error = %e, "Failed to accept connection");
                    return;
                }
            };

            let counters = self.handler.counters_mut();
            counters.total_connections_received += 1;

            if self.connections.len() >= self.config.max_connections {
                counters.rejected_connections += 1;
                warn!(
                    client = %addr,
                    max_connections = self.config.max_connections,
                    "Connection limit reached, closing new connection"
                );
                drop(stream);
                continue;
            }

            let entry = self.connections.vacant_entry();
            let token = Token(entry.key());
            if let Err(e) = self.poller.register(&mut stream, token, Interest::READABLE) {
                error!(client = %addr, error = %e, "Failed to register connection");
                continue;
            }
            if let Err(e) = stream.set_nodelay(true) {
                debug!(client = %addr, error = %e, "Failed to set TCP_NODELAY");
            }
            entry.insert(Connection::new(stream, addr).with_buffer_limit(self.config.max_request_size));

            self.handler.counters_mut().connected_clients = self.connections.len() as u64;
            info!(client = %addr, "Client connected");
        }
    }

    fn handle_connection_event(&mut self, token: Token, event: &ReadyEvent) {
        let key = token.0;
        let Some(conn) = self.connections.get_mut(key) else {
            // Closed earlier in this batch.
            return;
        };

        let mut result = Ok(Status::Open);
        if event.readable {
            result = conn.on_readable(&mut self.handler);
        }
        if event.writable && matches!(result, Ok(Status::Open)) {
            result = conn.on_writable(&mut self.handler);
        }
        if event.closed && !event.readable && matches!(result, Ok(Status::Open)) {
            result = Err(ConnectionError::ClientDisconnected);
        }

        match result {
            Ok(Status::Open) => {
                let want = conn.wants_write();
                if want != conn.is_write_armed() {
                    let interest = if want {
                        Interest::READABLE | Interest::WRITABLE
                    } else {
                        Interest::READABLE
                    };
                    match self.poller.reregister(conn.stream_mut(), token, interest) {
                        Ok(()) => conn.set_write_armed(want),
                        Err(e) => {
                            warn!(client = %conn.addr(), error = %e, "Failed to update interest");
                            self.close(key);
                        }
                    }
                }
            }
            Ok(Status::Close) => {
                debug!(client = %conn.addr(), "Client quit");
                self.close(key);
            }
            Err(e) => {
                if e.is_disconnect() {
                    debug!(client = %conn.addr(), reason = %e, "Client disconnected");
                } else {
                    warn!(client = %conn.addr(), error = %e, "Closing connection");
                }
                self.close(key);
            }
        }
    }

    fn close(&mut self, key: usize) {
        let Some(mut conn) = self.connections.try_remove(key) else {
            return;
        };
        if let Err(e) = self.poller.deregister(conn.stream_mut()) {
            debug!(client = %conn.addr(), error = %e, "Failed to deregister connection");
        }
        self.handler.counters_mut().connected_clients = self.connections.len() as u64;

        let stats = conn.stats();
        info!(
            client = %conn.addr(),
            commands = stats.commands_processed,
            bytes_read = stats.bytes_read,
            bytes_written = stats.bytes_written,
            "Client disconnected"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{StorageConfig, StorageEngine};
    use std::io::{Read, Write};
    use std::net::TcpStream as StdTcpStream;
    use std::thread::{self, JoinHandle};
    use std::time::Duration;

    struct TestServer {
        addr: SocketAddr,
        handle: ShutdownHandle,
        thread: Option<JoinHandle<Reactor>>,
    }

    impl TestServer {
        fn start(config: ReactorConfig) -> Self {
            let handler = CommandHandler::new(StorageEngine::with_config(StorageConfig::default()));
            let mut reactor = Reactor::bind("127.0.0.1:0".parse().unwrap(), handler, config).unwrap();
            let addr = reactor.local_addr().unwrap();
            let handle = reactor.shutdown_handle();
            let thread = thread::spawn(move || {
                reactor.run().unwrap();
                reactor
            });
            Self {
                addr,
                handle,
                thread: Some(thread),
            }
        }

        fn connect(&self) -> StdTcpStream {
            let stream = StdTcpStream::connect(self.addr).unwrap();
            stream
                .set_read_timeout(Some(Duration::from_secs(5)))
                .unwrap();
            stream
        }

        fn stop(mut self) -> Reactor {
            self.handle.shutdown();
            self.thread.take().unwrap().join().unwrap()
        }
    }

    impl Drop for TestServer {
        fn drop(&mut self) {
            if let Some(thread) = self.thread.take() {
                self.handle.shutdown();
                let _ = thread.join();
            }
        }
    }

    /// Reads until exactly `expected.len()` bytes have arrived.
    fn read_exact_reply(stream: &mut StdTcpStream, expected: &[u8]) {
        let mut buf = vec![0u8; expected.len()];
        stream.read_exact(&mut buf).unwrap();
        assert_eq!(
            String::from_utf8_lossy(&buf),
            String::from_utf8_lossy(expected)
        );
    }

    #[test]
    fn test_ping_pong() {
        let server = TestServer::start(ReactorConfig::default());
        let mut client = server.connect();

        client.write_all(b"*1\r\n$4\r\nPING\r\n").unwrap();
        read_exact_reply(&mut client, b"+PONG\r\n");
    }

    #[test]
    fn test_set_get() {
        let server = TestServer::start(ReactorConfig::default());
        let mut client = server.connect();

        client
            .write_all(b"*3\r\n$3\r\nSET\r\n$4\r\nname\r\n$4\r\nkiwi\r\n")
            .unwrap();
        read_exact_reply(&mut client, b"+OK\r\n");

        client
            .write_all(b"*2\r\n$3\r\nGET\r\n$4\r\nname\r\n")
            .unwrap();
        read_exact_reply(&mut client, b"$4\r\nkiwi\r\n");

        client
            .write_all(b"*2\r\n$3\r\nGET\r\n$7\r\nmissing\r\n")
            .unwrap();
        read_exact_reply(&mut client, b"$-1\r\n");
    }

    #[test]
    fn test_out_of_range_expiry_keeps_serving() {
        let server = TestServer::start(ReactorConfig::default());
        let mut client = server.connect();

        client
            .write_all(b"*5\r\n$3\r\nSET\r\n$1\r\nk\r\n$1\r\nv\r\n$2\r\nEX\r\n$19\r\n9223372036854775807\r\n")
            .unwrap();
        read_exact_reply(&mut client, b"-ERR invalid expire time in 'set' command\r\n");

        client.write_all(b"*1\r\n$4\r\nPING\r\n").unwrap();
        read_exact_reply(&mut client, b"+PONG\r\n");
    }

    #[test]
    fn test_pipelining() {
        let server = TestServer::start(ReactorConfig::default());
        let mut client = server.connect();

        client
            .write_all(b"*3\r\n$3\r\nSET\r\n$2\r\nk1\r\n$2\r\nv1\r\n*3\r\n$3\r\nSET\r\n$2\r\nk2\r\n$2\r\nv2\r\n*2\r\n$3\r\nGET\r\n$2\r\nk1\r\n*2\r\n$3\r\nGET\r\n$2\r\nk2\r\n")
            .unwrap();
        read_exact_reply(&mut client, b"+OK\r\n+OK\r\n$2\r\nv1\r\n$2\r\nv2\r\n");
    }

    #[test]
    fn test_request_split_across_writes() {
        let server = TestServer::start(ReactorConfig::default());
        let mut client = server.connect();
        client.set_nodelay(true).unwrap();

        client.write_all(b"*2\r\n$4\r\nEC").unwrap();
        thread::sleep(Duration::from_millis(50));
        client.write_all(b"HO\r\n$5\r\nhello\r\n").unwrap();
        read_exact_reply(&mut client, b"$5\r\nhello\r\n");
    }

    #[test]
    fn test_protocol_error_closes_only_offender() {
        let server = TestServer::start(ReactorConfig::default());
        let mut good = server.connect();
        let mut bad = server.connect();

        bad.write_all(b"?garbage\r\n").unwrap();
        let mut reply = Vec::new();
        bad.read_to_end(&mut reply).unwrap();
        let reply = String::from_utf8_lossy(&reply);
        assert!(reply.starts_with("-ERR Protocol error: "), "{}", reply);

        good.write_all(b"*1\r\n$4\r\nPING\r\n").unwrap();
        read_exact_reply(&mut good, b"+PONG\r\n");
    }

    #[test]
    fn test_quit_closes_connection() {
        let server = TestServer::start(ReactorConfig::default());
        let mut client = server.connect();

        client.write_all(b"*1\r\n$4\r\nQUIT\r\n").unwrap();
        let mut reply = Vec::new();
        client.read_to_end(&mut reply).unwrap();
        assert_eq!(reply, b"+OK\r\n");
    }

    #[test]
    fn test_expired_keys_swept_while_idle() {
        let server = TestServer::start(ReactorConfig {
            expiry_interval: Duration::from_millis(10),
            ..ReactorConfig::default()
        });
        let mut client = server.connect();

        client
            .write_all(b"*5\r\n$3\r\nSET\r\n$1\r\nk\r\n$1\r\nv\r\n$2\r\nPX\r\n$2\r\n20\r\n")
            .unwrap();
        read_exact_reply(&mut client, b"+OK\r\n");

        // No traffic while the key expires; only the timer can reclaim it.
        thread::sleep(Duration::from_millis(200));
        let reactor = server.stop();
        let stats = reactor.handler().storage().stats();
        assert_eq!(stats.keys, 0);
        assert_eq!(stats.expired, 1);
    }

    #[test]
    fn test_max_connections() {
        let server = TestServer::start(ReactorConfig {
            max_connections: 1,
            ..ReactorConfig::default()
        });
        let mut first = server.connect();
        first.write_all(b"*1\r\n$4\r\nPING\r\n").unwrap();
        read_exact_reply(&mut first, b"+PONG\r\n");

        let mut second = server.connect();
        let mut buf = [0u8; 16];
        let outcome = second.read(&mut buf);
        assert!(matches!(outcome, Ok(0) | Err(_)), "{:?}", outcome);

        // The first client is unaffected.
        first.write_all(b"*1\r\n$4\r\nPING\r\n").unwrap();
        read_exact_reply(&mut first, b"+PONG\r\n");

        drop(first);
        drop(second);
        let reactor = server.stop();
        let counters = reactor.handler().counters();
        assert_eq!(counters.total_connections_received, 2);
        assert_eq!(counters.rejected_connections, 1);
    }

    #[test]
    fn test_shutdown_stops_loop() {
        let server = TestServer::start(ReactorConfig::default());
        let _client = server.connect();
        thread::sleep(Duration::from_millis(20));
        let reactor = server.stop();
        assert_eq!(reactor.connection_count(), 0);
    }
}
