//! Readiness notification.
//!
//! The event loop only needs four things from the OS: register a socket,
//! change or drop its registration, and block until something is ready.
//! [`MioPoller`] provides them over epoll (Linux) or kqueue (BSD/macOS).

use mio::event::Source;
use mio::{Events, Interest, Poll, Token, Waker};
use std::io;
use std::time::Duration;

/// A readiness notification for one registered source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadyEvent {
    pub token: Token,
    /// Data (or EOF) can be read
    pub readable: bool,
    /// Send buffer space is available
    pub writable: bool,
    /// The peer hung up or the socket is in an error state
    pub closed: bool,
}

/// Readiness multiplexing used by the event loop.
pub trait Poller {
    fn register<S>(&self, source: &mut S, token: Token, interest: Interest) -> io::Result<()>
    where
        S: Source + ?Sized;

    fn reregister<S>(&self, source: &mut S, token: Token, interest: Interest) -> io::Result<()>
    where
        S: Source + ?Sized;

    fn deregister<S>(&self, source: &mut S) -> io::Result<()>
    where
        S: Source + ?Sized;

    /// Creates a waker that makes a blocked `wait` return with `token`.
    fn waker(&self, token: Token) -> io::Result<Waker>;

    /// Blocks until at least one source is ready or `timeout` elapses, and
    /// appends the ready events to `events`.
    fn wait(&mut self, events: &mut Vec<ReadyEvent>, timeout: Option<Duration>) -> io::Result<()>;
}

/// Poller backed by `mio::Poll`.
pub struct MioPoller {
    poll: Poll,
    events: Events,
}

impl MioPoller {
    /// Creates a poller that returns at most `capacity` events per wait.
    pub fn new(capacity: usize) -> io::Result<Self> {
        Ok(Self {
            poll: Poll::new()?,
            events: Events::with_capacity(capacity.max(1)),
        })
    }
}

impl Poller for MioPoller {
    fn register<S>(&self, source: &mut S, token: Token, interest: Interest) -> io::Result<()>
    where
        S: Source + ?Sized,
    {
        self.poll.registry().register(source, token, interest)
    }

    fn reregister<S>(&self, source: &mut S, token: Token, interest: Interest) -> io::Result<()>
    where
        S: Source + ?Sized,
    {
        self.poll.registry().reregister(source, token, interest)
    }

    fn deregister<S>(&self, source: &mut S) -> io::Result<()>
    where
        S: Source + ?Sized,
    {
        self.poll.registry().deregister(source)
    }

    fn waker(&self, token: Token) -> io::Result<Waker> {
        Waker::new(self.poll.registry(), token)
    }

    fn wait(&mut self, events: &mut Vec<ReadyEvent>, timeout: Option<Duration>) -> io::Result<()> {
        match self.poll.poll(&mut self.events, timeout) {
            Ok(()) => {}
            // A signal landed mid-wait; report no events and let the caller loop.
            Err(e) if e.kind() == io::ErrorKind::Interrupted => return Ok(()),
            Err(e) => return Err(e),
        }

        events.extend(self.events.iter().map(|e| ReadyEvent {
            token: e.token(),
            readable: e.is_readable() || e.is_read_closed(),
            writable: e.is_writable(),
            closed: e.is_error() || (e.is_read_closed() && e.is_write_closed()),
        }));
        Ok(())
    }
}
