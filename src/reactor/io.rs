use crate::net::tcp_stream::TcpStream;

use std::fmt;
use std::net::SocketAddr;
use std::os::unix::io::{AsRawFd, RawFd};
use std::time::{Duration, Instant};

/// Where a client connection is in its single request/response exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Accepted, not yet registered.
    Connected,
    /// Registered and waiting for the request bytes.
    AwaitingRead,
    /// The peer went away (or failed) before a response was built.
    Disconnected,
    /// A response was written, or at least attempted.
    Responded,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Connected => "connected",
            ConnectionState::AwaitingRead => "awaiting-read",
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Responded => "responded",
        };
        f.write_str(name)
    }
}

/// A client tracked by the registry. Owns the stream, so dropping the
/// connection releases its descriptor.
#[derive(Debug)]
pub struct Connection {
    pub(crate) stream: TcpStream,
    pub(crate) peer: SocketAddr,
    pub(crate) state: ConnectionState,
    accepted_at: Instant,
}

impl Connection {
    pub(crate) fn new(stream: TcpStream, peer: SocketAddr) -> Self {
        Self {
            stream,
            peer,
            state: ConnectionState::Connected,
            accepted_at: Instant::now(),
        }
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn age(&self) -> Duration {
        self.accepted_at.elapsed()
    }

    /// Releases the stream and returns what is worth logging about it.
    pub(crate) fn close(mut self) -> Closed {
        let fd = self.stream.as_raw_fd();
        self.stream.release();

        Closed {
            fd,
            peer: self.peer,
            last_state: self.state,
            open_for: self.age(),
        }
    }
}

impl AsRawFd for Connection {
    fn as_raw_fd(&self) -> RawFd {
        self.stream.as_raw_fd()
    }
}

/// Terminal record of a connection: removed from the registry and released.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Closed {
    /// The descriptor number it used; already released.
    pub fd: RawFd,
    pub peer: SocketAddr,
    /// State the connection was in when it was retired.
    pub last_state: ConnectionState,
    pub open_for: Duration,
}
