//! Fluent builder for event loop construction.
//!
//! Provides a builder pattern interface for binding the listener and
//! assembling an [`EventLoop`] around it.

use crate::error::Result;
use crate::http::{Respond, StaticResponse};
use crate::net::tcp_listener::{DEFAULT_BACKLOG, TcpListener};
use crate::reactor::core::{EventLoop, LoopConfig};
use crate::reactor::shutdown::Shutdown;

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

/// Builder for constructing [`EventLoop`] instances with fluent API.
///
/// # Example
/// ```ignore
/// let event_loop = ServerBuilder::new()
///     .address("127.0.0.1:8080".parse()?)
///     .poll_timeout(Duration::from_millis(250))
///     .build()?;
/// event_loop.run()?;
/// ```
pub struct ServerBuilder<R = StaticResponse> {
    address: SocketAddr,
    backlog: i32,
    config: LoopConfig,
    responder: R,
    shutdown: Option<Shutdown>,
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerBuilder {
    /// Creates a builder for `127.0.0.1:8080` answering with the default body.
    pub fn new() -> Self {
        Self {
            address: SocketAddr::from((Ipv4Addr::LOCALHOST, 8080)),
            backlog: DEFAULT_BACKLOG,
            config: LoopConfig::default(),
            responder: StaticResponse::default(),
            shutdown: None,
        }
    }
}

impl<R: Respond> ServerBuilder<R> {
    pub fn address(mut self, address: SocketAddr) -> Self {
        self.address = address;
        self
    }

    pub fn backlog(mut self, backlog: i32) -> Self {
        self.backlog = backlog;
        self
    }

    pub fn poll_timeout(mut self, timeout: Duration) -> Self {
        self.config.poll_timeout = timeout;
        self
    }

    pub fn max_request_bytes(mut self, bytes: usize) -> Self {
        self.config.max_request_bytes = bytes;
        self
    }

    /// Caps the number of clients tracked at once; `0` lifts the cap.
    pub fn max_connections(mut self, max: usize) -> Self {
        self.config.max_connections = max;
        self
    }

    pub fn shutdown(mut self, shutdown: Shutdown) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Swaps the response builder.
    pub fn responder<T: Respond>(self, responder: T) -> ServerBuilder<T> {
        ServerBuilder {
            address: self.address,
            backlog: self.backlog,
            config: self.config,
            responder,
            shutdown: self.shutdown,
        }
    }

    /// Binds the listener and returns a loop ready to [`run`](EventLoop::run).
    ///
    /// # Returns
    /// The event loop, or the setup error if the address could not be bound
    pub fn build(self) -> Result<EventLoop<R>> {
        let listener = TcpListener::bind(self.address, self.backlog)?;
        let event_loop = EventLoop::new(listener, self.responder, self.config);

        Ok(match self.shutdown {
            Some(shutdown) => event_loop.with_shutdown(shutdown),
            None => event_loop,
        })
    }
}
