use crate::error::{Errno, Result, ServerError};
use crate::http::{Respond, request_line};
use crate::net::tcp_listener::{Accept, TcpListener};
use crate::net::tcp_stream::{Read, Write};
use crate::reactor::interest::Interest;
use crate::reactor::io::ConnectionState;
use crate::reactor::poller::{Multiplexer, Poller};
use crate::reactor::registry::Registry;
use crate::reactor::shutdown::Shutdown;

use std::io;
use std::net::SocketAddr;
use std::os::unix::io::{AsRawFd, RawFd};
use std::time::Duration;
use tracing::{debug, error, info, warn};

const READ_CHUNK: usize = 1024;
/// Unread input dropped after a response, so the close is a FIN and not an RST.
const DRAIN_LIMIT: usize = 64 * 1024;

/// Tunables of the event loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopConfig {
    /// Upper bound on each wait, so the loop keeps checking for shutdown.
    pub poll_timeout: Duration,
    /// Bytes read from one client before the request is handed off.
    pub max_request_bytes: usize,
    /// Clients tracked at once; `0` means no limit.
    pub max_connections: usize,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            poll_timeout: Duration::from_millis(500),
            max_request_bytes: 8 * 1024,
            max_connections: 0,
        }
    }
}

/// What one cycle of the loop did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Descriptors the multiplexer reported as ready.
    pub ready: usize,
    pub accepted: usize,
    pub responded: usize,
    /// Clients that closed before sending anything.
    pub disconnected: usize,
    /// Accept, read or write failures.
    pub failed: usize,
}

impl CycleReport {
    pub fn is_idle(&self) -> bool {
        *self == CycleReport::default()
    }
}

enum Request {
    Received(Vec<u8>),
    Pending,
    Disconnected,
    Failed(Errno),
}

/// Single-threaded, readiness-driven TCP server loop.
///
/// Owns the listener and the registry. Each [`turn`](Self::turn) waits for
/// readiness once, drains every pending connection, then gives each ready
/// client exactly one read/respond/close pass.
pub struct EventLoop<R, M = Poller> {
    // Dropped before `listener`, so clients are released first.
    registry: Registry,
    listener: TcpListener,
    multiplexer: M,
    responder: R,
    config: LoopConfig,
    shutdown: Shutdown,
}

impl<R: Respond> EventLoop<R, Poller> {
    pub fn new(listener: TcpListener, responder: R, config: LoopConfig) -> Self {
        Self::with_multiplexer(listener, responder, config, Poller::new())
    }
}

impl<R: Respond, M: Multiplexer> EventLoop<R, M> {
    pub fn with_multiplexer(
        listener: TcpListener,
        responder: R,
        config: LoopConfig,
        multiplexer: M,
    ) -> Self {
        Self {
            registry: Registry::new(listener.as_raw_fd()),
            listener,
            multiplexer,
            responder,
            config,
            shutdown: Shutdown::new(),
        }
    }

    /// Replaces the stop flag, e.g. with one that also watches signals.
    pub fn with_shutdown(mut self, shutdown: Shutdown) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// A handle that stops [`run`](Self::run) from another thread.
    pub fn shutdown_handle(&self) -> Shutdown {
        self.shutdown.clone()
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Runs cycles until shutdown is requested, the multiplexer fails or the
    /// listener reports an error condition.
    ///
    /// Every client and then the listener are released before returning,
    /// on both paths.
    pub fn run(mut self) -> Result<()> {
        info!(addr = ?self.listener.local_addr().ok(), "event loop started");

        while !self.shutdown.is_requested() {
            match self.turn() {
                Ok(report) if report.is_idle() => {}
                Ok(report) => debug!(?report, clients = self.registry.client_count(), "cycle"),
                Err(err) => {
                    error!(%err, "event loop failed, shutting down");
                    self.close_all();
                    return Err(err);
                }
            }
        }

        info!("shutdown requested");
        self.close_all();

        Ok(())
    }

    /// Runs one cycle: wait, drain accepts, service ready clients.
    ///
    /// Clients accepted during this cycle are appended with no observed
    /// readiness and are first serviced on the next cycle.
    pub fn turn(&mut self) -> Result<CycleReport> {
        self.update_listener_interest();

        let ready = self
            .multiplexer
            .wait(&mut self.registry, self.config.poll_timeout)?;

        let mut report = CycleReport {
            ready,
            ..CycleReport::default()
        };
        if ready == 0 {
            return Ok(report);
        }

        // An erroring listener stays ready forever; accepting again would spin.
        if self.registry.listener_failed() {
            return Err(ServerError::ListenerFailed {
                fd: self.listener.as_raw_fd(),
            });
        }

        if self
            .registry
            .observed(self.registry.listener_index())
            .is_readable()
        {
            self.drain_accepts(&mut report);
        }

        self.service_clients(&mut report);

        Ok(report)
    }

    fn at_capacity(&self) -> bool {
        self.config.max_connections != 0
            && self.registry.client_count() >= self.config.max_connections
    }

    // At capacity the listener stays readable; stop watching it so the wait
    // does not return immediately every cycle.
    fn update_listener_interest(&mut self) {
        let interest = if self.at_capacity() {
            Interest::NONE
        } else {
            Interest::READABLE
        };
        self.registry
            .set_interest(self.registry.listener_index(), interest);
    }

    fn drain_accepts(&mut self, report: &mut CycleReport) {
        loop {
            if self.at_capacity() {
                debug!(
                    max = self.config.max_connections,
                    "connection limit reached, leaving the rest queued"
                );
                break;
            }

            match self.listener.accept() {
                Ok(Accept::NoneAvailable) => break,
                Ok(Accept::Connection(stream, peer)) => {
                    let fd = stream.as_raw_fd();
                    match self.registry.add(stream, peer, Interest::READABLE) {
                        Ok(_) => {
                            info!(fd, %peer, "client connected");
                            report.accepted += 1;
                        }
                        Err(err) => {
                            warn!(fd, %peer, %err, "refusing connection");
                            report.failed += 1;
                        }
                    }
                }
                Err(err) => {
                    warn!(%err, "accept failed");
                    report.failed += 1;
                    break;
                }
            }
        }
    }

    fn service_clients(&mut self, report: &mut CycleReport) {
        let mut index = self.registry.first_client();

        while index < self.registry.len() {
            if !self.registry.observed(index).is_readable() {
                index += 1;
                continue;
            }

            match self.read_request(index) {
                Request::Pending => {
                    index += 1;
                    continue;
                }
                Request::Disconnected => {
                    self.retire(index, ConnectionState::Disconnected);
                    report.disconnected += 1;
                }
                Request::Failed(err) => {
                    warn!(fd = self.fd_at(index), %err, "read failed");
                    self.retire(index, ConnectionState::Disconnected);
                    report.failed += 1;
                }
                Request::Received(request) => {
                    if self.respond(index, &request) {
                        self.finish(index);
                        report.responded += 1;
                    } else {
                        report.failed += 1;
                    }
                    self.retire(index, ConnectionState::Responded);
                }
            }
            // The entry at `index` is gone and its successor shifted into
            // place; look at the same index again.
        }
    }

    fn read_request(&self, index: usize) -> Request {
        let Some(connection) = self.registry.connection(index) else {
            return Request::Pending;
        };

        let limit = self.config.max_request_bytes;
        let mut request = Vec::new();
        let mut chunk = [0u8; READ_CHUNK];

        while request.len() < limit {
            let want = (limit - request.len()).min(READ_CHUNK);

            match connection.stream.read_available(&mut chunk[..want]) {
                Ok(Read::Data { len, more }) => {
                    request.extend_from_slice(&chunk[..len]);
                    if !more {
                        break;
                    }
                }
                Ok(Read::NoneAvailable) => break,
                // A half-close after sending still gets its response.
                Ok(Read::Closed) if !request.is_empty() => break,
                Ok(Read::Closed) => return Request::Disconnected,
                Err(err) => return Request::Failed(err),
            }
        }

        if request.is_empty() {
            return Request::Pending;
        }

        Request::Received(request)
    }

    /// Builds and writes the response. Returns false when the write failed.
    fn respond(&mut self, index: usize, request: &[u8]) -> bool {
        let Some(connection) = self.registry.connection(index) else {
            return false;
        };
        let fd = connection.as_raw_fd();

        debug!(
            fd,
            peer = %connection.peer(),
            bytes = request.len(),
            line = %request_line(request),
            "request received"
        );

        let response = self.responder.respond(request);

        match connection.stream.write_all(&response) {
            Ok(Write::Written(n)) if n < response.len() => {
                warn!(fd, written = n, total = response.len(), "response truncated");
                true
            }
            Ok(Write::Written(n)) => {
                debug!(fd, bytes = n, "response sent");
                true
            }
            Ok(Write::WouldBlock) => {
                warn!(fd, total = response.len(), "send buffer full, response dropped");
                true
            }
            Err(err) => {
                warn!(fd, %err, "write failed");
                false
            }
        }
    }

    // Closing with unread input makes the kernel reset the connection, and the
    // peer may lose the response. Send FIN first and drop what is queued.
    fn finish(&self, index: usize) {
        let Some(connection) = self.registry.connection(index) else {
            return;
        };
        let fd = connection.as_raw_fd();

        if let Err(err) = connection.stream.shutdown_write() {
            debug!(fd, %err, "shutdown failed");
        }

        let discarded = connection.stream.discard_available(DRAIN_LIMIT);
        if discarded > 0 {
            debug!(fd, discarded, "unread request bytes dropped");
        }
    }

    fn retire(&mut self, index: usize, state: ConnectionState) {
        if let Some(connection) = self.registry.connection_mut(index) {
            connection.state = state;
        }

        if let Some(closed) = self.registry.remove_at(index) {
            info!(
                fd = closed.fd,
                peer = %closed.peer,
                state = %closed.last_state,
                open_ms = closed.open_for.as_millis() as u64,
                "client closed"
            );
        }
    }

    fn fd_at(&self, index: usize) -> RawFd {
        self.registry.at(index).map(|watched| watched.fd).unwrap_or(-1)
    }

    fn close_all(&mut self) {
        let closed = self.registry.clear();
        if !closed.is_empty() {
            info!(count = closed.len(), "released open clients");
        }
        self.listener.release();
    }
}
