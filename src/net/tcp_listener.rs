//! TCP listener for accepting incoming connections.
//!
//! Provides a non-blocking [`TcpListener`] for the event loop.
//!
//! # Usage
//!
//! ```ignore
//! use pollserver::net::tcp_listener::{Accept, TcpListener};
//!
//! let listener = TcpListener::bind("127.0.0.1:8080".parse()?, 128)?;
//! println!("Listening on {}", listener.local_addr()?);
//!
//! loop {
//!     match listener.accept()? {
//!         Accept::Connection(stream, peer) => println!("New connection from {peer}"),
//!         Accept::NoneAvailable => break,
//!     }
//! }
//! ```
use crate::error::{Errno, ServerError};
use crate::net::socket::Socket;
use crate::net::tcp_stream::TcpStream;
use crate::net::utils::{domain_of, sockaddr_to_socketaddr, socketaddr_to_sockaddr};

use libc::{ECONNABORTED, SO_REUSEADDR, SOL_SOCKET, accept, bind, getsockname, listen, sockaddr};
use std::io;
use std::mem;
use std::net::SocketAddr;
use std::os::unix::io::{AsRawFd, RawFd};
use tracing::info;

/// Backlog used when none is configured.
pub const DEFAULT_BACKLOG: i32 = 128;

/// Outcome of a single non-blocking accept attempt.
#[derive(Debug)]
pub enum Accept {
    /// A pending connection was taken off the backlog.
    Connection(TcpStream, SocketAddr),
    /// The backlog is empty for now. Not an error.
    NoneAvailable,
}

/// A TCP listener that accepts incoming connections.
///
/// `TcpListener` binds to an address and hands out connections queued in the
/// kernel backlog. Each call to [`Self::accept`] takes at most one.
///
/// # Non-blocking
///
/// All operations are non-blocking. If no connection is pending,
/// [`Accept::NoneAvailable`] is returned immediately.
#[derive(Debug)]
pub struct TcpListener {
    socket: Socket,
    address: SocketAddr,
    backlog: i32,
    #[cfg(test)]
    injected: std::cell::Cell<Option<Errno>>,
}

impl TcpListener {
    /// Binds a listener to the given address.
    ///
    /// This method performs the following:
    /// 1. Creates a new socket
    /// 2. Enables `SO_REUSEADDR` so restarts do not trip over `TIME_WAIT`
    /// 3. Binds to the specified address
    /// 4. Starts listening with the given backlog
    /// 5. Sets it to non-blocking mode
    ///
    /// The descriptor is released before an error is returned.
    ///
    /// # Arguments
    /// * `address` - Address to bind to; port `0` picks an ephemeral port
    /// * `backlog` - Depth of the kernel queue of established connections
    ///
    /// # Returns
    /// A [`TcpListener`] on success, or a [`ServerError`] describing the setup step that failed
    pub fn bind(address: SocketAddr, backlog: i32) -> Result<Self, ServerError> {
        let socket = Socket::stream(domain_of(&address)).map_err(|err| ServerError::Socket {
            source: err.into(),
        })?;

        socket
            .set_option(SOL_SOCKET, SO_REUSEADDR, 1)
            .map_err(|err| ServerError::Socket {
                source: err.into(),
            })?;

        let (storage, length) = socketaddr_to_sockaddr(&address);
        let ret = unsafe {
            bind(
                socket.as_raw_fd(),
                &storage as *const _ as *const sockaddr,
                length,
            )
        };
        Errno::result(ret).map_err(|err| ServerError::Bind {
            addr: address,
            source: err.into(),
        })?;

        let ret = unsafe { listen(socket.as_raw_fd(), backlog) };
        Errno::result(ret).map_err(|err| ServerError::Listen {
            addr: address,
            source: err.into(),
        })?;

        socket.set_nonblocking().map_err(|err| ServerError::Socket {
            source: err.into(),
        })?;

        let mut listener = Self {
            socket,
            address,
            backlog,
            #[cfg(test)]
            injected: std::cell::Cell::new(None),
        };
        if let Ok(bound) = listener.local_addr() {
            listener.address = bound;
        }

        info!(fd = listener.as_raw_fd(), addr = %listener.address, backlog, "listening");

        Ok(listener)
    }

    /// Takes one pending connection off the backlog.
    ///
    /// Never blocks. The returned stream is already non-blocking. An empty
    /// backlog is reported as [`Accept::NoneAvailable`]; interrupted calls
    /// and connections aborted before they were taken are retried.
    ///
    /// # Returns
    /// - `Ok(Accept::Connection(stream, peer))` for an accepted connection
    /// - `Ok(Accept::NoneAvailable)` when nothing is queued
    /// - `Err(errno)` for anything else (e.g. `EMFILE`)
    pub fn accept(&self) -> Result<Accept, Errno> {
        #[cfg(test)]
        {
            if let Some(err) = self.injected.take() {
                return Err(err);
            }
        }

        loop {
            let mut storage: libc::sockaddr_storage = unsafe { mem::zeroed() };
            let mut length = mem::size_of::<libc::sockaddr_storage>() as libc::socklen_t;

            let ret = unsafe {
                accept(
                    self.as_raw_fd(),
                    &mut storage as *mut _ as *mut sockaddr,
                    &mut length,
                )
            };

            let file_descriptor = match Errno::result(ret) {
                Ok(file_descriptor) => file_descriptor,
                Err(err) if err.is_interrupted() || err.raw() == ECONNABORTED => continue,
                Err(err) if err.is_would_block() => return Ok(Accept::NoneAvailable),
                Err(err) => return Err(err),
            };

            let socket = unsafe { Socket::from_raw(file_descriptor) };
            socket.set_nonblocking()?;

            let peer = sockaddr_to_socketaddr(&storage).unwrap_or(self.address);

            return Ok(Accept::Connection(TcpStream::new(socket), peer));
        }
    }

    /// Returns the local address this listener is bound to.
    ///
    /// # Example
    /// ```text
    /// let listener = TcpListener::bind("127.0.0.1:0".parse()?, 128)?;
    /// println!("Listening on {}", listener.local_addr()?);
    /// ```
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        let mut storage: libc::sockaddr_storage = unsafe { mem::zeroed() };
        let mut length = mem::size_of::<libc::sockaddr_storage>() as libc::socklen_t;
        let result = unsafe {
            getsockname(
                self.as_raw_fd(),
                &mut storage as *mut _ as *mut sockaddr,
                &mut length,
            )
        };

        if result < 0 {
            return Err(io::Error::last_os_error());
        }

        sockaddr_to_socketaddr(&storage)
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "unsupported address family"))
    }

    pub fn backlog(&self) -> i32 {
        self.backlog
    }

    pub fn release(&mut self) {
        self.socket.release();
    }

    /// Makes the next [`Self::accept`] fail with `err` without touching the
    /// backlog.
    #[cfg(test)]
    pub(crate) fn fail_next_accept(&self, err: Errno) {
        self.injected.set(Some(err));
    }
}

impl AsRawFd for TcpListener {
    fn as_raw_fd(&self) -> RawFd {
        self.socket.as_raw_fd()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::net::TcpStream as StdTcpStream;

    fn loopback() -> SocketAddr {
        "127.0.0.1:0".parse().unwrap()
    }

    #[test]
    fn binds_ephemeral_port() {
        let listener = TcpListener::bind(loopback(), DEFAULT_BACKLOG).expect("bind");
        let addr = listener.local_addr().expect("local addr");

        assert_ne!(addr.port(), 0);
        assert_eq!(listener.backlog(), DEFAULT_BACKLOG);
        assert!(listener.socket.is_nonblocking().unwrap());
    }

    #[test]
    fn empty_backlog_is_not_an_error() {
        let listener = TcpListener::bind(loopback(), DEFAULT_BACKLOG).expect("bind");

        assert!(matches!(listener.accept(), Ok(Accept::NoneAvailable)));
    }

    #[test]
    fn accepted_stream_is_nonblocking() {
        let listener = TcpListener::bind(loopback(), DEFAULT_BACKLOG).expect("bind");
        let addr = listener.local_addr().unwrap();
        let client = StdTcpStream::connect(addr).expect("connect");

        let mut accepted = None;
        for _ in 0..100 {
            if let Accept::Connection(stream, peer) = listener.accept().expect("accept") {
                accepted = Some((stream, peer));
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(10));
        }

        let (stream, peer) = accepted.expect("connection was never accepted");
        assert_eq!(peer, client.local_addr().unwrap());
        let flags = unsafe { libc::fcntl(stream.as_raw_fd(), libc::F_GETFL) };
        assert_ne!(flags & libc::O_NONBLOCK, 0);
    }

    #[test]
    fn address_in_use_is_a_bind_error() {
        let first = TcpListener::bind(loopback(), DEFAULT_BACKLOG).expect("bind");
        let taken = first.local_addr().unwrap();

        match TcpListener::bind(taken, DEFAULT_BACKLOG) {
            Err(ServerError::Bind { addr, source }) => {
                assert_eq!(addr, taken);
                assert_eq!(source.kind(), io::ErrorKind::AddrInUse);
            }
            other => panic!("expected a bind error, got {other:?}"),
        }
    }
}
