//! Error types shared by the socket primitives, the poller and the event loop.
//!
//! Two layers exist:
//!
//! - [`Errno`]: a raw OS error captured right after a failing libc call. The
//!   socket primitives return it so the caller can tell "would block" and
//!   "interrupted" apart from real failures.
//! - [`ServerError`]: the errors that leave the crate. Setup failures and
//!   multiplexer failures are fatal; the rest are local to one client.

use std::io;
use std::net::SocketAddr;
use std::os::unix::io::RawFd;

use libc::{EAGAIN, EINTR, EWOULDBLOCK};

/// Result alias for operations that can fail with a [`ServerError`].
pub type Result<T> = std::result::Result<T, ServerError>;

/// Errors surfaced by the server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Creating the listening socket failed.
    #[error("failed to create socket: {source}")]
    Socket {
        #[source]
        source: io::Error,
    },

    /// The address could not be bound (in use, privileged port, ...).
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    /// The bound socket could not be marked as listening.
    #[error("failed to listen on {addr}: {source}")]
    Listen {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    /// The readiness multiplexer failed; the loop cannot continue.
    #[error("poll failed: {source}")]
    Poll {
        #[source]
        source: io::Error,
    },

    /// `poll` reported an error condition on the listening descriptor.
    #[error("listening descriptor {fd} reported an error condition")]
    ListenerFailed { fd: RawFd },

    /// A descriptor was offered to the registry while already tracked.
    #[error("descriptor {fd} is already registered")]
    DuplicateDescriptor { fd: RawFd },

    /// Installing the shutdown signal handlers failed.
    #[error("failed to install signal handler: {source}")]
    Signal {
        #[source]
        source: io::Error,
    },
}

/// An `errno` value captured after a failing system call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub struct Errno(i32);

impl Errno {
    /// Reads the calling thread's current `errno`.
    pub fn last() -> Errno {
        #[cfg(any(target_os = "macos", target_os = "ios", target_os = "freebsd"))]
        let errno = unsafe { *libc::__error() };
        #[cfg(not(any(target_os = "macos", target_os = "ios", target_os = "freebsd")))]
        let errno = unsafe { *libc::__errno_location() };

        Errno(errno)
    }

    pub fn from_raw(code: i32) -> Errno {
        Errno(code)
    }

    pub fn raw(self) -> i32 {
        self.0
    }

    /// Returns `Ok(value)` unless `value` is the `-1` failure sentinel, in
    /// which case `errno` is captured.
    #[inline]
    pub fn result<S: ErrnoSentinel + PartialEq<S>>(value: S) -> std::result::Result<S, Errno> {
        if value == S::sentinel() {
            Err(Self::last())
        } else {
            Ok(value)
        }
    }

    /// The operation would have blocked on a non-blocking descriptor.
    pub fn is_would_block(self) -> bool {
        self.0 == EAGAIN || self.0 == EWOULDBLOCK
    }

    /// A signal interrupted the call before it did any work.
    pub fn is_interrupted(self) -> bool {
        self.0 == EINTR
    }
}

impl From<Errno> for io::Error {
    fn from(err: Errno) -> Self {
        io::Error::from_raw_os_error(err.0)
    }
}

impl std::fmt::Display for Errno {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", io::Error::from_raw_os_error(self.0))
    }
}

/// Value a libc function returns to signal that `errno` holds the failure.
pub trait ErrnoSentinel: Sized {
    fn sentinel() -> Self;
}

impl ErrnoSentinel for i32 {
    fn sentinel() -> Self {
        -1
    }
}

impl ErrnoSentinel for isize {
    fn sentinel() -> Self {
        -1
    }
}
