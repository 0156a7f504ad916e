//! Owned socket descriptor.
//!
//! [`Socket`] is the single owner of one OS descriptor. Releasing it is
//! idempotent and also happens on drop, so a descriptor handed to the
//! registry is closed exactly once no matter which path retires it.

use crate::error::Errno;

use libc::{F_GETFD, F_GETFL, F_SETFD, F_SETFL, FD_CLOEXEC, O_NONBLOCK, close, fcntl};
use std::os::unix::io::{AsRawFd, RawFd};
use tracing::warn;

const RELEASED: RawFd = -1;

#[derive(Debug)]
pub struct Socket {
    file_descriptor: RawFd,
}

impl Socket {
    /// Takes ownership of an open descriptor.
    ///
    /// # Safety
    /// `file_descriptor` must be open and must not be owned by anything else;
    /// it will be closed when the returned `Socket` is released or dropped.
    pub(crate) unsafe fn from_raw(file_descriptor: RawFd) -> Self {
        Self { file_descriptor }
    }

    /// Creates a new stream socket for the given address family.
    pub(crate) fn stream(domain: libc::c_int) -> Result<Self, Errno> {
        let file_descriptor =
            Errno::result(unsafe { libc::socket(domain, libc::SOCK_STREAM, 0) })?;
        let socket = unsafe { Self::from_raw(file_descriptor) };
        socket.set_cloexec()?;

        Ok(socket)
    }

    pub fn set_nonblocking(&self) -> Result<(), Errno> {
        let flags = Errno::result(unsafe { fcntl(self.file_descriptor, F_GETFL) })?;
        if flags & O_NONBLOCK == 0 {
            Errno::result(unsafe { fcntl(self.file_descriptor, F_SETFL, flags | O_NONBLOCK) })?;
        }

        Ok(())
    }

    pub fn is_nonblocking(&self) -> Result<bool, Errno> {
        let flags = Errno::result(unsafe { fcntl(self.file_descriptor, F_GETFL) })?;
        Ok(flags & O_NONBLOCK != 0)
    }

    fn set_cloexec(&self) -> Result<(), Errno> {
        let flags = Errno::result(unsafe { fcntl(self.file_descriptor, F_GETFD) })?;
        Errno::result(unsafe { fcntl(self.file_descriptor, F_SETFD, flags | FD_CLOEXEC) })?;

        Ok(())
    }

    /// Sets an integer socket option.
    pub(crate) fn set_option(
        &self,
        level: libc::c_int,
        name: libc::c_int,
        value: libc::c_int,
    ) -> Result<(), Errno> {
        Errno::result(unsafe {
            libc::setsockopt(
                self.file_descriptor,
                level,
                name,
                &value as *const libc::c_int as *const libc::c_void,
                std::mem::size_of::<libc::c_int>() as libc::socklen_t,
            )
        })?;

        Ok(())
    }

    pub fn is_released(&self) -> bool {
        self.file_descriptor == RELEASED
    }

    /// Closes the descriptor. Calling it again is a no-op.
    ///
    /// A failing `close(2)` is logged and otherwise ignored: the descriptor
    /// is gone either way and there is nothing left to retry.
    pub fn release(&mut self) {
        if self.is_released() {
            return;
        }

        let file_descriptor = std::mem::replace(&mut self.file_descriptor, RELEASED);
        if let Err(err) = Errno::result(unsafe { close(file_descriptor) }) {
            warn!(fd = file_descriptor, %err, "close failed");
        }
    }
}

impl AsRawFd for Socket {
    fn as_raw_fd(&self) -> RawFd {
        self.file_descriptor
    }
}

impl Drop for Socket {
    fn drop(&mut self) {
        self.release();
    }
}
