//! Non-blocking connected TCP stream.
//!
//! A [`TcpStream`] never waits: every call makes one attempt and reports
//! what the kernel said. The event loop decides when to try again.

use crate::error::Errno;
use crate::net::socket::Socket;

use libc::{read, send};
use std::os::unix::io::{AsRawFd, RawFd};

#[cfg(any(target_os = "linux", target_os = "android"))]
const SEND_FLAGS: libc::c_int = libc::MSG_NOSIGNAL;
#[cfg(not(any(target_os = "linux", target_os = "android")))]
const SEND_FLAGS: libc::c_int = 0;

/// Outcome of a single non-blocking read attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Read {
    /// `len` bytes were copied into the buffer. `more` is set when the
    /// buffer was filled, so further bytes may already be waiting.
    Data { len: usize, more: bool },
    /// The peer closed its side of the connection.
    Closed,
    /// Nothing to read right now; wait for the next readiness report.
    NoneAvailable,
}

/// Outcome of a best-effort non-blocking write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Write {
    /// The kernel accepted this many bytes (possibly fewer than offered).
    Written(usize),
    /// The send buffer is full; nothing was written.
    WouldBlock,
}

#[derive(Debug)]
pub struct TcpStream {
    socket: Socket,
}

impl TcpStream {
    pub(crate) fn new(socket: Socket) -> Self {
        suppress_sigpipe(&socket);

        Self { socket }
    }

    /// Makes one read attempt into `buf`.
    ///
    /// Zero bytes means the peer is gone and is reported as [`Read::Closed`];
    /// `EAGAIN` is reported as [`Read::NoneAvailable`]. Other failures are
    /// returned as errors.
    pub fn read_available(&self, buf: &mut [u8]) -> Result<Read, Errno> {
        if buf.is_empty() {
            return Ok(Read::Data {
                len: 0,
                more: false,
            });
        }

        loop {
            let res = unsafe { read(self.as_raw_fd(), buf.as_mut_ptr() as *mut _, buf.len()) };

            match Errno::result(res) {
                Ok(0) => return Ok(Read::Closed),
                Ok(n) => {
                    let len = n as usize;
                    return Ok(Read::Data {
                        len,
                        more: len == buf.len(),
                    });
                }
                Err(err) if err.is_interrupted() => continue,
                Err(err) if err.is_would_block() => return Ok(Read::NoneAvailable),
                Err(err) => return Err(err),
            }
        }
    }

    /// Writes as much of `buf` as the kernel takes right now.
    ///
    /// Keeps writing while the kernel accepts bytes and stops at the first
    /// `EAGAIN`. Whatever is left over is dropped by the caller; there is no
    /// buffering across readiness cycles.
    pub fn write_all(&self, mut buf: &[u8]) -> Result<Write, Errno> {
        let mut written = 0;

        while !buf.is_empty() {
            let res = unsafe {
                send(
                    self.as_raw_fd(),
                    buf.as_ptr() as *const _,
                    buf.len(),
                    SEND_FLAGS,
                )
            };

            match Errno::result(res) {
                Ok(0) => break,
                Ok(n) => {
                    written += n as usize;
                    buf = &buf[n as usize..];
                }
                Err(err) if err.is_interrupted() => continue,
                Err(err) if err.is_would_block() => break,
                Err(err) => return Err(err),
            }
        }

        if written == 0 && !buf.is_empty() {
            return Ok(Write::WouldBlock);
        }

        Ok(Write::Written(written))
    }

    /// Sends FIN. The peer reads everything written so far, then end of stream.
    pub fn shutdown_write(&self) -> Result<(), Errno> {
        let ret = unsafe { libc::shutdown(self.as_raw_fd(), libc::SHUT_WR) };
        Errno::result(ret).map(|_| ())
    }

    /// Reads and drops whatever is already queued, up to `limit` bytes.
    ///
    /// # Returns
    /// The number of bytes thrown away.
    pub fn discard_available(&self, limit: usize) -> usize {
        let mut scratch = [0u8; 1024];
        let mut discarded = 0;

        while discarded < limit {
            let want = (limit - discarded).min(scratch.len());
            match self.read_available(&mut scratch[..want]) {
                Ok(Read::Data { len, .. }) => discarded += len,
                _ => break,
            }
        }

        discarded
    }

    pub fn release(&mut self) {
        self.socket.release();
    }
}

impl AsRawFd for TcpStream {
    fn as_raw_fd(&self) -> RawFd {
        self.socket.as_raw_fd()
    }
}

// Linux passes MSG_NOSIGNAL on every send instead.
#[cfg(any(target_os = "macos", target_os = "ios", target_os = "freebsd"))]
fn suppress_sigpipe(socket: &Socket) {
    if let Err(err) = socket.set_option(libc::SOL_SOCKET, libc::SO_NOSIGPIPE, 1) {
        tracing::warn!(fd = socket.as_raw_fd(), %err, "failed to set SO_NOSIGPIPE");
    }
}

#[cfg(not(any(target_os = "macos", target_os = "ios", target_os = "freebsd")))]
fn suppress_sigpipe(_socket: &Socket) {}
