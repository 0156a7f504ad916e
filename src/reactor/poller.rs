//! Readiness multiplexing over the registry.
//!
//! [`Poller`] wraps `poll(2)`: it hands the registry's contiguous `pollfd`
//! array to the kernel and lets the kernel fill in the observed readiness.
//! The [`Multiplexer`] trait is the seam the event loop talks to.

use crate::error::{Errno, Result, ServerError};
use crate::reactor::registry::Registry;

use std::time::Duration;

/// Waits for readiness across every descriptor in a [`Registry`].
pub trait Multiplexer {
    /// Blocks until at least one watched descriptor is ready or `timeout`
    /// elapses, recording the observed readiness in the registry.
    ///
    /// # Returns
    /// The number of descriptors with readiness to report. `Ok(0)` means
    /// nothing happened before the timeout and is not an error. An `Err`
    /// means readiness can no longer be determined and the loop must stop.
    fn wait(&mut self, registry: &mut Registry, timeout: Duration) -> Result<usize>;
}

#[derive(Debug, Default)]
pub struct Poller;

impl Poller {
    pub fn new() -> Self {
        Poller
    }
}

impl Multiplexer for Poller {
    fn wait(&mut self, registry: &mut Registry, timeout: Duration) -> Result<usize> {
        registry.clear_observed();

        let fds = registry.poll_fds_mut();
        let timeout_ms = timeout.as_millis().min(libc::c_int::MAX as u128) as libc::c_int;
        let ret = unsafe { libc::poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, timeout_ms) };

        match Errno::result(ret) {
            Ok(ready) => Ok(ready as usize),
            // A signal arrived. Report an empty cycle so the caller can look
            // at its shutdown flag.
            Err(err) if err.is_interrupted() => Ok(0),
            Err(err) => Err(ServerError::Poll { source: err.into() }),
        }
    }
}
