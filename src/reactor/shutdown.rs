//! External stop condition for the event loop.
//!
//! The loop checks its [`Shutdown`] flag once per cycle; since every wait is
//! bounded by the poll timeout, a raised flag is noticed within one timeout.

use crate::error::{Errno, Result, ServerError};

use std::ptr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

// Set from the signal handler, which cannot reach any particular `Shutdown`.
static SIGNALLED: AtomicBool = AtomicBool::new(false);

/// Cloneable stop flag shared between the loop and whoever may stop it.
#[derive(Debug, Clone, Default)]
pub struct Shutdown {
    requested: Arc<AtomicBool>,
    watch_signals: bool,
}

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a flag that is also raised by SIGINT and SIGTERM.
    ///
    /// The handlers are installed without `SA_RESTART`, so a pending `poll`
    /// returns early with `EINTR` and the loop sees the flag immediately.
    pub fn with_signals() -> Result<Self> {
        install_handler(libc::SIGINT)?;
        install_handler(libc::SIGTERM)?;

        Ok(Self {
            requested: Arc::new(AtomicBool::new(false)),
            watch_signals: true,
        })
    }

    pub fn request(&self) {
        self.requested.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
            || (self.watch_signals && SIGNALLED.load(Ordering::SeqCst))
    }
}

extern "C" fn on_signal(_signal: libc::c_int) {
    SIGNALLED.store(true, Ordering::SeqCst);
}

fn install_handler(signal: libc::c_int) -> Result<()> {
    let mut action: libc::sigaction = unsafe { std::mem::zeroed() };
    action.sa_sigaction = on_signal as extern "C" fn(libc::c_int) as libc::sighandler_t;
    action.sa_flags = 0;
    unsafe { libc::sigemptyset(&mut action.sa_mask) };

    Errno::result(unsafe { libc::sigaction(signal, &action, ptr::null_mut()) })
        .map_err(|err| ServerError::Signal { source: err.into() })?;

    Ok(())
}
