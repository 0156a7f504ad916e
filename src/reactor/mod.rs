//! Readiness-driven event loop.
//!
//! This module holds the single-threaded server core built on `poll(2)`.
//! It includes:
//! - [`core`]: The event loop that accepts, reads, responds and closes
//! - [`poller`]: The readiness multiplexer and its [`Multiplexer`](poller::Multiplexer) seam
//! - [`registry`]: The ordered set of watched descriptors
//! - [`interest`]: Readable/writable interest sets
//! - [`io`]: Per-connection state
//! - [`shutdown`]: The external stop flag

pub mod core;
pub mod interest;
pub mod io;
pub mod poller;
pub mod registry;
pub mod shutdown;
