//! TCP networking primitives.
//!
//! This module provides the non-blocking socket operations the event loop
//! drives:
//! - [`tcp_listener`]: [`TcpListener`] for accepting connections
//! - [`tcp_stream`]: [`TcpStream`] for reading and writing one client
//! - [`socket`]: Owned descriptor with idempotent release
//! - [`utils`]: Address conversion utilities
//!
//! [`TcpListener`]: tcp_listener::TcpListener
//! [`TcpStream`]: tcp_stream::TcpStream

pub mod socket;
pub mod tcp_listener;
pub mod tcp_stream;
pub(crate) mod utils;
