//! Single-threaded, readiness-driven TCP server.
//!
//! One OS thread serves many concurrent clients by asking `poll(2)` which
//! descriptors are ready and only ever touching those. No socket operation
//! blocks; the only wait in the system is the bounded poll itself.
//!
//! # Architecture
//!
//! - **EventLoop**: Waits for readiness, drains pending accepts, then gives
//!   each ready client one read/respond/close pass
//! - **Poller**: Wraps `poll(2)` behind the `Multiplexer` trait
//! - **Registry**: Ordered watched descriptors, listener fixed at index 0
//! - **TcpListener / TcpStream**: Non-blocking socket primitives
//! - **Respond**: Builds the response bytes from the request bytes
//! - **ServerBuilder**: Fluent builder pattern for loop instantiation
//!
//! # Example
//!
//! ```ignore
//! use pollserver::ServerBuilder;
//!
//! let event_loop = ServerBuilder::new()
//!     .address("127.0.0.1:8080".parse()?)
//!     .build()?;
//! let shutdown = event_loop.shutdown_handle();
//! event_loop.run()?;
//! ```

mod builder;
pub mod config;
pub mod error;
pub mod http;
pub mod net;
pub mod reactor;

pub use builder::ServerBuilder;
pub use config::Config;
pub use error::{Result, ServerError};
pub use http::{Respond, StaticResponse};
pub use reactor::core::{CycleReport, EventLoop, LoopConfig};
pub use reactor::shutdown::Shutdown;
