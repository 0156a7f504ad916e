//! # Server configuration
//!
//! Deployment parameters for the `pollserver` binary, read from command-line
//! arguments with environment-variable fallbacks.
//!
//! ## Examples
//!
//! ### CLI
//! ```bash
//! ./pollserver --port 8080 --backlog 256 --poll-timeout-ms 250 --body "ok"
//! ```
//!
//! ### Environment
//! ```bash
//! POLLSERVER_PORT=9000 POLLSERVER_HOST=0.0.0.0 ./pollserver
//! ```

use crate::builder::ServerBuilder;
use crate::http::{DEFAULT_BODY, StaticResponse};

use clap::Parser;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

#[derive(Debug, Clone, Parser)]
#[command(name = "pollserver")]
#[command(about = "Single-threaded poll(2) TCP server answering one request per connection")]
#[command(version)]
pub struct Config {
    /// Address to listen on
    #[arg(long, default_value = "127.0.0.1", env = "POLLSERVER_HOST")]
    pub host: IpAddr,

    /// Port to listen on
    #[arg(short, long, default_value_t = 8080, env = "POLLSERVER_PORT")]
    pub port: u16,

    /// Depth of the kernel queue of established connections
    #[arg(long, default_value_t = 128, env = "POLLSERVER_BACKLOG")]
    pub backlog: i32,

    /// Upper bound on each poll wait, in milliseconds
    #[arg(long = "poll-timeout-ms", default_value_t = 500, env = "POLLSERVER_POLL_TIMEOUT_MS")]
    pub poll_timeout_ms: u64,

    /// Bytes read from one client before it is answered
    #[arg(long, default_value_t = 8192, env = "POLLSERVER_MAX_REQUEST_BYTES")]
    pub max_request_bytes: usize,

    /// Clients tracked at once (0 = unlimited)
    #[arg(long, default_value_t = 0, env = "POLLSERVER_MAX_CONNECTIONS")]
    pub max_connections: usize,

    /// Body of the response sent to every client
    #[arg(long, default_value = DEFAULT_BODY, env = "POLLSERVER_BODY")]
    pub body: String,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long = "log-level", default_value = "info", env = "POLLSERVER_LOG_LEVEL")]
    pub log_level: tracing::Level,
}

impl Config {
    pub fn address(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }

    /// Checks the values clap cannot.
    pub fn validate(&self) -> Result<(), String> {
        if self.backlog <= 0 {
            return Err("backlog must be greater than 0".to_string());
        }
        if self.poll_timeout_ms == 0 {
            return Err("poll timeout must be greater than 0".to_string());
        }
        if self.max_request_bytes == 0 {
            return Err("max request bytes must be greater than 0".to_string());
        }

        Ok(())
    }

    /// A builder carrying every setting in this configuration.
    pub fn builder(&self) -> ServerBuilder {
        ServerBuilder::new()
            .address(self.address())
            .backlog(self.backlog)
            .poll_timeout(self.poll_timeout())
            .max_request_bytes(self.max_request_bytes)
            .max_connections(self.max_connections)
            .responder(StaticResponse::new(&self.body))
    }
}
