use clap::Parser;
use pollserver::{Config, Shutdown};
use std::process::ExitCode;
use tracing::{error, info};

fn main() -> ExitCode {
    let config = Config::parse();

    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .with_max_level(config.log_level)
        .init();

    if let Err(reason) = config.validate() {
        error!(%reason, "invalid configuration");
        return ExitCode::FAILURE;
    }

    let shutdown = match Shutdown::with_signals() {
        Ok(shutdown) => shutdown,
        Err(err) => {
            error!(%err, "startup failed");
            return ExitCode::FAILURE;
        }
    };

    let event_loop = match config.builder().shutdown(shutdown).build() {
        Ok(event_loop) => event_loop,
        Err(err) => {
            error!(%err, "startup failed");
            return ExitCode::FAILURE;
        }
    };

    info!(addr = %config.address(), "serving");

    match event_loop.run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(%err, "server stopped");
            ExitCode::FAILURE
        }
    }
}
