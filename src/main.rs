//! hello-there: a tiny HTTP responder
//!
//! Answers every request on a TCP port with a canned `text/plain` body:
//! - `/healthcheck` gets `OK`, for load balancers and monitors
//! - every other path gets `Well, hello there!`
//!
//! Features:
//! - One read and one write per connection, then close
//! - Sequential or thread-per-connection scheduling
//! - Configuration via CLI arguments or TOML file

mod config;
mod connection;
mod listener;
mod logging;
mod protocols;
mod server;

use config::Config;
use server::Server;
use tracing::{error, info, Dispatch};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load()?;

    // Logging handle, installed per scope rather than globally
    let dispatch = logging::build(&config.log_level);

    tracing::dispatcher::with_default(&dispatch, || run(&config, &dispatch))
}

/// Bind and serve forever. Only startup failures return.
fn run(config: &Config, dispatch: &Dispatch) -> Result<(), Box<dyn std::error::Error>> {
    info!(
        listen = %config.listen,
        concurrency = ?config.concurrency,
        "Starting hello-there server"
    );

    let server = Server::bind(config, dispatch.clone()).map_err(|e| {
        error!(error = %e, "Startup failed");
        e
    })?;

    server.run();
    Ok(())
}
