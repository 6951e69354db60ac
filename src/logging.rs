//! Logging handle construction.
//!
//! The subscriber is wrapped in a [`Dispatch`] and handed to the server
//! instead of being installed process-wide. The server installs it as the
//! scoped default for the accept loop and for every connection thread.

use tracing::Dispatch;
use tracing_subscriber::EnvFilter;

/// Build the stdout logging handle. `RUST_LOG` wins over `level`.
pub fn build(level: &str) -> Dispatch {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stdout)
        .finish();

    Dispatch::new(subscriber)
}
