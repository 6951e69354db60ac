//! Accept loop.
//!
//! Takes connections from the listener and runs the HTTP handler on each.
//! In sequential mode connection N+1 is not accepted until connection N is
//! closed. In thread-per-connection mode every connection gets its own OS
//! thread running the same handler.

use crate::config::{Concurrency, Config};
use crate::connection::Connection;
use crate::listener::Listener;
use crate::protocols::http::{self, Outcome};
use std::net::{SocketAddr, TcpStream};
use std::thread;
use tracing::{debug, error, info, Dispatch};

/// Server instance
pub struct Server {
    listener: Listener,
    concurrency: Concurrency,
    dispatch: Dispatch,
}

impl Server {
    /// Bind the configured address. Failure here is fatal for the process.
    pub fn bind(config: &Config, dispatch: Dispatch) -> Result<Self, ServerError> {
        let addr: SocketAddr = config
            .listen
            .parse()
            .map_err(|e| ServerError::InvalidAddress(config.listen.clone(), e))?;

        let listener = Listener::bind(addr).map_err(|e| ServerError::Bind(addr, e))?;

        Ok(Server {
            listener,
            concurrency: config.concurrency,
            dispatch,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept and handle connections until the process is killed.
    pub fn run(mut self) {
        let dispatch = self.dispatch.clone();
        tracing::dispatcher::with_default(&dispatch, || {
            if let Ok(addr) = self.listener.local_addr() {
                info!(address = %addr, concurrency = ?self.concurrency, "Server listening");
            }

            for accepted in self.listener.incoming() {
                match accepted {
                    Ok(conn) => {
                        debug!(conn_id = conn.id(), peer = ?conn.peer_addr(), "New connection");
                        match self.concurrency {
                            Concurrency::Sequential => {
                                let outcome = http::handle_connection(conn);
                                log_outcome(outcome);
                            }
                            Concurrency::ThreadPerConnection => {
                                spawn_handler(conn, self.dispatch.clone());
                            }
                        }
                    }
                    Err(e) => {
                        error!(error = %e, "Failed to accept connection");
                    }
                }
            }
        });
    }
}

/// Run one connection on its own thread with the logging handle installed.
fn spawn_handler(conn: Connection<TcpStream>, dispatch: Dispatch) {
    let id = conn.id();
    let spawned = thread::Builder::new()
        .name(format!("conn-{id}"))
        .spawn(move || {
            tracing::dispatcher::with_default(&dispatch, || {
                log_outcome(http::handle_connection(conn));
            });
        });

    // the closure, and the connection with it, is dropped on failure
    if let Err(e) = spawned {
        error!(conn_id = id, error = %e, "Failed to spawn connection thread");
    }
}

fn log_outcome(outcome: Outcome) {
    debug!(?outcome, "Connection handled");
}

/// Startup errors. Per-connection failures never surface here.
#[derive(Debug)]
pub enum ServerError {
    InvalidAddress(String, std::net::AddrParseError),
    Bind(SocketAddr, std::io::Error),
}

impl std::fmt::Display for ServerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServerError::InvalidAddress(addr, e) => {
                write!(f, "Invalid listen address '{}': {}", addr, e)
            }
            ServerError::Bind(addr, e) => {
                write!(f, "Failed to bind {}: {}", addr, e)
            }
        }
    }
}

impl std::error::Error for ServerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ServerError::InvalidAddress(_, e) => Some(e),
            ServerError::Bind(_, e) => Some(e),
        }
    }
}
