//! Connection state machine for one accepted TCP connection.
//!
//! A connection is owned by exactly one handler invocation. It walks
//! `Accepted -> Reading -> {Disconnected | Parsed} -> {Responded | Skipped}
//! -> Closed`, and the underlying stream is closed exactly once whichever
//! path is taken, including unwinding.

use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use tracing::{debug, trace};

/// A byte stream the handler can read a request from and write a response to.
pub trait Transport: Read + Write {
    /// Remote address, if known.
    fn peer_addr(&self) -> Option<SocketAddr>;

    /// Release the stream. Called exactly once per connection.
    fn close(&mut self) -> io::Result<()>;
}

impl Transport for TcpStream {
    fn peer_addr(&self) -> Option<SocketAddr> {
        TcpStream::peer_addr(self).ok()
    }

    fn close(&mut self) -> io::Result<()> {
        // the descriptor itself is released when the stream is dropped
        self.shutdown(Shutdown::Both)
    }
}

/// Current state of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    /// Handed over by the listener, nothing read yet.
    Accepted,
    /// Waiting on the single read.
    Reading,
    /// Peer went away before sending a request.
    Disconnected,
    /// Request line extracted from the read buffer.
    Parsed,
    /// Response written in full.
    Responded,
    /// No complete response was written.
    Skipped,
    /// Stream released. Terminal.
    Closed,
}

/// A single client connection.
#[derive(Debug)]
pub struct Connection<S: Transport> {
    stream: S,
    state: ConnState,
    /// Unique id, used only for log correlation.
    id: u64,
}

impl<S: Transport> Connection<S> {
    /// Wrap a freshly accepted stream.
    pub fn new(stream: S, id: u64) -> Self {
        Self {
            stream,
            state: ConnState::Accepted,
            id,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn state(&self) -> ConnState {
        self.state
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.stream.peer_addr()
    }

    /// Mutable access to the stream for the single read and write.
    pub fn stream_mut(&mut self) -> &mut S {
        &mut self.stream
    }

    /// Move to `next`. Transitions out of `Closed` are ignored.
    pub fn transition(&mut self, next: ConnState) {
        if self.state == ConnState::Closed {
            return;
        }
        trace!(conn_id = self.id, from = ?self.state, to = ?next, "State change");
        self.state = next;
    }

    /// Release the stream. Later calls are no-ops.
    pub fn close(&mut self) {
        if self.state == ConnState::Closed {
            return;
        }
        self.transition(ConnState::Closed);

        // peer may already be gone
        if let Err(e) = self.stream.close() {
            debug!(conn_id = self.id, error = %e, "Socket shutdown failed");
        }
        debug!(conn_id = self.id, "Connection closed");
    }
}

impl<S: Transport> Drop for Connection<S> {
    fn drop(&mut self) {
        self.close();
    }
}


#[cfg(test)]
mod tests {
    use super::mock::{MockStream, ReadScript};
    use super::*;

    #[test]
    fn test_connection_state_transitions() {
        let (stream, _) = MockStream::new(ReadScript::Bytes(Vec::new()));
        let mut conn = Connection::new(stream, 7);

        assert_eq!(conn.state(), ConnState::Accepted);
        assert_eq!(conn.id(), 7);

        conn.transition(ConnState::Reading);
        assert_eq!(conn.state(), ConnState::Reading);

        conn.transition(ConnState::Parsed);
        conn.transition(ConnState::Responded);
        assert_eq!(conn.state(), ConnState::Responded);

        conn.close();
        assert_eq!(conn.state(), ConnState::Closed);

        conn.transition(ConnState::Reading);
        assert_eq!(conn.state(), ConnState::Closed);
    }

    #[test]
    fn test_close_is_idempotent() {
        let (stream, observed) = MockStream::new(ReadScript::Bytes(Vec::new()));
        let mut conn = Connection::new(stream, 1);

        conn.close();
        conn.close();
        drop(conn);

        assert_eq!(observed.closes.get(), 1);
    }

    #[test]
    fn test_drop_closes() {
        let (stream, observed) = MockStream::new(ReadScript::Bytes(Vec::new()));
        let conn = Connection::new(stream, 1);
        drop(conn);

        assert_eq!(observed.closes.get(), 1);
    }

    #[test]
    fn test_unwinding_closes() {
        let (stream, observed) = MockStream::new(ReadScript::Bytes(Vec::new()));

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || {
            let _conn = Connection::new(stream, 1);
            panic!("handler blew up");
        }));

        assert!(result.is_err());
        assert_eq!(observed.closes.get(), 1);
    }
}
