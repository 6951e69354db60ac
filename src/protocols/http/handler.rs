//! Request handler: one read, at most one write, always closed.

use std::io::{self, ErrorKind, Read, Write};
use tracing::{debug, error, info};

use super::parser::{RequestLine, Route};
use crate::connection::{ConnState, Connection, Transport};

/// Bytes read from a connection. Longer requests are parsed from the prefix.
pub const READ_BUFFER_SIZE: usize = 2048;

/// Result of the single read on a connection.
#[derive(Debug)]
pub enum ReadOutcome {
    /// `n` bytes landed at the start of the buffer.
    Data(usize),
    /// The peer closed or reset before sending anything usable.
    PeerClosed(String),
    /// Any other I/O failure.
    IoError(io::Error),
}

/// What happened to a connection, reported after it is closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The full response for this route was written.
    Responded(Route),
    /// The peer went away before sending a request.
    Disconnected,
    /// Read or write failed; no complete response was sent.
    Failed,
}

/// Read once from `stream` into `buf`.
pub fn read_request<R: Read>(stream: &mut R, buf: &mut [u8]) -> ReadOutcome {
    loop {
        match stream.read(buf) {
            Ok(0) => return ReadOutcome::PeerClosed("end of file reached".to_string()),
            Ok(n) => return ReadOutcome::Data(n),
            // no data was delivered, so this is still the one read attempt
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) if is_peer_gone(e.kind()) => return ReadOutcome::PeerClosed(e.to_string()),
            Err(e) => return ReadOutcome::IoError(e),
        }
    }
}

fn is_peer_gone(kind: ErrorKind) -> bool {
    matches!(
        kind,
        ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::UnexpectedEof
            | ErrorKind::BrokenPipe
    )
}

/// Handle a single client connection to completion.
///
/// The connection is closed before this returns, on every path.
pub fn handle_connection<S: Transport>(mut conn: Connection<S>) -> Outcome {
    let outcome = serve(&mut conn);
    conn.close();
    debug_assert_eq!(conn.state(), ConnState::Closed);
    outcome
}

fn serve<S: Transport>(conn: &mut Connection<S>) -> Outcome {
    let mut buf = [0u8; READ_BUFFER_SIZE];

    conn.transition(ConnState::Reading);
    let n = match read_request(conn.stream_mut(), &mut buf) {
        ReadOutcome::Data(n) => n,
        ReadOutcome::PeerClosed(message) => {
            conn.transition(ConnState::Disconnected);
            error!(conn_id = conn.id(), "Client disconnected: {}", message);
            return Outcome::Disconnected;
        }
        ReadOutcome::IoError(e) => {
            conn.transition(ConnState::Skipped);
            error!(conn_id = conn.id(), "Unexpected error: {}", e);
            return Outcome::Failed;
        }
    };

    let request = RequestLine::parse(&buf[..n]);
    conn.transition(ConnState::Parsed);
    info!(
        conn_id = conn.id(),
        "{} {} {}",
        request.method(),
        request.path(),
        request.version()
    );

    let route = request.route();
    match route {
        Route::Health => info!(conn_id = conn.id(), "Health check request received"),
        Route::Greeting => {
            debug!(conn_id = conn.id(), path = request.path(), "Request received for")
        }
    }

    let response = route.response();
    match conn.stream_mut().write_all(&response) {
        Ok(()) => {
            conn.transition(ConnState::Responded);
            Outcome::Responded(route)
        }
        Err(e) => {
            conn.transition(ConnState::Skipped);
            error!(conn_id = conn.id(), "Unexpected error: {}", e);
            Outcome::Failed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::mock::{MockStream, Observed, ReadScript};
    use crate::logging::capture::{self, CapturedLogs};

    fn run(stream: MockStream) -> (Outcome, CapturedLogs) {
        let (dispatch, logs) = capture::dispatch("info");
        let outcome = tracing::dispatcher::with_default(&dispatch, || {
            handle_connection(Connection::new(stream, 1))
        });
        (outcome, logs)
    }

    fn request(bytes: &[u8]) -> (Outcome, Observed, CapturedLogs) {
        let (stream, observed) = MockStream::new(ReadScript::Bytes(bytes.to_vec()));
        let (outcome, logs) = run(stream);
        (outcome, observed, logs)
    }

    fn body(observed: &Observed) -> String {
        let written = observed.written.borrow();
        let text = String::from_utf8_lossy(&written);
        text.split_once("\r\n\r\n")
            .map(|(_, body)| body.to_string())
            .unwrap_or_default()
    }

    #[test]
    fn test_healthcheck_response() {
        let (outcome, observed, _) = request(b"GET /healthcheck HTTP/1.1\r\n\r\n");

        assert_eq!(outcome, Outcome::Responded(Route::Health));
        assert_eq!(
            &observed.written.borrow()[..],
            b"HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\n\r\nOK"
        );
        assert_eq!(observed.writes.get(), 1);
        assert_eq!(observed.closes.get(), 1);
    }

    #[test]
    fn test_greeting_for_other_paths() {
        for input in [
            &b"GET / HTTP/1.1\r\n\r\n"[..],
            b"POST /api/things HTTP/1.0\r\n\r\n",
            b"GET\r\n",
            b"\r\n",
            b"   ",
            b"garbage",
        ] {
            let (outcome, observed, _) = request(input);
            assert_eq!(outcome, Outcome::Responded(Route::Greeting));
            assert_eq!(body(&observed), "Well, hello there!");
            assert!(observed
                .written
                .borrow()
                .starts_with(b"HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\n\r\n"));
            assert_eq!(observed.closes.get(), 1);
        }
    }

    #[test]
    fn test_request_logging() {
        let (_, _, logs) = request(b"GET /healthcheck HTTP/1.1\r\n\r\n");
        let info = logs.lines_at("INFO");
        assert_eq!(info.len(), 2);
        assert!(info[0].contains("GET /healthcheck HTTP/1.1"));
        assert!(info[1].contains("Health check request received"));

        let (_, _, logs) = request(b"GET / HTTP/1.1\r\n\r\n");
        let info = logs.lines_at("INFO");
        assert_eq!(info.len(), 1);
        assert!(info[0].contains("GET / HTTP/1.1"));
        assert!(logs.lines_at("ERROR").is_empty());
    }

    #[test]
    fn test_peer_closed_before_sending() {
        let (outcome, observed, logs) = request(b"");

        assert_eq!(outcome, Outcome::Disconnected);
        assert_eq!(observed.reads.get(), 1);
        assert_eq!(observed.writes.get(), 0);
        assert_eq!(observed.closes.get(), 1);

        let errors = logs.lines_at("ERROR");
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("Client disconnected"));
        assert!(logs.lines_at("INFO").is_empty());
    }

    #[test]
    fn test_connection_reset_is_a_disconnect() {
        let (stream, observed) =
            MockStream::new(ReadScript::Error(io::ErrorKind::ConnectionReset));
        let (outcome, logs) = run(stream);

        assert_eq!(outcome, Outcome::Disconnected);
        assert_eq!(observed.writes.get(), 0);
        assert_eq!(observed.closes.get(), 1);
        assert_eq!(logs.lines_at("ERROR").len(), 1);
        assert!(logs.contents().contains("Client disconnected: scripted failure"));
    }

    #[test]
    fn test_read_error_is_unexpected() {
        let (stream, observed) = MockStream::new(ReadScript::Error(io::ErrorKind::Other));
        let (outcome, logs) = run(stream);

        assert_eq!(outcome, Outcome::Failed);
        assert_eq!(observed.writes.get(), 0);
        assert_eq!(observed.closes.get(), 1);

        let errors = logs.lines_at("ERROR");
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("Unexpected error: scripted failure"));
    }

    #[test]
    fn test_write_error_is_contained() {
        let (stream, observed) =
            MockStream::new(ReadScript::Bytes(b"GET / HTTP/1.1\r\n\r\n".to_vec()));
        let stream = stream.failing_writes(io::ErrorKind::BrokenPipe);
        let (outcome, logs) = run(stream);

        assert_eq!(outcome, Outcome::Failed);
        assert_eq!(observed.writes.get(), 1);
        assert_eq!(observed.closes.get(), 1);

        let errors = logs.lines_at("ERROR");
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("Unexpected error"));
    }

    #[test]
    fn test_interrupted_read_is_resumed() {
        let (stream, observed) = MockStream::new(ReadScript::InterruptedThen(
            b"GET /healthcheck HTTP/1.1\r\n\r\n".to_vec(),
        ));
        let (outcome, _) = run(stream);

        assert_eq!(outcome, Outcome::Responded(Route::Health));
        assert_eq!(observed.reads.get(), 2);
    }

    #[test]
    fn test_single_read_truncates_long_requests() {
        let mut input = b"GET /".to_vec();
        input.extend(std::iter::repeat(b'a').take(READ_BUFFER_SIZE * 2));
        input.extend_from_slice(b" HTTP/1.1\r\n\r\n");

        let (outcome, observed, logs) = request(&input);

        assert_eq!(outcome, Outcome::Responded(Route::Greeting));
        assert_eq!(observed.reads.get(), 1);
        // version fell past the buffer and was never seen
        assert!(!logs.contents().contains("HTTP/1.1"));
    }

    #[test]
    fn test_read_request_outcomes() {
        let mut buf = [0u8; 16];

        let (mut stream, _) = MockStream::new(ReadScript::Bytes(b"GET".to_vec()));
        assert!(matches!(read_request(&mut stream, &mut buf), ReadOutcome::Data(3)));

        let (mut stream, _) = MockStream::new(ReadScript::Bytes(Vec::new()));
        assert!(matches!(
            read_request(&mut stream, &mut buf),
            ReadOutcome::PeerClosed(_)
        ));

        let (mut stream, _) = MockStream::new(ReadScript::Error(io::ErrorKind::UnexpectedEof));
        assert!(matches!(
            read_request(&mut stream, &mut buf),
            ReadOutcome::PeerClosed(_)
        ));

        let (mut stream, _) = MockStream::new(ReadScript::Error(io::ErrorKind::PermissionDenied));
        assert!(matches!(
            read_request(&mut stream, &mut buf),
            ReadOutcome::IoError(_)
        ));
    }
}
