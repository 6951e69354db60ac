//! Minimal HTTP responder.
//!
//! Only the request line is looked at; headers and body are never parsed.
//!
//! ## Protocol Format
//!
//! ```text
//! Request:  GET /healthcheck HTTP/1.1\r\n...
//! Response: HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\n\r\nOK
//!
//! Request:  <anything else>
//! Response: HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\n\r\nWell, hello there!
//! ```
//!
//! Each connection gets one read and at most one write, then it is closed.
//! There is no keep-alive.

pub mod handler;
pub mod parser;

pub use handler::{handle_connection, Outcome};
