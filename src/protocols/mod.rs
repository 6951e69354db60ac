//! Protocol implementations.
//!
//! - `http`: request-line HTTP responder with a health-check path

pub mod http;
