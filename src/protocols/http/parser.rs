//! HTTP request-line parser and canned responses.

use bytes::BytesMut;

/// Path answered with the health-check body.
pub const HEALTHCHECK_PATH: &str = "/healthcheck";

const HEALTH_BODY: &str = "OK";
const GREETING_BODY: &str = "Well, hello there!";

const RESPONSE_HEAD: &[u8] = b"HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\n\r\n";

/// The first line of a request, split on whitespace.
///
/// Fields are `None` when the line has fewer tokens. Nothing is validated:
/// `"FOO bar"` is a request line with method `FOO`, path `bar` and no version.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestLine {
    pub method: Option<String>,
    pub path: Option<String>,
    pub version: Option<String>,
}

impl RequestLine {
    /// Parse the first line of `input`. Never fails.
    ///
    /// The line ends at the first `\n` (or the end of input when the buffer
    /// was truncated mid-line). Tokens past the third are ignored.
    pub fn parse(input: &[u8]) -> Self {
        let line_end = input
            .iter()
            .position(|&b| b == b'\n')
            .unwrap_or(input.len());
        let line = String::from_utf8_lossy(&input[..line_end]);

        let mut tokens = line.split_ascii_whitespace().map(str::to_string);
        RequestLine {
            method: tokens.next(),
            path: tokens.next(),
            version: tokens.next(),
        }
    }

    pub fn method(&self) -> &str {
        self.method.as_deref().unwrap_or("")
    }

    pub fn path(&self) -> &str {
        self.path.as_deref().unwrap_or("")
    }

    pub fn version(&self) -> &str {
        self.version.as_deref().unwrap_or("")
    }

    /// Pick the response for this request.
    pub fn route(&self) -> Route {
        if self.path.as_deref() == Some(HEALTHCHECK_PATH) {
            Route::Health
        } else {
            Route::Greeting
        }
    }
}

/// Which canned response a request gets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// `/healthcheck`
    Health,
    /// Every other path, including a missing one.
    Greeting,
}

impl Route {
    pub fn body(self) -> &'static str {
        match self {
            Route::Health => HEALTH_BODY,
            Route::Greeting => GREETING_BODY,
        }
    }

    /// The full response: status line, content type, blank line, body.
    pub fn response(self) -> BytesMut {
        let body = self.body();
        let mut response = BytesMut::with_capacity(RESPONSE_HEAD.len() + body.len());
        response.extend_from_slice(RESPONSE_HEAD);
        response.extend_from_slice(body.as_bytes());
        response
    }
}
