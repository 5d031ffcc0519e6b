//! HTTP/1.1 request-line parsing.
//!
//! Only the request line is parsed here; header lines are read one at a time
//! by the router and fed into [`Headers`](super::Headers).

use thiserror::Error;

use super::Method;

/// Errors that can occur while interpreting a request line.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("request line is empty")]
    Blank,

    #[error("request line has no target")]
    MissingTarget,

    #[error("unsupported method: {0}")]
    UnknownMethod(String),
}

/// The first line of an HTTP request, split into its tokens.
///
/// The method token is kept verbatim; [`RequestLine::method`] maps it onto
/// [`Method`] so that unsupported methods can be routed to a 404 instead of
/// being rejected as malformed.
///
/// # Examples
///
/// ```
/// use rawhttp::http::{Method, RequestLine};
///
/// let line = RequestLine::parse("GET /echo/abc HTTP/1.1").unwrap();
/// assert_eq!(line.method().unwrap(), Method::Get);
/// assert_eq!(line.target(), "/echo/abc");
/// assert_eq!(line.version(), Some("HTTP/1.1"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestLine {
    method: String,
    target: String,
    version: Option<String>,
}

impl RequestLine {
    /// Parses a request line.
    ///
    /// Tokens are separated by runs of whitespace.
    ///
    /// # Errors
    ///
    /// - [`RequestError::Blank`]: the line is empty or whitespace only.
    /// - [`RequestError::MissingTarget`]: fewer than two tokens are present.
    pub fn parse(line: &str) -> Result<Self, RequestError> {
        let mut tokens = line.split_whitespace();

        let method = tokens.next().ok_or(RequestError::Blank)?;
        let target = tokens.next().ok_or(RequestError::MissingTarget)?;
        let version = tokens.next();

        Ok(Self {
            method: method.to_owned(),
            target: target.to_owned(),
            version: version.map(str::to_owned),
        })
    }

    /// Returns the method token as sent by the client.
    pub fn method_token(&self) -> &str {
        &self.method
    }

    /// Parses the method token (case-insensitive).
    pub fn method(&self) -> Result<Method, RequestError> {
        self.method.parse()
    }

    /// Returns the request target (path), undecoded.
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Returns the protocol version token, if the client sent one.
    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }
}
