//! HTTP/1.1 protocol types.
//!
//! This module provides the wire-level primitives shared by the session and
//! the router: [`Method`], [`StatusCode`], [`Headers`], [`RequestLine`],
//! [`Response`], and the response body type [`Content`].

use std::fmt;

pub mod content;
pub mod headers;
pub mod request;
pub mod response;

pub use content::{Content, FileContent, TextContent};
pub use headers::Headers;
pub use request::{RequestError, RequestLine};
pub use response::Response;

/// Protocol token written at the start of every status line.
pub const PROTOCOL: &str = "HTTP/1.1";

/// An HTTP response status code.
///
/// Only the codes this server can produce are represented.
///
/// # Examples
///
/// ```
/// use rawhttp::http::StatusCode;
///
/// let status = StatusCode::NotFound;
/// assert_eq!(status.as_u16(), 404);
/// assert_eq!(status.name(), "NotFound");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum StatusCode {
    Ok = 200,
    Created = 201,
    BadRequest = 400,
    NotFound = 404,
    InternalServerError = 500,
}

impl StatusCode {
    /// Returns the numeric status code as a `u16`.
    pub fn as_u16(self) -> u16 {
        self as u16
    }

    /// Returns the variant name, used as the status phrase when a response
    /// does not carry its own.
    pub fn name(self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::Created => "Created",
            Self::BadRequest => "BadRequest",
            Self::NotFound => "NotFound",
            Self::InternalServerError => "InternalServerError",
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.as_u16(), self.name())
    }
}

impl From<StatusCode> for u16 {
    fn from(code: StatusCode) -> u16 {
        code.as_u16()
    }
}

/// An HTTP request method.
///
/// Parsing is case-insensitive; anything other than `GET` or `POST` is
/// rejected with [`RequestError::UnknownMethod`].
///
/// # Examples
///
/// ```
/// use rawhttp::http::Method;
///
/// let method: Method = "post".parse().unwrap();
/// assert_eq!(method, Method::Post);
/// assert_eq!(method.as_str(), "POST");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    /// GET: retrieve a representation of the target resource.
    Get,
    /// POST: submit a payload to the target resource.
    Post,
}

impl Method {
    /// Returns the method as its canonical upper-case token.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Method {
    type Err = RequestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("GET") {
            Ok(Self::Get)
        } else if s.eq_ignore_ascii_case("POST") {
            Ok(Self::Post)
        } else {
            Err(RequestError::UnknownMethod(s.to_owned()))
        }
    }
}
