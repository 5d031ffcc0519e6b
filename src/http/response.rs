//! HTTP/1.1 response value.
//!
//! A [`Response`] is a status, an optional status phrase, and an optional
//! [`Content`] body. Serialization happens in
//! [`Session::send`](crate::session::Session::send), which streams the body
//! instead of buffering it.

use super::{Content, StatusCode};

/// An HTTP/1.1 response, ready to be sent.
///
/// # Examples
///
/// ```
/// use rawhttp::http::{Content, Response, StatusCode};
///
/// let response = Response::new(StatusCode::Ok).content(Content::text("hi"));
/// assert_eq!(response.status(), StatusCode::Ok);
/// assert_eq!(response.reason(), "OK");
/// assert!(response.has_content());
/// ```
#[derive(Debug)]
pub struct Response {
    status: StatusCode,
    phrase: Option<String>,
    content: Option<Content>,
}

impl Response {
    /// Creates a new response with the given status and no body.
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            phrase: None,
            content: None,
        }
    }

    /// Creates a `200` response with a text body.
    pub fn text(body: impl Into<String>) -> Self {
        Self::new(StatusCode::Ok).content(Content::text(body))
    }

    /// Overrides the status phrase written on the status line.
    #[must_use]
    pub fn phrase(mut self, phrase: impl Into<String>) -> Self {
        self.phrase = Some(phrase.into());
        self
    }

    /// Sets the response body.
    #[must_use]
    pub fn content(mut self, content: Content) -> Self {
        self.content = Some(content);
        self
    }

    /// Returns the status code of this response.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Returns the status phrase, falling back to the status name.
    pub fn reason(&self) -> &str {
        self.phrase.as_deref().unwrap_or(self.status.name())
    }

    /// Returns `true` when the response carries a non-empty body.
    ///
    /// Responses without one are sent without `Content-Type` and
    /// `Content-Length` headers.
    pub fn has_content(&self) -> bool {
        self.content.as_ref().is_some_and(|c| !c.is_empty())
    }

    /// Returns the body, if any.
    pub fn body(&self) -> Option<&Content> {
        self.content.as_ref()
    }

    /// Consumes the response, yielding its body.
    pub(crate) fn into_content(self) -> Option<Content> {
        self.content
    }
}

impl Default for Response {
    fn default() -> Self {
        Self::new(StatusCode::Ok)
    }
}

impl From<StatusCode> for Response {
    fn from(status: StatusCode) -> Self {
        Self::new(status)
    }
}
