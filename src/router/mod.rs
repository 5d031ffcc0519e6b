//! Request routing: map HTTP methods and path patterns to handler functions.
//!
//! This module provides [`Router`], which reads a request head from a
//! [`Session`], picks a handler, runs it and sends whatever it returns. Two
//! pattern styles are supported:
//!
//! | Pattern       | Example match          | Remainder handed to the handler |
//! |---------------|------------------------|---------------------------------|
//! | `/user-agent` | `/user-agent`          | *(empty)*                       |
//! | `/echo/*`     | `/echo/abc/def`        | `abc/def`                       |
//!
//! For each method, exact patterns are looked up first. Wildcard patterns are
//! then tried in registration order and the first whose prefix matches wins.
//! The table is built once and only read afterwards, so a single `Router` can
//! be shared by every connection task without locking.
//!
//! Per request the router moves through:
//!
//! ```text
//! read request line ──blank──────────────► 500 "(╯°□°）╯︵ ┻━┻"
//!        │         ──fewer than 2 tokens─► 400
//!        ▼
//!   match method + path ──no route──────► 404
//!        │
//!        ▼
//!   read headers (≤ 100 lines, stop at blank line)
//!        │
//!        ▼
//!   run handler ─► send response
//! ```

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::http::{Headers, Method, RequestError, RequestLine, Response, StatusCode};
use crate::server::ServerError;
use crate::session::{Session, SessionError};

/// Status phrase sent when the request line is empty.
pub const BLANK_REQUEST_PHRASE: &str = "(╯°□°）╯︵ ┻━┻";

/// Maximum number of header lines read per request.
pub const MAX_HEADERS: usize = 100;

/// Heap-allocated, `Send` future borrowing for `'a`.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// What a handler produces: a response to send, or a fault for the connection task.
pub type HandlerResult = Result<Response, ServerError>;

/// Type-erased async handler.
///
/// Handlers borrow the connection through their [`RequestContext`] for as
/// long as their future runs, which is what lets them read a request body.
/// The usual way to get one is to write an `async fn` taking a
/// [`RequestContext`] and register `|ctx| Box::pin(handler(ctx))`.
pub type Handler = Arc<
    dyn for<'a> Fn(RequestContext<'a>) -> BoxFuture<'a, HandlerResult> + Send + Sync + 'static,
>;

/// Everything a handler gets to see about the request it serves.
pub struct RequestContext<'a> {
    /// The connection the request arrived on; the body, if any, is still unread.
    pub session: &'a mut Session,
    /// Parsed request method.
    pub method: Method,
    /// Full request target, undecoded.
    pub path: String,
    /// Part of the path after a wildcard prefix; empty for exact routes.
    pub remainder: String,
    /// Request headers, first occurrence of a name wins.
    pub headers: Headers,
    /// Cancels body reads on this connection; pass it to [`Session::read_exact_into`].
    pub cancel: &'a CancellationToken,
}

/// A registered path matcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoutePattern {
    /// Matches one path exactly, e.g. `/user-agent`.
    Exact(String),
    /// Matches any path starting with the prefix, e.g. `/files/` for `/files/*`.
    PrefixWildcard(String),
}

impl RoutePattern {
    /// Parses a pattern string; a trailing `*` makes it a prefix wildcard.
    ///
    /// # Examples
    ///
    /// ```
    /// use rawhttp::router::RoutePattern;
    ///
    /// assert_eq!(
    ///     RoutePattern::parse("/echo/*"),
    ///     RoutePattern::PrefixWildcard("/echo/".into())
    /// );
    /// assert_eq!(RoutePattern::parse("/"), RoutePattern::Exact("/".into()));
    /// ```
    pub fn parse(pattern: &str) -> Self {
        match pattern.strip_suffix('*') {
            Some(prefix) => Self::PrefixWildcard(prefix.to_owned()),
            None => Self::Exact(pattern.to_owned()),
        }
    }

    /// Matches `path`, returning the unmatched remainder on success.
    pub fn matches<'p>(&self, path: &'p str) -> Option<&'p str> {
        match self {
            Self::Exact(exact) => (exact == path).then_some(""),
            Self::PrefixWildcard(prefix) => path.strip_prefix(prefix.as_str()),
        }
    }
}

// A wildcard pattern paired with its handler.
struct Route {
    pattern: RoutePattern,
    handler: Handler,
}

// All routes registered for one method.
#[derive(Default)]
struct MethodTable {
    exact: HashMap<String, Handler>,
    wildcards: Vec<Route>,
}

impl MethodTable {
    fn find<'p>(&self, path: &'p str) -> Option<(&Handler, &'p str)> {
        if let Some(handler) = self.exact.get(path) {
            return Some((handler, ""));
        }

        self.wildcards.iter().find_map(|route| {
            route
                .pattern
                .matches(path)
                .map(|remainder| (&route.handler, remainder))
        })
    }
}

/// HTTP request router and dispatcher.
///
/// # Examples
///
/// ```rust,no_run
/// use rawhttp::http::Response;
/// use rawhttp::router::{HandlerResult, RequestContext, Router};
///
/// async fn echo(ctx: RequestContext<'_>) -> HandlerResult {
///     Ok(Response::text(ctx.remainder))
/// }
///
/// let mut router = Router::new();
/// router.get("/echo/*", |ctx| Box::pin(echo(ctx)));
/// ```
#[derive(Default)]
pub struct Router {
    tables: HashMap<Method, MethodTable>,
    len: usize,
}

impl Router {
    /// Creates a new, empty `Router` with no registered routes.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler for `GET` requests matching `pattern`.
    pub fn get<F>(&mut self, pattern: &str, handler: F)
    where
        F: for<'a> Fn(RequestContext<'a>) -> BoxFuture<'a, HandlerResult> + Send + Sync + 'static,
    {
        self.route(Method::Get, pattern, handler);
    }

    /// Registers a handler for `POST` requests matching `pattern`.
    pub fn post<F>(&mut self, pattern: &str, handler: F)
    where
        F: for<'a> Fn(RequestContext<'a>) -> BoxFuture<'a, HandlerResult> + Send + Sync + 'static,
    {
        self.route(Method::Post, pattern, handler);
    }

    /// Registers a handler for `method` requests matching `pattern`.
    ///
    /// Registering the same exact pattern twice keeps the first handler.
    pub fn route<F>(&mut self, method: Method, pattern: &str, handler: F)
    where
        F: for<'a> Fn(RequestContext<'a>) -> BoxFuture<'a, HandlerResult> + Send + Sync + 'static,
    {
        let handler: Handler = Arc::new(handler);
        let table = self.tables.entry(method).or_default();

        match RoutePattern::parse(pattern) {
            RoutePattern::Exact(path) => {
                if table.exact.contains_key(&path) {
                    debug!(method = %method, path = %path, "ignoring duplicate route");
                    return;
                }
                table.exact.insert(path, handler);
            }
            pattern => table.wildcards.push(Route { pattern, handler }),
        }
        self.len += 1;
    }

    /// Returns the number of routes that can match, duplicates excluded.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if no routes have been registered.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Finds the handler for `method` and `path`, with the wildcard remainder.
    pub fn find<'p>(&self, method: Method, path: &'p str) -> Option<(&Handler, &'p str)> {
        self.tables.get(&method)?.find(path)
    }

    /// Serves one request from `session`.
    ///
    /// Transport failures are contained here: a peer reset is logged at info
    /// level, any other transport error at error level, and both end the
    /// request normally. Faults raised by handlers themselves are returned
    /// to the caller.
    pub async fn handle(
        &self,
        session: &mut Session,
        cancel: &CancellationToken,
    ) -> Result<(), ServerError> {
        match self.dispatch(session, cancel).await {
            Err(ServerError::Session(e)) if e.is_reset() => {
                info!(error = %e, "client disconnected");
                Ok(())
            }
            Err(ServerError::Session(e @ SessionError::LineTooLong { .. })) => {
                warn!(error = %e, "rejecting oversized request head");
                if let Err(e) = session.send(Response::new(StatusCode::BadRequest)).await {
                    debug!(error = %e, "failed to send 400");
                }
                Ok(())
            }
            Err(ServerError::Session(e)) => {
                error!(error = %e, "transport error");
                Ok(())
            }
            other => other,
        }
    }

    async fn dispatch(
        &self,
        session: &mut Session,
        cancel: &CancellationToken,
    ) -> Result<(), ServerError> {
        let line = session.read_line().await?.unwrap_or_default();

        let request_line = match RequestLine::parse(&line) {
            Ok(request_line) => request_line,
            Err(RequestError::Blank) => {
                debug!("blank request line");
                let response =
                    Response::new(StatusCode::InternalServerError).phrase(BLANK_REQUEST_PHRASE);
                session.send(response).await?;
                return Ok(());
            }
            Err(e) => {
                debug!(error = %e, line = %line, "malformed request line");
                session.send(Response::new(StatusCode::BadRequest)).await?;
                return Ok(());
            }
        };

        let path = request_line.target();
        let matched = request_line
            .method()
            .ok()
            .and_then(|method| Some((method, self.find(method, path)?)));

        let Some((method, (handler, remainder))) = matched else {
            debug!(method = %request_line.method_token(), path = %path, "no route");
            session.send(Response::new(StatusCode::NotFound)).await?;
            return Ok(());
        };

        let headers = read_headers(session).await?;
        debug!(method = %method, path = %path, headers = headers.len(), "dispatching request");

        let ctx = RequestContext {
            session: &mut *session,
            method,
            path: path.to_owned(),
            remainder: remainder.to_owned(),
            headers,
            cancel,
        };
        let response = handler(ctx).await?;

        debug!(status = response.status().as_u16(), "sending response");
        session.send(response).await?;
        Ok(())
    }
}

// Reads header lines up to the first blank line, skipping lines without a colon.
async fn read_headers(session: &mut Session) -> Result<Headers, SessionError> {
    let mut headers = Headers::new();

    for _ in 0..MAX_HEADERS {
        match session.read_line().await? {
            Some(line) if !line.trim().is_empty() => {
                if !headers.insert_line(&line) {
                    trace!(line = %line, "skipping malformed header");
                }
            }
            _ => break,
        }
    }

    Ok(headers)
}
