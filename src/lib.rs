//! # rawhttp
//!
//! A small from-scratch HTTP/1.1 server on Tokio.
//!
//! Each accepted connection is served on its own task: the [`router`] reads
//! the request line and headers from a [`session`], runs the matching handler
//! and streams the [`http::Response`] back. Connection tasks are never awaited
//! by the accept loop; a [`supervisor`] reaps them in the background and logs
//! the ones that fail.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use rawhttp::{Server, Supervisor, routes};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let router = routes::build(Some("/tmp/files".into()));
//!     let server = Server::bind("127.0.0.1:4221", router, Arc::new(Supervisor::new())).await?;
//!     println!("Listening on http://{}", server.local_addr());
//!     server.run(&CancellationToken::new()).await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod http;
pub mod router;
pub mod routes;
pub mod server;
pub mod session;
pub mod supervisor;

// ── Convenience re-exports ────────────────────────────────────────────────────
pub use config::Config;
pub use http::{Content, Headers, Method, Response, StatusCode};
pub use router::{HandlerResult, RequestContext, Router};
pub use server::{Server, ServerError};
pub use session::{Session, SessionError};
pub use supervisor::{Supervisor, SupervisorStats};
