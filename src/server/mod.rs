//! Async TCP server using Tokio.
//!
//! Accepts TCP connections and hands each one to the [`Router`] on its own
//! task. The accept loop never waits for those tasks: they are registered with
//! a [`Supervisor`], which reaps them and logs any that fail. One request is
//! served per connection.

use std::net::SocketAddr;
use std::sync::Arc;

use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::router::Router;
use crate::session::{Session, SessionError};
use crate::supervisor::{Supervisor, TaskResult};

/// Errors produced by the server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Session(#[from] SessionError),
}

/// The HTTP server.
///
/// # Examples
///
/// ```rust,no_run
/// use std::sync::Arc;
///
/// use rawhttp::routes;
/// use rawhttp::server::Server;
/// use rawhttp::supervisor::Supervisor;
/// use tokio_util::sync::CancellationToken;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let router = routes::build(None);
///     let server = Server::bind("127.0.0.1:4221", router, Arc::new(Supervisor::new())).await?;
///     server.run(&CancellationToken::new()).await?;
///     Ok(())
/// }
/// ```
pub struct Server {
    listener: TcpListener,
    local_addr: SocketAddr,
    router: Arc<Router>,
    supervisor: Arc<Supervisor>,
}

impl Server {
    /// Binds the server to the given TCP address.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Bind`] if the address cannot be bound
    /// (e.g. port already in use, insufficient permissions).
    pub async fn bind(
        addr: impl AsRef<str>,
        router: Router,
        supervisor: Arc<Supervisor>,
    ) -> Result<Self, ServerError> {
        let addr = addr.as_ref();
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::Bind {
                addr: addr.to_owned(),
                source: e,
            })?;
        let local_addr = listener.local_addr()?;
        Ok(Self {
            listener,
            local_addr,
            router: Arc::new(router),
            supervisor,
        })
    }

    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accepts connections until `shutdown` fires.
    ///
    /// The supervisor is started on a token derived from `shutdown` and
    /// stopped again on the way out. Connections still being served at that
    /// point are left to finish on their own: each connection gets its own
    /// token, which shutdown never cancels.
    ///
    /// # Errors
    ///
    /// Accept failures are logged and skipped, so this currently always
    /// returns `Ok(())`.
    pub async fn run(self, shutdown: &CancellationToken) -> Result<(), ServerError> {
        let token = shutdown.child_token();
        self.supervisor.start(&token).await;
        info!(address = %self.local_addr, "rawhttp listening");

        loop {
            let accepted = tokio::select! {
                _ = token.cancelled() => break,
                accepted = self.listener.accept() => accepted,
            };

            let (stream, peer_addr) = match accepted {
                Ok(pair) => pair,
                Err(e) => {
                    error!(error = %e, "failed to accept connection");
                    continue;
                }
            };

            debug!(peer = %peer_addr, "connection accepted");
            self.supervisor.spawn(serve_connection(
                Arc::clone(&self.router),
                stream,
                peer_addr,
                CancellationToken::new(),
            ));
        }

        self.supervisor.stop().await;
        token.cancel();
        info!(address = %self.local_addr, "rawhttp stopped");
        Ok(())
    }
}

/// Serves the single request of one connection, then closes it.
async fn serve_connection(
    router: Arc<Router>,
    stream: TcpStream,
    peer_addr: SocketAddr,
    cancel: CancellationToken,
) -> TaskResult {
    let mut session = Session::from_tcp(stream);
    let result = router.handle(&mut session, &cancel).await;

    if let Err(e) = session.close().await {
        debug!(peer = %peer_addr, error = %e, "error while closing connection");
    }
    debug!(peer = %peer_addr, "connection closed");
    result
}
