use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use rawhttp::{Config, Server, ServerError, Supervisor, routes};

#[tokio::main]
async fn main() -> Result<(), ServerError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let config = Config::parse();
    if let Some(directory) = &config.directory {
        info!(directory = %directory.display(), "serving files");
    }

    let router = routes::build(config.directory.clone());
    let server = Server::bind(config.address(), router, Arc::new(Supervisor::new())).await?;

    let shutdown = CancellationToken::new();
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("shutdown requested");
                trigger.cancel();
            }
            Err(e) => error!(error = %e, "failed to listen for shutdown signal"),
        }
    });

    server.run(&shutdown).await
}
