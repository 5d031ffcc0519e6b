//! Command-line and environment configuration.
//!
//! Every flag can also be set through an environment variable; an explicit
//! flag wins over the variable.

use std::path::PathBuf;

use clap::Parser;

/// Default listening port.
pub const DEFAULT_PORT: u16 = 4221;

/// Default listening host, all IPv4 interfaces.
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Server settings.
#[derive(Debug, Clone, Parser)]
#[command(name = "rawhttp", version, about = "A small HTTP/1.1 server")]
pub struct Config {
    /// Directory served and written by the /files/* routes
    #[arg(long, env = "RAWHTTP_DIRECTORY")]
    pub directory: Option<PathBuf>,

    /// Host to bind to
    #[arg(long, env = "RAWHTTP_HOST", default_value = DEFAULT_HOST)]
    pub host: String,

    /// Port to bind to
    #[arg(short, long, env = "RAWHTTP_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,
}

impl Config {
    /// Returns the `host:port` pair the listener binds to.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            directory: None,
            host: DEFAULT_HOST.to_owned(),
            port: DEFAULT_PORT,
        }
    }
}
