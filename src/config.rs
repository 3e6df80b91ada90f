//! Command-line configuration.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use tracing_subscriber::filter::LevelFilter;

use crate::error::Error;

/// shelld - serve HTTP requests by running a script per request
///
/// Every request runs SCRIPT with the method, URI and headers as arguments
/// and the request body on stdin. Whatever the script prints to stdout and
/// stderr becomes the response body.
#[derive(Parser, Debug, Clone)]
#[command(name = "shelld", version, about, long_about)]
pub struct Config {
    /// Executable to run for every request
    #[arg(value_name = "SCRIPT")]
    pub script: PathBuf,

    /// HTTP listen address (`host:port`, or `:port` for all interfaces)
    #[arg(long, default_value = ":8080")]
    pub listen: String,

    #[command(flatten)]
    pub log: LogConfig,
}

/// Logging flags. `RUST_LOG`, when set, overrides `--log-level`.
#[derive(clap::Args, Debug, Clone)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long = "log-level", default_value = "info")]
    pub level: LevelFilter,

    /// Log encoding
    #[arg(long = "log-encoding", value_enum, default_value_t = LogEncoding::Console)]
    pub encoding: LogEncoding,

    /// Colored log levels (console encoding only)
    #[arg(long = "log-color")]
    pub color: bool,

    /// Log outputs: `stderr`, `stdout` or a file path (repeatable)
    #[arg(long = "log-output", value_delimiter = ',', default_value = "stderr")]
    pub outputs: Vec<String>,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, ValueEnum)]
pub enum LogEncoding {
    #[default]
    Console,
    Json,
}

impl Config {
    /// Parse configuration from command line arguments. Exits on bad input.
    pub fn parse_args() -> Self {
        Config::parse()
    }

    /// Resolves `--listen`. The port-only form `:8080` binds every IPv4
    /// interface.
    pub fn listen_addr(&self) -> Result<SocketAddr, Error> {
        let addr = match self.listen.strip_prefix(':') {
            Some(port) => format!("0.0.0.0:{port}"),
            None => self.listen.clone(),
        };
        addr.parse().map_err(|source| Error::Address { addr: self.listen.clone(), source })
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LevelFilter::INFO,
            encoding: LogEncoding::Console,
            color: false,
            outputs: vec!["stderr".to_owned()],
        }
    }
}
