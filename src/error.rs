//! Error types.

use std::net::AddrParseError;
use std::process::ExitStatus;

/// The error type returned by shelld's fallible startup operations.
///
/// A failing script is not an `Error`: it becomes a `500` response and a log
/// line (see [`CommandError`]). This type surfaces infrastructure failures:
/// parsing the listen address, opening a log file, binding to a port or
/// accepting a connection. All of them are fatal to the process.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid listen address `{addr}`: {source}")]
    Address {
        addr: String,
        #[source]
        source: AddrParseError,
    },

    #[error("cannot open log output `{path}`: {source}")]
    LogOutput {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot install log subscriber: {0}")]
    Logging(#[from] tracing_subscriber::util::TryInitError),
}

/// Why a single request's command did not complete successfully.
///
/// The `Display` text is what the client receives as the body of the `500`
/// response, so it never includes anything the command itself printed.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    /// The process could not be created (missing binary, permissions, ...).
    #[error("cannot start command: {0}")]
    Spawn(#[source] std::io::Error),

    /// The process ran and exited non-zero, or was killed by a signal.
    #[error("command failed: {0}")]
    Exit(ExitStatus),

    /// The server began shutting down while the process was running.
    #[error("command cancelled: server shutting down")]
    Cancelled,

    #[error("cannot read request body: {0}")]
    Body(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("cannot write command input: {0}")]
    Input(#[source] std::io::Error),

    #[error("cannot read command output: {0}")]
    Output(#[source] std::io::Error),

    #[error("cannot wait for command: {0}")]
    Wait(#[source] std::io::Error),
}
