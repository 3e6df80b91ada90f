//! # shelld
//!
//! Turn any executable into an HTTP endpoint.
//!
//! Each request runs the configured program once. The request becomes the
//! program's argument list and standard input; whatever the program writes
//! to stdout and stderr becomes the response body.
//!
//! ```text
//! GET /foo?x=1          ──▶  script GET /foo?x=1 accept */* host example.com
//! body                  ──▶  stdin
//! 200 + output          ◀──  exit 0, stdout+stderr
//! 500 + error line      ◀──  non-zero exit, launch failure, cancellation
//! ```
//!
//! ## The contract
//!
//! - One fresh process per request. No worker pool, no state between
//!   requests.
//! - The method and URI reach the program exactly as received. Each header
//!   name is forwarded once, with its first value. Header order is not
//!   specified.
//! - stdout and stderr share one pipe, so their interleaving is preserved but
//!   which stream a byte came from is not.
//! - On failure the program's output is discarded; the client only sees a
//!   one-line error.
//! - A process never outlives its request: client disconnect and server
//!   shutdown both kill it.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use shelld::{Dispatcher, Server};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), shelld::Error> {
//!     let server = Server::bind("127.0.0.1:8080".parse().unwrap()).await?;
//!     server.serve(Dispatcher::new("./handler.sh")).await
//! }
//! ```

#[cfg(not(unix))]
compile_error!("shelld needs Unix pipes to merge a command's stdout and stderr");

pub mod config;
pub mod logging;

mod dispatch;
mod error;
mod pool;
mod request;
mod response;
mod server;

pub use dispatch::Dispatcher;
pub use error::{CommandError, Error};
pub use pool::{BufferPool, PoolStats, PooledBuffer};
pub use request::command_args;
pub use response::Body;
pub use server::Server;
