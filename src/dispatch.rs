//! Request dispatch: one request, one process.
//!
//! For every request the [`Dispatcher`]:
//!
//! 1. opens a `request` span carrying the URI and method,
//! 2. builds the argument list (see [`command_args`]),
//! 3. borrows an output buffer from the [`BufferPool`],
//! 4. spawns the program with stdout *and* stderr on the same pipe and the
//!    request body on stdin,
//! 5. waits for the process, then answers `200` with the captured bytes or
//!    `500` with a description of the failure.
//!
//! # Cancellation
//!
//! There are two ways a request ends early.
//!
//! - **Client disconnect.** hyper drops the request future. The child was
//!   spawned with `kill_on_drop`, so dropping it sends SIGKILL, and the
//!   buffer guard hands the buffer back to the pool on its way out.
//! - **Server shutdown.** The server flips the shutdown channel. The
//!   dispatcher kills and reaps the child itself and answers `500`.
//!
//! Either way no process outlives its request.

use std::ffi::OsString;
use std::future::pending;
use std::io;
use std::path::PathBuf;
use std::pin::pin;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Instant;

use bytes::BytesMut;
use http_body::Body as HttpBody;
use http_body_util::BodyExt;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::unix::pipe;
use tokio::process::{ChildStdin, Command};
use tokio::sync::watch;
use tracing::{Instrument, error, info, info_span};

use crate::error::CommandError;
use crate::pool::BufferPool;
use crate::request::command_args;
use crate::response::{self, Body};

/// Runs the configured program once per request.
///
/// Cheap to share: wrap it in an `Arc` and call [`dispatch`](Self::dispatch)
/// from as many tasks as you like. Nothing but the buffer pool is shared
/// between requests.
pub struct Dispatcher {
    program: PathBuf,
    pool: Arc<BufferPool>,
    shutdown: watch::Receiver<bool>,
}

impl Dispatcher {
    /// A dispatcher for `program` with its own buffer pool.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self::with_pool(program, Arc::new(BufferPool::new()))
    }

    pub fn with_pool(program: impl Into<PathBuf>, pool: Arc<BufferPool>) -> Self {
        // A receiver whose sender is gone never reports shutdown.
        let (_, shutdown) = watch::channel(false);
        Self { program: program.into(), pool, shutdown }
    }

    /// Kills running commands once `shutdown` becomes `true`.
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn program(&self) -> &std::path::Path {
        &self.program
    }

    pub fn pool(&self) -> &Arc<BufferPool> {
        &self.pool
    }

    /// Handles one request from start to finish.
    ///
    /// Never fails: every error is logged and turned into a `500`.
    pub async fn dispatch<B>(&self, req: http::Request<B>) -> http::Response<Body>
    where
        B: HttpBody,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let span = info_span!("request", path = %req.uri(), method = %req.method());
        self.handle(req).instrument(span).await
    }

    async fn handle<B>(&self, req: http::Request<B>) -> http::Response<Body>
    where
        B: HttpBody,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let (parts, body) = req.into_parts();
        let args = command_args(&parts);

        let mut output = BufferPool::acquire(&self.pool);

        let start = Instant::now();
        let result = self.run(args, body, &mut output).await;
        let duration = start.elapsed();

        match result {
            Ok(()) => {
                info!(?duration, "success");
                response::output(&output)
            }
            Err(err) => {
                error!(error = %err, ?duration, "unable to run command");
                response::failure(&err)
            }
        }
    }

    /// Spawns the program and drives it to completion.
    ///
    /// On return the child has exited and been reaped, or was killed.
    async fn run<B>(
        &self,
        args: Vec<OsString>,
        body: B,
        output: &mut BytesMut,
    ) -> Result<(), CommandError>
    where
        B: HttpBody,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let (sink, reader) = pipe::pipe().map_err(CommandError::Spawn)?;
        let sink = sink.into_blocking_fd().map_err(CommandError::Spawn)?;
        let sink_err = sink.try_clone().map_err(CommandError::Spawn)?;

        // The command, and with it our copies of the pipe's write end, must
        // be dropped right after spawning or the reader never sees EOF.
        let mut child = {
            let mut cmd = Command::new(&self.program);
            cmd.args(args)
                .stdin(Stdio::piped())
                .stdout(Stdio::from(sink))
                .stderr(Stdio::from(sink_err))
                .kill_on_drop(true);
            cmd.spawn().map_err(CommandError::Spawn)?
        };

        let stdin = child.stdin.take();
        let mut shutdown = self.shutdown.clone();

        let outcome = {
            let finished = async {
                let (fed, captured, status) =
                    tokio::join!(feed(body, stdin), capture(reader, output), child.wait());

                let status = status.map_err(CommandError::Wait)?;
                if !status.success() {
                    return Err(CommandError::Exit(status));
                }
                fed?;
                captured.map_err(CommandError::Output)
            };

            tokio::select! {
                res = finished => Some(res),
                () = cancelled(&mut shutdown) => None,
            }
        };

        match outcome {
            Some(res) => res,
            None => {
                // Fails only if the child already exited; either way it is gone.
                let _ = child.kill().await;
                Err(CommandError::Cancelled)
            }
        }
    }
}

/// Copies the request body into the command's stdin, then closes it.
///
/// A command that exits or closes stdin before reading everything is not an
/// error; the rest of the body is discarded.
async fn feed<B>(body: B, stdin: Option<ChildStdin>) -> Result<(), CommandError>
where
    B: HttpBody,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let Some(mut stdin) = stdin else { return Ok(()) };
    let mut body = pin!(body);

    while let Some(frame) = body.frame().await {
        let frame = frame.map_err(|e| CommandError::Body(e.into()))?;
        let Ok(mut data) = frame.into_data() else { continue };

        match stdin.write_all_buf(&mut data).await {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::BrokenPipe => return Ok(()),
            Err(e) => return Err(CommandError::Input(e)),
        }
    }

    // Dropping `stdin` here is what closes the command's input.
    Ok(())
}

/// Reads the combined stdout/stderr pipe until every writer has closed it.
async fn capture(mut reader: pipe::Receiver, output: &mut BytesMut) -> io::Result<()> {
    while reader.read_buf(output).await? != 0 {}
    Ok(())
}

/// Resolves once shutdown is requested; never, if it cannot be.
pub(crate) async fn cancelled(shutdown: &mut watch::Receiver<bool>) {
    if shutdown.wait_for(|stop| *stop).await.is_err() {
        pending::<()>().await;
    }
}
