//! HTTP server and graceful shutdown.
//!
//! Every method on every path goes to the one [`Dispatcher`]; there is no
//! routing. Each connection runs on its own tokio task, so a slow command
//! only holds up its own request.
//!
//! # Shutdown
//!
//! On SIGTERM or Ctrl-C (or when the future given to
//! [`Server::serve_with_shutdown`] resolves) the server:
//! 1. Stops calling `listener.accept()`, so no new connections are made.
//! 2. Flips the shutdown channel: running commands are killed and their
//!    requests answered with `500`.
//! 3. Asks every open connection to close once its current request is done.
//! 4. Waits for every connection task, then returns.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{debug, error, info};

use crate::dispatch::{Dispatcher, cancelled};
use crate::error::Error;

/// The HTTP server.
pub struct Server {
    listener: TcpListener,
}

impl Server {
    /// Binds the listening socket. Pass port `0` to let the OS pick one.
    pub async fn bind(addr: SocketAddr) -> Result<Self, Error> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self { listener })
    }

    /// The address actually bound.
    pub fn local_addr(&self) -> Result<SocketAddr, Error> {
        Ok(self.listener.local_addr()?)
    }

    /// Serves until SIGTERM or Ctrl-C, then shuts down gracefully.
    pub async fn serve(self, dispatcher: Dispatcher) -> Result<(), Error> {
        self.serve_with_shutdown(dispatcher, shutdown_signal()).await
    }

    /// Serves until `signal` resolves, then shuts down gracefully.
    pub async fn serve_with_shutdown(
        self,
        dispatcher: Dispatcher,
        signal: impl Future<Output = ()>,
    ) -> Result<(), Error> {
        let (stop, stopped) = watch::channel(false);
        let dispatcher = Arc::new(dispatcher.with_shutdown(stopped.clone()));

        let mut tasks = tokio::task::JoinSet::new();

        // Futures must not move after the first poll; pin it on the stack so
        // it can be polled again on every loop iteration.
        tokio::pin!(signal);

        loop {
            tokio::select! {
                // Check shutdown first so a signal stops accepting right away,
                // even if more connections are queued.
                biased;

                () = &mut signal => {
                    info!(in_flight = tasks.len(), "shutdown signal received, draining connections");
                    break;
                }

                res = self.listener.accept() => {
                    let (stream, remote_addr) = match res {
                        Ok(v) => v,
                        Err(e) => {
                            error!("accept error: {e}");
                            continue;
                        }
                    };

                    let dispatcher = Arc::clone(&dispatcher);
                    let mut stopped = stopped.clone();
                    // TokioIo adapts tokio's AsyncRead/AsyncWrite to the hyper
                    // IO traits.
                    let io = TokioIo::new(stream);

                    tasks.spawn(async move {
                        // Called once per request on the connection.
                        let svc = service_fn(move |req: hyper::Request<hyper::body::Incoming>| {
                            let dispatcher = Arc::clone(&dispatcher);
                            async move {
                                Ok::<_, std::convert::Infallible>(dispatcher.dispatch(req).await)
                            }
                        });

                        // `auto::Builder` handles both HTTP/1.1 and HTTP/2,
                        // whatever the client negotiates.
                        let builder = ConnBuilder::new(TokioExecutor::new());
                        let conn = builder.serve_connection(io, svc);
                        tokio::pin!(conn);

                        let res = tokio::select! {
                            res = conn.as_mut() => res,
                            () = cancelled(&mut stopped) => {
                                conn.as_mut().graceful_shutdown();
                                conn.await
                            }
                        };

                        match res {
                            Ok(()) => debug!(peer = %remote_addr, "connection closed"),
                            Err(e) => error!(peer = %remote_addr, "connection error: {e}"),
                        }
                    });
                }

                // Reap finished connection tasks so the JoinSet does not grow
                // without bound on long-running servers.
                Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
            }
        }

        // Kill running commands and close idle keep-alive connections.
        let _ = stop.send(true);

        while tasks.join_next().await.is_some() {}

        info!("shelld stopped");
        Ok(())
    }
}

/// Resolves on the first shutdown signal the process receives.
///
/// On Unix this listens for both **SIGTERM** and **SIGINT** (Ctrl-C).
/// Elsewhere only Ctrl-C is available. A handler that cannot be installed
/// simply never fires.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("cannot install Ctrl-C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let sigterm = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("cannot install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    // `pending()` never resolves, so off Unix the SIGTERM arm is disabled.
    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c   => {}
        () = sigterm  => {}
    }
}
