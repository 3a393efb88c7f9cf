//! HTTP server and graceful shutdown.
//!
//! Every request is read in full, tagged with an HTTP [`Transport`] and handed
//! to a single [`Handler`]. The server is the outermost recovery layer: a
//! handler error or a panic that escapes all middleware becomes a
//! `500 Internal Server Error`, is logged, and the connection keeps serving.
//!
//! # Graceful shutdown and Kubernetes
//!
//! When Kubernetes terminates a pod it sends **SIGTERM** and waits
//! `terminationGracePeriodSeconds` (default 30 s) before sending SIGKILL.
//!
//! The server reacts by:
//! 1. Immediately stopping `listener.accept()` — no new connections are made.
//! 2. Letting every in-flight connection task run to completion.
//! 3. Returning from [`Server::serve`], which lets `main` exit cleanly.
//!
//! [`Transport`]: crate::transport::Transport

use std::convert::Infallible;
use std::fmt;
use std::future::Future;
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use bytes::Bytes;
use futures::FutureExt;
use http::StatusCode;
use http_body_util::{BodyExt, Full};
use hyper::body::Body;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::context::Context;
use crate::error::Error;
use crate::handler::Handler;
use crate::panic::message;
use crate::request::Request;
use crate::response::Response;
use crate::transport::HttpTransport;

/// The peer address of the connection a request arrived on.
///
/// Placed on every request [`Context`] by the server.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RemoteAddr(pub SocketAddr);

/// The HTTP server.
pub struct Server {
    addr: SocketAddr,
    listener: Option<TcpListener>,
}

impl Server {
    /// Configures the server to bind to `addr` when [`serve`](Server::serve)
    /// is called.
    ///
    /// # Example
    ///
    /// ```rust
    /// use errortracker::Server;
    /// let server = Server::bind("0.0.0.0:3000").unwrap();
    /// assert!(Server::bind("not an address").is_err());
    /// ```
    pub fn bind(addr: &str) -> Result<Self, Error> {
        let addr = addr
            .parse()
            .map_err(|source| Error::InvalidAddr { addr: addr.to_owned(), source })?;
        Ok(Self { addr, listener: None })
    }

    /// Serves on a listener the caller already bound, e.g. to port `0` to let
    /// the OS pick a free port.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// # async fn run() -> Result<(), errortracker::Error> {
    /// use errortracker::Server;
    /// let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    /// let server = Server::from_listener(listener)?;
    /// println!("listening on {}", server.local_addr());
    /// # Ok(())
    /// # }
    /// ```
    pub fn from_listener(listener: TcpListener) -> Result<Self, Error> {
        let addr = listener.local_addr()?;
        Ok(Self { addr, listener: Some(listener) })
    }

    /// The address the server binds to, or is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Starts accepting connections and dispatching them to `handler`.
    ///
    /// Returns only after a full graceful shutdown (SIGTERM or Ctrl-C,
    /// followed by all in-flight requests completing).
    pub async fn serve<H>(self, handler: H) -> Result<(), Error>
    where
        H: Handler<Request, Reply = Response>,
    {
        self.serve_with_shutdown(handler, shutdown_signal()).await
    }

    /// Like [`serve`](Server::serve), but stops accepting when `signal`
    /// resolves instead of waiting for SIGTERM / Ctrl-C.
    pub async fn serve_with_shutdown<H, S>(self, handler: H, signal: S) -> Result<(), Error>
    where
        H: Handler<Request, Reply = Response>,
        S: Future<Output = ()>,
    {
        let listener = match self.listener {
            Some(listener) => listener,
            None => TcpListener::bind(self.addr).await?,
        };

        // One Arc clone per connection, not a copy of the handler.
        let handler = Arc::new(handler);

        info!(addr = %self.addr, "errortracker listening");

        let mut tasks = tokio::task::JoinSet::new();

        tokio::pin!(signal);

        loop {
            tokio::select! {
                // Check shutdown first so a SIGTERM immediately stops
                // accepting new connections, even if more are queued.
                biased;

                () = &mut signal => {
                    info!(in_flight = tasks.len(), "shutdown signal received, draining connections");
                    break;
                }

                res = listener.accept() => {
                    let (stream, remote_addr) = match res {
                        Ok(v) => v,
                        Err(e) => {
                            error!("accept error: {e}");
                            continue;
                        }
                    };

                    let handler = Arc::clone(&handler);
                    let io = TokioIo::new(stream);

                    tasks.spawn(async move {
                        // Called once per request on the connection.
                        let svc = service_fn(move |req| {
                            let handler = Arc::clone(&handler);
                            async move { dispatch(handler, req, remote_addr).await }
                        });

                        // HTTP/1.1 or HTTP/2, whatever the client negotiates.
                        if let Err(e) = ConnBuilder::new(TokioExecutor::new())
                            .serve_connection(io, svc)
                            .await
                        {
                            error!(peer = %remote_addr, "connection error: {e}");
                        }
                    });
                }

                // Reap finished connection tasks so the JoinSet does not grow
                // without bound on long-running servers.
                Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
            }
        }

        while tasks.join_next().await.is_some() {}

        info!("errortracker stopped");
        Ok(())
    }
}

// ── Request dispatch ──────────────────────────────────────────────────────────

/// hyper glue: reads the body, builds the request context, runs the handler.
///
/// The error type is [`Infallible`]: every failure is answered with a status
/// code, so hyper never sees an error.
async fn dispatch<H, B>(
    handler: Arc<H>,
    req: hyper::Request<B>,
    remote_addr: SocketAddr,
) -> Result<http::Response<Full<Bytes>>, Infallible>
where
    H: Handler<Request, Reply = Response>,
    B: Body,
    B::Error: fmt::Display,
{
    let (parts, body) = req.into_parts();
    let body = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            warn!(peer = %remote_addr, "failed to read request body: {e}");
            return Ok(Response::status(StatusCode::BAD_REQUEST).into_inner());
        }
    };

    let request = Request::new(parts.method.clone(), parts.uri.clone(), parts.headers.clone(), body);
    let ctx = Context::new()
        .with_transport(HttpTransport::new(http::Request::from_parts(parts, ())))
        .with_value(RemoteAddr(remote_addr));

    Ok(handle(&*handler, ctx, request).await.into_inner())
}

/// Runs `handler`, turning errors and panics into `500`s.
pub(crate) async fn handle<H>(handler: &H, ctx: Context, request: Request) -> Response
where
    H: Handler<Request, Reply = Response> + ?Sized,
{
    let method = request.method().clone();
    let path = request.path().to_owned();

    match AssertUnwindSafe(async move { handler.call(ctx, request).await }).catch_unwind().await {
        Ok(Ok(response)) => response,
        Ok(Err(e)) => {
            error!(%method, %path, "handler error: {e}");
            Response::status(StatusCode::INTERNAL_SERVER_ERROR)
        }
        Err(panic) => {
            let msg = message(&*panic);
            error!(%method, %path, panic = msg.as_deref().unwrap_or("Box<dyn Any>"), "handler panicked");
            Response::status(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

// ── Shutdown signal ───────────────────────────────────────────────────────────

/// Resolves on the first shutdown signal the process receives.
///
/// On Unix this listens for both **SIGTERM** (sent by `kubectl` and the
/// Kubernetes control plane) and **SIGINT** (Ctrl-C, for local dev).
/// On Windows only Ctrl-C is available. A signal that cannot be installed is
/// logged and never fires.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to install Ctrl-C handler: {e}");
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
                error!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c   => {}
        () = sigterm  => {}
    }
}
