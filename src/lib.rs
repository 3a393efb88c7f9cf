//! # errortracker
//!
//! Panic recovery for request handlers, reported to Sentry.
//!
//! ## The contract
//!
//! A handler panics. The request is lost either way. What you want is to know
//! about it, with enough context to reproduce: which endpoint, which headers,
//! which payload. [`middleware::Recovery`] wraps a handler and does exactly
//! that:
//!
//! - tags the request's Sentry scope (static tags, or tags computed from the
//!   request [`Context`]);
//! - attaches transport metadata: the HTTP request, or the gRPC endpoint,
//!   operation and metadata;
//! - on panic, reports it with the request payload attached, optionally waits
//!   for delivery, then re-raises the original panic.
//!
//! Broken-pipe and connection-reset panics are dropped silently. The client
//! left; that is not a bug.
//!
//! Keep `sentry`'s own `panic` integration off when using the recovery layer.
//! Its panic hook fires before the layer gets control, so every handler panic
//! would be reported twice and broken-pipe panics would slip through.
//!
//! A small hyper-based [`Server`] is included for HTTP services. It stamps each
//! request with its transport and answers anything that still panics with a
//! `500`.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use errortracker::{BoxError, Context, Request, Response, Server};
//! use errortracker::middleware::Recovery;
//!
//! #[tokio::main]
//! async fn main() {
//!     let _sentry = sentry::init(sentry::ClientOptions {
//!         release: sentry::release_name!(),
//!         ..Default::default()
//!     });
//!
//!     let app = Recovery::new()
//!         .tag("service", "users")
//!         .layer(get_user);
//!
//!     Server::bind("0.0.0.0:3000").unwrap().serve(app).await.unwrap();
//! }
//!
//! async fn get_user(_ctx: Context, req: Request) -> Result<Response, BoxError> {
//!     let id: u64 = req.path().trim_start_matches("/users/").parse()?;
//!     Ok(Response::json(format!(r#"{{"id":{id}}}"#)))
//! }
//! ```

mod context;
mod error;
mod handler;
mod panic;
mod request;
mod response;
mod server;

pub mod middleware;
pub mod transport;

pub use context::Context;
pub use error::{BoxError, Error};
pub use handler::{BoxFuture, Handler};
pub use panic::is_broken_pipe;
pub use request::Request;
pub use response::Response;
pub use server::{RemoteAddr, Server};
