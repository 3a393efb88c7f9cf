//! Panic recovery with Sentry reporting.
//!
//! [`Recovery`] wraps a [`Handler`]. For every request it:
//!
//! 1. picks a Sentry [`Hub`]: the one already in the [`Context`], or a fresh
//!    clone of the process default;
//! 2. tags the hub's scope and attaches what the transport knows about the
//!    request (gRPC endpoint, operation and metadata; or the HTTP request);
//! 3. stores the hub in the context handed to the handler, so handler code
//!    can reach it with [`hub_from_context`];
//! 4. runs the handler and, if it panics, reports the panic together with the
//!    request payload, optionally waits for delivery, then re-raises.
//!
//! Broken-pipe and connection-reset panics are never reported: the client hung
//! up, and there is nothing to fix.
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use errortracker::{BoxError, Context};
//! use errortracker::middleware::{Recovery, TagValue};
//!
//! async fn charge(_ctx: Context, amount: u64) -> Result<u64, BoxError> {
//!     assert!(amount > 0, "zero charge");
//!     Ok(amount)
//! }
//!
//! let handler = Recovery::new()
//!     .wait_for_delivery(true)
//!     .timeout(Duration::from_secs(1))
//!     .tag("service", "billing")
//!     .tag("transport", TagValue::deferred(|ctx| {
//!         ctx.transport().map(|t| t.kind().to_string())
//!     }))
//!     .layer(charge);
//! # let _ = handler;
//! ```

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt::{self, Write as _};
use std::panic::{AssertUnwindSafe, resume_unwind};
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use sentry::protocol::{Event, Exception, Level, Mechanism, Uuid, Value};
use sentry::{Hub, SentryFutureExt};
use tracing::{debug, warn};

use crate::context::Context;
use crate::error::{BoxError, Error};
use crate::handler::{BoxFuture, Handler};
use crate::panic::{as_error, is_broken_pipe, message};

use super::scope::apply_transport;
use super::tags::TagValue;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

/// Longest request rendering attached to a report, in bytes.
const MAX_PAYLOAD_LEN: usize = 8 * 1024;

/// Used when a panic payload is neither a string nor a known error type.
const OPAQUE_PAYLOAD: &str = "Box<dyn Any>";

// ── Hub in context ────────────────────────────────────────────────────────────

/// Context slot for the request's hub. Private, so only this module can fill it.
#[derive(Clone)]
struct RequestHub(Arc<Hub>);

/// Returns the Sentry hub attached to `ctx` by [`Recovery`], or by an outer
/// layer through [`with_hub`].
pub fn hub_from_context(ctx: &Context) -> Option<Arc<Hub>> {
    ctx.get::<RequestHub>().map(|h| Arc::clone(&h.0))
}

/// Returns a context carrying `hub`. A [`Recovery`] layer further in reuses
/// it instead of cloning the process default.
pub fn with_hub(ctx: Context, hub: Arc<Hub>) -> Context {
    ctx.with_value(RequestHub(hub))
}

// ── Recovery ──────────────────────────────────────────────────────────────────

/// Configuration of the recovery layer.
///
/// Built with chained setters, then turned into a handler with
/// [`layer`](Recovery::layer). Once layered the configuration is frozen.
///
/// | Setting | Default |
/// |---|---|
/// | [`repanic`](Recovery::repanic) | `true` |
/// | [`wait_for_delivery`](Recovery::wait_for_delivery) | `false` |
/// | [`timeout`](Recovery::timeout) | 2 s |
/// | [`tags`](Recovery::tags) | none |
#[derive(Clone, Debug)]
pub struct Recovery {
    repanic: bool,
    wait_for_delivery: bool,
    timeout: Duration,
    tags: BTreeMap<String, TagValue>,
}

impl Default for Recovery {
    fn default() -> Self {
        Self {
            repanic: true,
            wait_for_delivery: false,
            timeout: DEFAULT_TIMEOUT,
            tags: BTreeMap::new(),
        }
    }
}

impl Recovery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether to re-raise the panic once it has been reported. Leave this on
    /// unless nothing further out handles panics.
    pub fn repanic(mut self, repanic: bool) -> Self {
        self.repanic = repanic;
        self
    }

    /// Whether to hold the request until the report is delivered (or the
    /// [`timeout`](Recovery::timeout) runs out) before moving on.
    pub fn wait_for_delivery(mut self, wait: bool) -> Self {
        self.wait_for_delivery = wait;
        self
    }

    /// Upper bound on the delivery wait. Zero restores the 2 s default.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = if timeout.is_zero() { DEFAULT_TIMEOUT } else { timeout };
        self
    }

    /// Replaces the tag set.
    pub fn tags<I, K, V>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<TagValue>,
    {
        self.tags = tags.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
        self
    }

    /// Adds one tag.
    pub fn tag(mut self, key: impl Into<String>, value: impl Into<TagValue>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// Wraps `next` in this recovery layer.
    pub fn layer<H>(self, next: H) -> Recovered<H> {
        Recovered { recovery: Arc::new(self), next: Arc::new(next) }
    }

    /// Runs `next` for one request under this recovery layer.
    ///
    /// Returns whatever `next` returns. If `next` panics, the panic is
    /// reported and then re-raised with its original payload; with
    /// [`repanic`](Recovery::repanic) off, [`Error::Panicked`] is returned
    /// instead.
    pub async fn intercept<Req, H>(&self, ctx: Context, req: Req, next: &H) -> Result<H::Reply, BoxError>
    where
        Req: fmt::Debug,
        H: Handler<Req> + ?Sized,
    {
        let hub = hub_from_context(&ctx)
            .unwrap_or_else(|| Arc::new(Hub::new_from_top(Hub::current())));

        let send_default_pii = hub.client().is_some_and(|c| c.options().send_default_pii);
        hub.configure_scope(|scope| {
            for (key, value) in &self.tags {
                match value.resolve(&ctx) {
                    Some(v) => scope.set_tag(key, v),
                    None => debug!(tag = %key, "deferred tag yielded nothing, skipped"),
                }
            }
            if let Some(transport) = ctx.transport() {
                apply_transport(scope, transport, send_default_pii);
            }
        });

        let payload = describe(&req);
        let ctx = with_hub(ctx, Arc::clone(&hub));
        // The whole call sits inside the async block so a panic raised before
        // the handler's first await is caught too.
        let handled = async move { next.call(ctx, req).await }.bind_hub(Arc::clone(&hub));

        match AssertUnwindSafe(handled).catch_unwind().await {
            Ok(result) => result,
            Err(panic) => Err(self.recover(&hub, &payload, panic).await),
        }
    }

    async fn recover(&self, hub: &Hub, payload: &str, panic: Box<dyn Any + Send>) -> BoxError {
        let event_id = if is_broken_pipe(&*panic) {
            debug!("peer went away mid-request, panic not reported");
            None
        } else {
            report(hub, &*panic, payload)
        };

        if let Some(event_id) = event_id {
            warn!(%event_id, "handler panicked, reported");
            if self.wait_for_delivery {
                self.flush(hub).await;
            }
        }

        if self.repanic {
            resume_unwind(panic);
        }

        let msg = message(&*panic).unwrap_or_else(|| OPAQUE_PAYLOAD.to_owned());
        Box::new(Error::Panicked(msg))
    }

    /// Waits for the hub's client to deliver queued events, at most `timeout`.
    ///
    /// `Client::flush` blocks, so it runs on the blocking pool. The request
    /// still waits for it; the worker thread does not.
    async fn flush(&self, hub: &Hub) {
        let Some(client) = hub.client() else { return };
        let timeout = self.timeout;
        match tokio::task::spawn_blocking(move || client.flush(Some(timeout))).await {
            Ok(delivered) => debug!(delivered, ?timeout, "delivery wait finished"),
            Err(e) => debug!(error = %e, "delivery wait aborted"),
        }
    }
}

/// Captures `panic` on `hub` with the request payload attached.
///
/// Returns `None` when the hub has no enabled client or the event was
/// dropped (sampling, `before_send`).
fn report(hub: &Hub, panic: &(dyn Any + Send), payload: &str) -> Option<Uuid> {
    let event = panic_event(panic);
    let event_id = hub.with_scope(
        |scope| scope.set_extra("request", Value::from(payload)),
        || hub.capture_event(event),
    );
    (!event_id.is_nil()).then_some(event_id)
}

fn panic_event(panic: &(dyn Any + Send)) -> Event<'static> {
    let mut event = match as_error(panic) {
        Some(err) => sentry::event_from_error(err),
        None => Event {
            exception: vec![Exception {
                ty: "panic".into(),
                value: Some(message(panic).unwrap_or_else(|| OPAQUE_PAYLOAD.to_owned())),
                ..Default::default()
            }]
            .into(),
            ..Default::default()
        },
    };
    event.level = Level::Fatal;
    if let Some(exc) = event.exception.values.last_mut() {
        exc.mechanism = Some(Mechanism {
            ty: "panic".into(),
            handled: Some(false),
            ..Default::default()
        });
    }
    event
}

/// `Debug` rendering of the request, cut at [`MAX_PAYLOAD_LEN`].
///
/// Formatting stops as soon as the cap is hit, so a huge request costs no more
/// than the prefix that is kept.
fn describe<T: fmt::Debug + ?Sized>(req: &T) -> String {
    let mut out = Capped { buf: String::new(), limit: MAX_PAYLOAD_LEN, full: false };
    if write!(out, "{req:?}").is_err() && out.full {
        out.buf.push('…');
    }
    out.buf
}

/// A `fmt::Write` sink that refuses everything past `limit` bytes.
struct Capped {
    buf: String,
    limit: usize,
    full: bool,
}

impl fmt::Write for Capped {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let room = self.limit - self.buf.len();
        if s.len() <= room {
            self.buf.push_str(s);
            return Ok(());
        }
        let mut end = room;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        self.buf.push_str(&s[..end]);
        self.full = true;
        Err(fmt::Error)
    }
}

// ── Recovered ─────────────────────────────────────────────────────────────────

/// A handler wrapped by [`Recovery::layer`].
pub struct Recovered<H> {
    recovery: Arc<Recovery>,
    next: Arc<H>,
}

impl<H> Clone for Recovered<H> {
    fn clone(&self) -> Self {
        Self { recovery: Arc::clone(&self.recovery), next: Arc::clone(&self.next) }
    }
}

impl<H> fmt::Debug for Recovered<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Recovered").field("recovery", &self.recovery).finish_non_exhaustive()
    }
}

impl<H, Req> Handler<Req> for Recovered<H>
where
    H: Handler<Req>,
    Req: fmt::Debug + Send + 'static,
{
    type Reply = H::Reply;

    fn call(&self, ctx: Context, req: Req) -> BoxFuture<Result<H::Reply, BoxError>> {
        let recovery = Arc::clone(&self.recovery);
        let next = Arc::clone(&self.next);
        Box::pin(async move { recovery.intercept(ctx, req, &*next).await })
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::io;

    use super::*;

    #[test]
    fn defaults() {
        let r = Recovery::new();
        assert!(r.repanic);
        assert!(!r.wait_for_delivery);
        assert_eq!(r.timeout, Duration::from_secs(2));
        assert!(r.tags.is_empty());
    }

    #[test]
    fn zero_timeout_falls_back_to_default() {
        let r = Recovery::new().timeout(Duration::from_millis(250));
        assert_eq!(r.timeout, Duration::from_millis(250));

        let r = r.timeout(Duration::ZERO);
        assert_eq!(r.timeout, DEFAULT_TIMEOUT);
    }

    #[test]
    fn tags_replaces_and_tag_adds() {
        let r = Recovery::new()
            .tag("old", "x")
            .tags([("env", "prod"), ("region", "eu")])
            .tag("extra", "y");

        let keys: Vec<_> = r.tags.keys().map(String::as_str).collect();
        assert_eq!(keys, ["env", "extra", "region"]);
    }

    #[test]
    fn hub_accessor_is_empty_on_a_fresh_context() {
        assert!(hub_from_context(&Context::new()).is_none());
    }

    #[test]
    fn hub_accessor_returns_the_same_hub() {
        let hub = Arc::new(Hub::new(None, Default::default()));
        let ctx = with_hub(Context::new(), Arc::clone(&hub));
        let found = hub_from_context(&ctx).unwrap();
        assert!(Arc::ptr_eq(&found, &hub));
    }

    #[test]
    fn string_panic_becomes_fatal_panic_exception() {
        let event = panic_event(&"boom");

        assert_eq!(event.level, Level::Fatal);
        let exc = &event.exception.values[0];
        assert_eq!(exc.ty, "panic");
        assert_eq!(exc.value.as_deref(), Some("boom"));
        let mechanism = exc.mechanism.as_ref().unwrap();
        assert_eq!(mechanism.ty, "panic");
        assert_eq!(mechanism.handled, Some(false));
    }

    #[test]
    fn error_panic_is_reported_as_error() {
        let event = panic_event(&io::Error::new(io::ErrorKind::TimedOut, "deadline exceeded"));

        let exc = event.exception.values.last().unwrap();
        assert_eq!(exc.value.as_deref(), Some("deadline exceeded"));
        assert_eq!(exc.mechanism.as_ref().map(|m| m.ty.as_str()), Some("panic"));
    }

    #[test]
    fn opaque_panic_keeps_a_placeholder_message() {
        let event = panic_event(&17_u64);
        assert_eq!(event.exception.values[0].value.as_deref(), Some(OPAQUE_PAYLOAD));
    }

    #[test]
    fn describe_truncates_on_char_boundary() {
        let long = "é".repeat(MAX_PAYLOAD_LEN);
        let s = describe(&long);
        assert!(s.len() <= MAX_PAYLOAD_LEN + '…'.len_utf8());
        assert!(s.ends_with('…'));

        assert_eq!(describe(&42), "42");
    }

    #[test]
    fn describe_stops_formatting_at_the_cap() {
        struct Endless(Cell<usize>);

        impl fmt::Debug for Endless {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                let chunk = "abcdefgh".repeat(128);
                loop {
                    f.write_str(&chunk)?;
                    self.0.set(self.0.get() + chunk.len());
                }
            }
        }

        let req = Endless(Cell::new(0));
        let s = describe(&req);

        assert!(s.starts_with("abcdefgh"));
        assert_eq!(s.len(), MAX_PAYLOAD_LEN + '…'.len_utf8());
        assert!(req.0.get() <= MAX_PAYLOAD_LEN);
    }
}
