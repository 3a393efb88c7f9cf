//! Handler trait.
//!
//! # What a handler is
//!
//! Anything that turns a [`Context`] and a request into a future reply:
//!
//! ```text
//! async fn name(ctx: Context, req: Req) -> Result<Reply, BoxError>
//! ```
//!
//! Plain `async fn` items and closures returning `async` blocks satisfy
//! [`Handler`] through the blanket impl below. Middleware such as
//! [`Recovered`](crate::middleware::Recovered) implements it directly, so a
//! wrapped handler can be wrapped again or handed to the [`Server`](crate::Server).
//!
//! # Why the future is boxed
//!
//! Middleware holds the handler it wraps behind an `Arc` and needs to name the
//! future it gets back. Boxing erases the concrete `async` type so every
//! handler returns the same [`BoxFuture`]. The cost is one allocation per call,
//! negligible next to network I/O.

use std::future::Future;
use std::pin::Pin;

use crate::context::Context;
use crate::error::BoxError;

/// A heap-allocated, type-erased future.
///
/// `Pin<Box<…>>` so the runtime can poll it in place; `Send + 'static` so
/// tokio can move it across worker threads.
pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

/// Implemented for every request handler.
///
/// `Req` is the request payload type. It is a trait parameter rather than an
/// associated type so one function can serve several payload types.
pub trait Handler<Req>: Send + Sync + 'static {
    type Reply: Send + 'static;

    fn call(&self, ctx: Context, req: Req) -> BoxFuture<Result<Self::Reply, BoxError>>;
}

impl<F, Fut, Req, Reply> Handler<Req> for F
where
    F: Fn(Context, Req) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Reply, BoxError>> + Send + 'static,
    Reply: Send + 'static,
{
    type Reply = Reply;

    fn call(&self, ctx: Context, req: Req) -> BoxFuture<Result<Reply, BoxError>> {
        Box::pin((self)(ctx, req))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn echo(_ctx: Context, req: String) -> Result<String, BoxError> {
        Ok(req)
    }

    #[tokio::test]
    async fn async_fn_is_a_handler() {
        let reply = echo.call(Context::new(), "hi".to_owned()).await.unwrap();
        assert_eq!(reply, "hi");
    }

    #[tokio::test]
    async fn closure_is_a_handler() {
        let h = |_ctx: Context, n: u32| async move { Ok::<_, BoxError>(n * 2) };
        assert_eq!(h.call(Context::new(), 21).await.unwrap(), 42);
    }
}
