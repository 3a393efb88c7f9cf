//! Minimal errortracker example: an HTTP service whose panics reach Sentry.
//!
//! Run with:
//!   SENTRY_DSN=https://<key>@<org>.ingest.sentry.io/<project> \
//!   RUST_LOG=info cargo run --example basic
//!
//! Try:
//!   curl http://localhost:3000/orders/42
//!   curl http://localhost:3000/orders/boom      # panics → reported → 500
//!   curl -H 'x-tenant: acme' http://localhost:3000/orders/7

use std::time::Duration;

use errortracker::middleware::{Recovery, TagValue, hub_from_context};
use errortracker::{BoxError, Context, RemoteAddr, Request, Response, Server};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // Reads SENTRY_DSN from the environment; without it reports are dropped.
    // No `panic` integration here: the recovery layer reports handler panics.
    let _sentry = sentry::init(sentry::ClientOptions {
        release: sentry::release_name!(),
        ..Default::default()
    });

    let app = Recovery::new()
        .wait_for_delivery(true)
        .timeout(Duration::from_secs(1))
        .tag("service", "orders")
        .tag("peer", TagValue::deferred(|ctx| ctx.get::<RemoteAddr>().map(|a| a.0.ip().to_string())))
        .layer(get_order);

    Server::bind("0.0.0.0:3000")?.serve(app).await?;
    Ok(())
}

// GET /orders/:id
async fn get_order(ctx: Context, req: Request) -> Result<Response, BoxError> {
    if let (Some(hub), Some(tenant)) = (hub_from_context(&ctx), req.header("x-tenant")) {
        hub.configure_scope(|scope| scope.set_tag("tenant", tenant));
    }

    let id = req.path().trim_start_matches("/orders/");
    if id == "boom" {
        panic!("order lookup exploded");
    }

    let id: u64 = id.parse()?;
    Ok(Response::json(format!(r#"{{"id":{id},"status":"shipped"}}"#)))
}
