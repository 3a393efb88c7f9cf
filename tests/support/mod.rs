//! Shared fixtures: a Sentry hub backed by an in-memory transport.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use sentry::protocol::Event;
use sentry::{Client, ClientOptions, Envelope, Hub, Scope, Transport};

/// Keeps every envelope it is given and records each flush request.
///
/// `flush` blocks for `flush_delay` (bounded by the requested timeout) to
/// stand in for a slow network.
#[derive(Default)]
pub struct RecordingTransport {
    envelopes: Mutex<Vec<Envelope>>,
    flushes: Mutex<Vec<Duration>>,
    flush_delay: Duration,
}

impl RecordingTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_flush_delay(delay: Duration) -> Arc<Self> {
        Arc::new(Self { flush_delay: delay, ..Self::default() })
    }

    pub fn events(&self) -> Vec<Event<'static>> {
        self.envelopes
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| e.event().cloned())
            .collect()
    }

    pub fn flushes(&self) -> Vec<Duration> {
        self.flushes.lock().unwrap().clone()
    }
}

impl Transport for RecordingTransport {
    fn send_envelope(&self, envelope: Envelope) {
        self.envelopes.lock().unwrap().push(envelope);
    }

    fn flush(&self, timeout: Duration) -> bool {
        self.flushes.lock().unwrap().push(timeout);
        std::thread::sleep(self.flush_delay.min(timeout));
        self.flush_delay <= timeout
    }
}

/// A hub with an enabled client that sends to `transport`.
pub fn hub(transport: &Arc<RecordingTransport>) -> Arc<Hub> {
    hub_with(transport, ClientOptions::default())
}

/// Like [`hub`], but with the integrations `sentry::init` would install.
pub fn hub_with_defaults(transport: &Arc<RecordingTransport>) -> Arc<Hub> {
    hub_with(transport, sentry::apply_defaults(ClientOptions::default()))
}

pub fn hub_with(transport: &Arc<RecordingTransport>, options: ClientOptions) -> Arc<Hub> {
    let transport = Arc::clone(transport);
    let options = ClientOptions {
        dsn: "https://public@sentry.invalid/1".parse().ok(),
        transport: Some(Arc::new(move |_: &ClientOptions| -> Arc<dyn Transport> {
            transport.clone()
        })),
        ..options
    };
    let client = Arc::new(Client::from(options));
    Arc::new(Hub::new(Some(client), Arc::new(Scope::default())))
}
