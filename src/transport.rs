//! Transport descriptors.
//!
//! A server places a [`Transport`] on the request [`Context`](crate::Context)
//! to say how the request arrived. Middleware reads it back with
//! [`Context::transport`](crate::Context::transport) and matches on the
//! variant.

use std::fmt;

use http::HeaderMap;

/// The kind of transport a request arrived on.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Kind {
    Grpc,
    Http,
    Other,
}

impl Kind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Grpc  => "grpc",
            Self::Http  => "http",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Server-side transport information for one request.
#[derive(Debug)]
pub enum Transport {
    Grpc(GrpcTransport),
    Http(HttpTransport),
    /// Any other transport, named by the server that produced it
    /// (e.g. `"websocket"`). Carries no metadata.
    Other(String),
}

impl Transport {
    pub fn kind(&self) -> Kind {
        match self {
            Self::Grpc(_)  => Kind::Grpc,
            Self::Http(_)  => Kind::Http,
            Self::Other(_) => Kind::Other,
        }
    }
}

impl From<GrpcTransport> for Transport {
    fn from(t: GrpcTransport) -> Self { Self::Grpc(t) }
}

impl From<HttpTransport> for Transport {
    fn from(t: HttpTransport) -> Self { Self::Http(t) }
}

// ── gRPC ──────────────────────────────────────────────────────────────────────

/// A gRPC call: the server endpoint, the full method name and the request
/// metadata.
#[derive(Debug)]
pub struct GrpcTransport {
    endpoint: String,
    operation: String,
    request_header: HeaderMap,
}

impl GrpcTransport {
    /// `operation` is the full method path, e.g. `/helloworld.Greeter/SayHello`.
    pub fn new(endpoint: impl Into<String>, operation: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            operation: operation.into(),
            request_header: HeaderMap::new(),
        }
    }

    pub fn with_request_header(mut self, headers: HeaderMap) -> Self {
        self.request_header = headers;
        self
    }

    pub fn endpoint(&self) -> &str { &self.endpoint }
    pub fn operation(&self) -> &str { &self.operation }
    pub fn request_header(&self) -> &HeaderMap { &self.request_header }
}

// ── HTTP ──────────────────────────────────────────────────────────────────────

/// An HTTP request, without its body.
#[derive(Debug)]
pub struct HttpTransport {
    request: http::Request<()>,
}

impl HttpTransport {
    pub fn new(request: http::Request<()>) -> Self {
        Self { request }
    }

    /// The raw request head as received by the server.
    pub fn request(&self) -> &http::Request<()> { &self.request }
}
