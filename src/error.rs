//! Unified error type.

use std::net::AddrParseError;

/// A type-erased error, as returned by [`Handler`](crate::Handler)s.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// The error type returned by errortracker's fallible operations.
///
/// Application-level failures travel through handlers as [`BoxError`]s. This
/// type surfaces infrastructure failures (binding to a port, accepting a
/// connection) and panics recovered without re-raising.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid socket address `{addr}`: {source}")]
    InvalidAddr {
        addr: String,
        #[source]
        source: AddrParseError,
    },

    /// A handler panicked and the recovery layer was configured not to
    /// re-raise. Carries the panic message.
    #[error("handler panicked: {0}")]
    Panicked(String),
}
