//! Request-scoped context.
//!
//! A [`Context`] travels alongside the request through every handler and
//! middleware layer. It carries two things:
//!
//! - the [`Transport`] the request arrived on, set once by the server;
//! - a typed value map. Each value is keyed by its Rust type, so a module that
//!   keeps its key type private owns its slot outright: no string keys, no
//!   collisions.
//!
//! Contexts are immutable from the callee's point of view. Adding a value
//! produces a derived context; the caller's copy is untouched.
//!
//! ```rust
//! use errortracker::Context;
//!
//! #[derive(Clone)]
//! struct TenantId(u64);
//!
//! let parent = Context::new();
//! let child = parent.clone().with_value(TenantId(7));
//!
//! assert!(parent.get::<TenantId>().is_none());
//! assert_eq!(child.get::<TenantId>().map(|t| t.0), Some(7));
//! ```

use std::sync::Arc;

use http::Extensions;

use crate::transport::Transport;

/// Request-scoped values and transport information.
///
/// Cloning is cheap: the transport sits behind an `Arc` and values are
/// expected to be small handles.
#[derive(Clone, Debug, Default)]
pub struct Context {
    transport: Option<Arc<Transport>>,
    values: Extensions,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a context carrying `transport`.
    pub fn with_transport(mut self, transport: impl Into<Transport>) -> Self {
        self.transport = Some(Arc::new(transport.into()));
        self
    }

    /// The transport the current request arrived on, if the server set one.
    pub fn transport(&self) -> Option<&Transport> {
        self.transport.as_deref()
    }

    /// Returns a context with `value` stored under its type, replacing any
    /// previous value of the same type.
    pub fn with_value<T>(mut self, value: T) -> Self
    where
        T: Clone + Send + Sync + 'static,
    {
        self.values.insert(value);
        self
    }

    pub fn get<T>(&self) -> Option<&T>
    where
        T: Send + Sync + 'static,
    {
        self.values.get::<T>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::Kind;

    #[derive(Clone, Debug, PartialEq)]
    struct Marker(&'static str);

    #[test]
    fn derived_context_does_not_leak_into_parent() {
        let parent = Context::new().with_value(Marker("parent"));
        let child = parent.clone().with_value(Marker("child"));

        assert_eq!(parent.get::<Marker>(), Some(&Marker("parent")));
        assert_eq!(child.get::<Marker>(), Some(&Marker("child")));
    }

    #[test]
    fn transport_is_absent_by_default() {
        assert!(Context::new().transport().is_none());
    }

    #[test]
    fn transport_survives_clone() {
        let ctx = Context::new().with_transport(Transport::Other("websocket".to_owned()));
        let cloned = ctx.clone();
        assert_eq!(cloned.transport().map(Transport::kind), Some(Kind::Other));
    }
}
