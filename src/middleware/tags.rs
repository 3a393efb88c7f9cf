//! Tag values for the recovery layer.

use std::fmt;
use std::sync::Arc;

use crate::context::Context;

type Producer = dyn Fn(&Context) -> Option<String> + Send + Sync;

/// The value of a tag attached to every request's reporting scope.
///
/// A [`Literal`](TagValue::Literal) is set as-is. A
/// [`Deferred`](TagValue::Deferred) value is computed from the request
/// [`Context`] each time; when it yields `None` the tag is left off for that
/// request.
///
/// ```rust
/// use errortracker::middleware::TagValue;
///
/// let region: TagValue = "eu-west-1".into();
/// let transport = TagValue::deferred(|ctx| {
///     ctx.transport().map(|t| t.kind().to_string())
/// });
/// # let _ = (region, transport);
/// ```
#[derive(Clone)]
pub enum TagValue {
    Literal(String),
    Deferred(Arc<Producer>),
}

impl TagValue {
    pub fn deferred<F>(f: F) -> Self
    where
        F: Fn(&Context) -> Option<String> + Send + Sync + 'static,
    {
        Self::Deferred(Arc::new(f))
    }

    /// Resolves the value against `ctx`.
    pub fn resolve(&self, ctx: &Context) -> Option<String> {
        match self {
            Self::Literal(s) => Some(s.clone()),
            Self::Deferred(f) => f(ctx),
        }
    }
}

impl From<&str> for TagValue {
    fn from(s: &str) -> Self { Self::Literal(s.to_owned()) }
}

impl From<String> for TagValue {
    fn from(s: String) -> Self { Self::Literal(s) }
}

impl fmt::Debug for TagValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(s) => f.debug_tuple("Literal").field(s).finish(),
            Self::Deferred(_) => f.write_str("Deferred(..)"),
        }
    }
}
