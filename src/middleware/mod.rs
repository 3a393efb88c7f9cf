//! Middleware layer.
//!
//! Middleware wraps a [`Handler`](crate::Handler) and yields another one, so
//! layers nest by plain function composition:
//!
//! ```rust,ignore
//! let app = Recovery::new().layer(app);
//! ```
//!
//! Built-in middleware:
//! - [`Recovery`] — recovers handler panics and reports them to Sentry

mod recover;
mod scope;
mod tags;

pub use recover::{Recovered, Recovery, hub_from_context, with_hub};
pub use tags::TagValue;
