//! Observability for a normalization run.
//!
//! Components record [`events`] with [`emit!`]; when enabled, [`server`]
//! exposes them to Prometheus while the run is in progress.

pub mod events;
pub mod server;

pub use server::{MetricsServer, init};

/// Record an [`events::InternalEvent`].
///
/// ```ignore
/// emit!(DimensionRowCreated { dimension: Dimension::Customer });
/// ```
#[macro_export]
macro_rules! emit {
    ($event:expr) => {
        $crate::metrics::events::InternalEvent::emit($event)
    };
}
