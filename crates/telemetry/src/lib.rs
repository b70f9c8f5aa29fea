//! Internal telemetry for the GamePulse aggregation engine.
//!
//! Structured tracing plus in-process job counters; summaries are logged
//! after each scheduled run rather than shipped to an external metrics
//! system.

pub mod health;
pub mod metrics;
pub mod tracing_setup;

pub use health::*;
pub use metrics::*;
pub use tracing_setup::*;
