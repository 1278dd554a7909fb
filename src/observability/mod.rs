//! Observability for the listener daemon
//!
//! Structured logging through `tracing` and per-listener counters that are
//! dumped as a JSON snapshot when the process stops.

pub mod logging;
pub mod metrics;

// Re-export for convenience
pub use logging::{init_default_logging, init_logging, LogFormat};
pub use metrics::{metrics, ListenerStats, ListenerStatsSnapshot, MetricsCollector, MetricsSnapshot};

// Span macros for structured logging
pub use logging::{broker_span, listener_span};
