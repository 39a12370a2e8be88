//! Prometheus metrics and structured logging for perpsvc.
//!
//! - Structured logging with tracing (JSON in production)
//! - Prometheus metrics for logins, orders, withdrawals and the market feed
//! - Text exposition for the `/metrics` endpoint

pub mod error;
pub mod logging;
pub mod metrics;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::init_logging;
pub use metrics::Metrics;
