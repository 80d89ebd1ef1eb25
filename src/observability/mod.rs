//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events, reloadable level)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → stdout
//!     → Metrics endpoint (Prometheus scrape, when --metrics-addr is set)
//! ```
//!
//! # Design Decisions
//! - Request ID flows through every request span (see `http::request`)
//! - Metrics are cheap and silently dropped without a recorder

pub mod logging;
pub mod metrics;

pub use logging::{LogHandle, LoggingError};
pub use metrics::Outcome;
