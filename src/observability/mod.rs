//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events, runtime log level)
//!     → metrics.rs (counters and gauges)
//!
//! Consumers:
//!     → stdout (fmt layer)
//!     → Prometheus scrape endpoint (optional)
//! ```
//!
//! # Design Decisions
//! - Log level is part of the applied configuration and readable back
//! - Metrics are cheap and safe to record without an installed exporter

pub mod logging;
pub mod metrics;

pub use logging::{LogControl, LogLevel};
