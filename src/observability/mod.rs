//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! bus / lifecycle / shutdown produce:
//!     → logging.rs (structured tracing events)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → stderr (log lines, never the UI's stdout)
//!     → Metrics endpoint (Prometheus scrape, opt-in)
//! ```
//!
//! # Design Decisions
//! - Every phase change, drop and step outcome is logged with structured fields
//! - Metrics are cheap facade calls; no recorder means no cost

pub mod logging;
pub mod metrics;
