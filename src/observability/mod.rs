//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events via tracing)
//!     → metrics.rs (counters and gauges)
//!
//! Consumers:
//!     → Log aggregation (stdout, pretty or JSON)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Structured fields (backend, target_id, slot, state) on every event
//! - Metrics are cheap (atomic updates) and recorded even when no exporter is installed
//! - Connection descriptors are redacted before they reach a log line

pub mod logging;
pub mod metrics;
