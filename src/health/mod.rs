//! Health probing subsystem.
//!
//! # Data Flow
//! ```text
//! Target Manager (Connecting / Running / CLI check)
//!     → prober.rs applies the per-backend timeout
//!     → Driver::probe connects and pings once
//!     → ProbeOutcome back to the caller
//! ```
//!
//! # Design Decisions
//! - Probes are one-shot; thresholds and retry pacing belong to the Manager
//! - A timeout is reported as Unhealthy, never as an error
//! - SchemaMissing is its own outcome so operators see why a target idles

pub mod prober;

pub use prober::{HealthProber, ProbeTimeouts};

/// Result of a single health probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    Healthy,
    Unhealthy(String),
    /// Server reachable but the configured database does not exist.
    SchemaMissing,
}

impl ProbeOutcome {
    pub fn is_healthy(&self) -> bool {
        matches!(self, ProbeOutcome::Healthy)
    }

    /// Text written back to the target's `connection_status` field.
    pub fn status_text(&self) -> String {
        match self {
            ProbeOutcome::Healthy => "Connected".to_string(),
            ProbeOutcome::Unhealthy(reason) => format!("Error: {}", reason),
            ProbeOutcome::SchemaMissing => "Error: database does not exist".to_string(),
        }
    }
}

impl std::fmt::Display for ProbeOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProbeOutcome::Healthy => write!(f, "healthy"),
            ProbeOutcome::Unhealthy(reason) => write!(f, "unhealthy: {}", reason),
            ProbeOutcome::SchemaMissing => write!(f, "schema missing"),
        }
    }
}
