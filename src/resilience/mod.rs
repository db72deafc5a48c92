//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Worker connect attempt fails:
//!     → backoff.rs (exponential delay with jitter)
//!     → sleep, cancellable
//!     → retry connect
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every connect and probe has a deadline
//! - Retry pacing is per worker so one slow target does not slow others

pub mod backoff;
