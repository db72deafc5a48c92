//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → wait_for_signal returns
//!
//! Shutdown (shutdown.rs):
//!     trigger() → root token cancelled
//!     → supervisors cancel managers → managers cancel workers
//!     → every owner joins its children before returning
//! ```
//!
//! # Design Decisions
//! - One root cancellation token; every task holds a child of its owner's token
//! - Ordered shutdown: leaves stop first, owners return after joining them

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
pub use signals::wait_for_signal;
