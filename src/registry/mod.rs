//! Target registry subsystem.
//!
//! # Data Flow
//! ```text
//! Periodic timer (or targets-file nudge)
//!     → refresher.rs pulls records per backend from the config store
//!     → parse records, drop disabled targets
//!     → snapshot.rs builds an immutable TargetSet
//!     → atomic swap into Registry
//!     → supervisors, managers and workers read snapshots
//! ```
//!
//! # Design Decisions
//! - Single writer (the refresher), many readers
//! - Reads are lock-free pointer loads, never held across an await
//! - Store failures keep the previous snapshot; nothing blocks on the store

pub mod refresher;
pub mod snapshot;

pub use refresher::{RefreshReport, Registry, RegistryRefresher};
pub use snapshot::{TargetSet, TargetSetDiff};
