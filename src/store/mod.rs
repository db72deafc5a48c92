//! Config store subsystem.
//!
//! # Data Flow
//! ```text
//! store backend (file.rs: TOML targets file, memory.rs: in-process map)
//!     → ConfigStore::list_targets(backend) → Vec<TargetRecord>
//!     → registry refresher parses and publishes snapshots
//!
//! Manager state transitions
//!     → ConfigStore::report_status (best effort, never required)
//! ```
//!
//! # Design Decisions
//! - Store returns raw records; parsing is shared (target::record)
//! - A read failure is transient: callers keep their previous view
//! - Status write-back is optional and its failure is only logged

pub mod file;
pub mod memory;

use async_trait::async_trait;
use thiserror::Error;

use crate::target::{BackendClass, TargetId, TargetRecord};

pub use file::FileStore;
pub use memory::MemoryStore;

/// Errors reading from or writing to the config store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store parse error: {0}")]
    Parse(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Read access to target definitions, plus optional status write-back.
#[async_trait]
pub trait ConfigStore: Send + Sync + 'static {
    /// All records whose backend field names `backend`, enabled or not.
    async fn list_targets(&self, backend: BackendClass) -> Result<Vec<TargetRecord>, StoreError>;

    /// A single record, `None` if no record has this id.
    async fn get_target(&self, id: &TargetId) -> Result<Option<TargetRecord>, StoreError>;

    /// Record the latest connection status of a target.
    async fn report_status(&self, _id: &TargetId, _status: &str) -> Result<(), StoreError> {
        Ok(())
    }
}
