//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → AppConfig (validated, immutable)
//!     → Timings and ProbeTimeouts handed to the orchestrator
//!
//! Targets file (separate, changes at runtime):
//!     watcher.rs detects change
//!     → nudge to the registry refresher
//!     → refresher re-reads the store
//! ```
//!
//! # Design Decisions
//! - Process config is immutable once loaded; only targets change live
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, load_config_or_default, ConfigError};
pub use schema::{
    AppConfig, HealthConfig, LogFormat, ManagerConfig, ObservabilityConfig, RegistryConfig, StoreConfig,
    SupervisorConfig, WorkerConfig,
};
pub use watcher::ConfigWatcher;
