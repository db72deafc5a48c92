//! Database load generator library.

pub mod backend;
pub mod config;
pub mod health;
pub mod lifecycle;
pub mod observability;
pub mod orchestrator;
pub mod registry;
pub mod resilience;
pub mod store;
pub mod target;

pub use backend::{DatabaseDriver, Driver, DriverError};
pub use config::schema::AppConfig;
pub use lifecycle::Shutdown;
pub use orchestrator::{ManagerState, Orchestrator, PoolContext, StatusBoard, Timings};
pub use registry::{Registry, RegistryRefresher};
pub use target::{BackendClass, Target, TargetId};
