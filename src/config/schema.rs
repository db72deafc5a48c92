//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the load
//! generator. All types derive Serde traits for deserialization from TOML.
//! Targets themselves are not part of this file; they live in the config
//! store and change at runtime.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::health::ProbeTimeouts;
use crate::target::BackendClass;

/// Root configuration for the load generator.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Where target definitions are read from.
    pub store: StoreConfig,

    /// Target registry refresh settings.
    pub registry: RegistryConfig,

    /// Pool supervisor settings.
    pub supervisor: SupervisorConfig,

    /// Target manager settings.
    pub manager: ManagerConfig,

    /// Worker settings.
    pub worker: WorkerConfig,

    /// Health probe timeouts.
    pub health: HealthConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Target store configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Path to the TOML file holding `[[targets]]` tables.
    pub path: String,

    /// Refresh early when the targets file changes.
    pub watch: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: "targets.toml".to_string(),
            watch: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RegistryConfig {
    pub refresh_interval_ms: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            refresh_interval_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SupervisorConfig {
    /// Backend classes to drive load against. One supervisor runs per entry.
    pub backends: Vec<BackendClass>,

    /// Reconciliation tick.
    pub tick_interval_ms: u64,

    /// Delay between starting two managers in the same tick.
    pub spawn_stagger_ms: u64,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            backends: BackendClass::ALL.to_vec(),
            tick_interval_ms: 3_000,
            spawn_stagger_ms: 250,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Wait between failed probes while connecting.
    pub connect_backoff_ms: u64,

    /// Health and resize check interval while running.
    pub tick_interval_ms: u64,

    /// Delay between starting two workers.
    pub worker_stagger_ms: u64,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            connect_backoff_ms: 5_000,
            tick_interval_ms: 3_000,
            worker_stagger_ms: 50,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// How often a worker re-reads its target from the registry.
    pub refresh_interval_ms: u64,

    /// Base delay for reconnect backoff.
    pub reconnect_base_ms: u64,

    /// Upper bound for reconnect backoff.
    pub reconnect_max_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            refresh_interval_ms: 2_000,
            reconnect_base_ms: 500,
            reconnect_max_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthConfig {
    pub mysql_timeout_ms: u64,
    pub postgres_timeout_ms: u64,
    pub mongodb_timeout_ms: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            mysql_timeout_ms: 2_000,
            postgres_timeout_ms: 5_000,
            mongodb_timeout_ms: 5_000,
        }
    }
}

impl HealthConfig {
    pub fn timeouts(&self) -> ProbeTimeouts {
        ProbeTimeouts {
            mysql: Duration::from_millis(self.mysql_timeout_ms),
            postgres: Duration::from_millis(self.postgres_timeout_ms),
            mongodb: Duration::from_millis(self.mongodb_timeout_ms),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error) or a full filter directive.
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
