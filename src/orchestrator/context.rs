//! Shared dependencies and timing parameters of one orchestrator.

use std::sync::Arc;
use std::time::Duration;

use crate::backend::Driver;
use crate::config::AppConfig;
use crate::health::HealthProber;
use crate::orchestrator::status::StatusBoard;
use crate::registry::Registry;
use crate::store::ConfigStore;

/// Every interval and stagger the orchestrator waits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timings {
    pub supervisor_tick: Duration,
    pub manager_spawn_stagger: Duration,
    pub connect_backoff: Duration,
    pub manager_tick: Duration,
    pub worker_spawn_stagger: Duration,
    pub worker_refresh: Duration,
    pub reconnect_base: Duration,
    pub reconnect_max: Duration,
}

impl Timings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            supervisor_tick: Duration::from_millis(config.supervisor.tick_interval_ms),
            manager_spawn_stagger: Duration::from_millis(config.supervisor.spawn_stagger_ms),
            connect_backoff: Duration::from_millis(config.manager.connect_backoff_ms),
            manager_tick: Duration::from_millis(config.manager.tick_interval_ms),
            worker_spawn_stagger: Duration::from_millis(config.manager.worker_stagger_ms),
            worker_refresh: Duration::from_millis(config.worker.refresh_interval_ms),
            reconnect_base: Duration::from_millis(config.worker.reconnect_base_ms),
            reconnect_max: Duration::from_millis(config.worker.reconnect_max_ms),
        }
    }
}

impl Default for Timings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

/// What every supervisor, manager and worker needs. Shared via `Arc`.
pub struct PoolContext<D: Driver> {
    pub registry: Arc<Registry>,
    pub driver: Arc<D>,
    pub prober: HealthProber<D>,
    pub store: Arc<dyn ConfigStore>,
    pub timings: Timings,
    pub status: StatusBoard,
}

impl<D: Driver> PoolContext<D> {
    pub fn new(
        registry: Arc<Registry>,
        driver: Arc<D>,
        prober: HealthProber<D>,
        store: Arc<dyn ConfigStore>,
        timings: Timings,
    ) -> Self {
        Self {
            registry,
            driver,
            prober,
            store,
            timings,
            status: StatusBoard::new(),
        }
    }
}
