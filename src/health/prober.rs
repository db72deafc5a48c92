//! One-shot health probes with per-backend timeouts.
//!
//! # Responsibilities
//! - Bound every probe by the timeout of its backend class
//! - Turn timeouts into `Unhealthy` outcomes
//! - Log failures with the redacted descriptor

use std::sync::Arc;
use std::time::Duration;

use tokio::time;

use crate::backend::Driver;
use crate::health::ProbeOutcome;
use crate::target::{redact, BackendClass};

/// Hard probe timeout per backend class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeTimeouts {
    pub mysql: Duration,
    pub postgres: Duration,
    pub mongodb: Duration,
}

impl ProbeTimeouts {
    pub fn for_backend(&self, backend: BackendClass) -> Duration {
        match backend {
            BackendClass::MySql => self.mysql,
            BackendClass::Postgres => self.postgres,
            BackendClass::MongoDb => self.mongodb,
        }
    }
}

impl Default for ProbeTimeouts {
    fn default() -> Self {
        Self {
            mysql: Duration::from_secs(2),
            postgres: Duration::from_secs(5),
            mongodb: Duration::from_secs(5),
        }
    }
}

pub struct HealthProber<D> {
    driver: Arc<D>,
    timeouts: ProbeTimeouts,
}

impl<D: Driver> HealthProber<D> {
    pub fn new(driver: Arc<D>, timeouts: ProbeTimeouts) -> Self {
        Self { driver, timeouts }
    }

    pub fn timeouts(&self) -> &ProbeTimeouts {
        &self.timeouts
    }

    /// Connect, ping and report. Never blocks longer than the backend timeout.
    pub async fn probe(&self, backend: BackendClass, descriptor: &str) -> ProbeOutcome {
        let timeout = self.timeouts.for_backend(backend);

        let outcome = match time::timeout(timeout, self.driver.probe(backend, descriptor)).await {
            Ok(outcome) => outcome,
            Err(_) => ProbeOutcome::Unhealthy(format!("probe timed out after {:?}", timeout)),
        };

        match &outcome {
            ProbeOutcome::Healthy => {
                tracing::debug!(backend = %backend, "Health probe succeeded");
            }
            ProbeOutcome::Unhealthy(reason) => {
                tracing::warn!(
                    backend = %backend,
                    descriptor = %redact(descriptor),
                    reason = %reason,
                    "Health probe failed"
                );
            }
            ProbeOutcome::SchemaMissing => {
                tracing::warn!(
                    backend = %backend,
                    descriptor = %redact(descriptor),
                    "Health probe failed: database does not exist"
                );
            }
        }
        outcome
    }
}

impl<D> Clone for HealthProber<D> {
    fn clone(&self) -> Self {
        Self {
            driver: Arc::clone(&self.driver),
            timeouts: self.timeouts,
        }
    }
}
