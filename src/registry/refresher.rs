//! Registry and its refresher.
//!
//! # Responsibilities
//! - Hold the latest enabled-target snapshot per backend class
//! - Periodically pull records from the config store and publish new snapshots
//! - Keep the previous view when the store cannot be read

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use tokio::sync::mpsc;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::observability::metrics;
use crate::registry::snapshot::{TargetSet, TargetSetDiff};
use crate::store::{ConfigStore, StoreError};
use crate::target::{BackendClass, Target, TargetId};

/// Latest target snapshots, one per backend class.
///
/// Reads are a pointer load and never wait on the refresher.
#[derive(Debug)]
pub struct Registry {
    snapshots: HashMap<BackendClass, ArcSwap<TargetSet>>,
}

impl Registry {
    pub fn new() -> Self {
        let snapshots = BackendClass::ALL
            .iter()
            .map(|b| (*b, ArcSwap::from_pointee(TargetSet::empty(*b))))
            .collect();
        Self { snapshots }
    }

    /// Current enabled-target set for a backend class.
    pub fn snapshot(&self, backend: BackendClass) -> Arc<TargetSet> {
        match self.snapshots.get(&backend) {
            Some(slot) => slot.load_full(),
            None => Arc::new(TargetSet::empty(backend)),
        }
    }

    /// Current definition of one enabled target.
    pub fn target(&self, backend: BackendClass, id: &TargetId) -> Option<Arc<Target>> {
        self.snapshots
            .get(&backend)
            .and_then(|slot| slot.load().get(id).cloned())
    }

    /// Replace a snapshot, returning what changed. Only the refresher writes.
    pub(crate) fn publish(&self, set: TargetSet) -> TargetSetDiff {
        let backend = set.backend();
        let Some(slot) = self.snapshots.get(&backend) else {
            return TargetSetDiff::default();
        };
        let set = Arc::new(set);
        let previous = slot.swap(Arc::clone(&set));
        set.diff(&previous)
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

/// Outcome of one refresh pass.
#[derive(Debug, Default)]
pub struct RefreshReport {
    /// Per-backend diff for backends that were read successfully.
    pub diffs: HashMap<BackendClass, TargetSetDiff>,
    /// Backends whose store read failed; their snapshot was kept.
    pub failed: Vec<BackendClass>,
    /// Records skipped because they could not be parsed.
    pub malformed: usize,
}

/// Pulls target records from the store into the [`Registry`].
pub struct RegistryRefresher {
    store: Arc<dyn ConfigStore>,
    registry: Arc<Registry>,
    backends: Vec<BackendClass>,
    interval: Duration,
    nudge: Option<mpsc::UnboundedReceiver<()>>,
    generation: u64,
}

impl RegistryRefresher {
    pub fn new(
        store: Arc<dyn ConfigStore>,
        registry: Arc<Registry>,
        backends: Vec<BackendClass>,
        interval: Duration,
    ) -> Self {
        Self {
            store,
            registry,
            backends,
            interval,
            nudge: None,
            generation: 0,
        }
    }

    /// Refresh immediately whenever a message arrives on `nudge`.
    pub fn with_nudge(mut self, nudge: mpsc::UnboundedReceiver<()>) -> Self {
        self.nudge = Some(nudge);
        self
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Refresh every configured backend once.
    pub async fn refresh_now(&mut self) -> RefreshReport {
        self.generation += 1;
        let mut report = RefreshReport::default();

        for backend in self.backends.clone() {
            match self.refresh_backend(backend).await {
                Ok((diff, malformed)) => {
                    report.malformed += malformed;
                    report.diffs.insert(backend, diff);
                }
                Err(e) => {
                    tracing::warn!(
                        backend = %backend,
                        error = %e,
                        "Config store read failed, keeping previous targets"
                    );
                    report.failed.push(backend);
                }
            }
        }
        report
    }

    async fn refresh_backend(&self, backend: BackendClass) -> Result<(TargetSetDiff, usize), StoreError> {
        let records = self.store.list_targets(backend).await?;
        let previous = self.registry.snapshot(backend);

        let mut malformed = 0;
        let mut targets = Vec::with_capacity(records.len());
        let mut listed = HashSet::with_capacity(records.len());
        for record in &records {
            if let Some(id) = record.id() {
                listed.insert(TargetId::new(id));
            }
            match Target::try_from(record) {
                Ok(target) => targets.push(Arc::new(target)),
                Err(e) => {
                    malformed += 1;
                    let kept = record
                        .id()
                        .and_then(|id| previous.get(&TargetId::new(id)).cloned());
                    tracing::warn!(
                        backend = %backend,
                        error = %e,
                        kept_previous = kept.is_some(),
                        "Skipping malformed target record"
                    );
                    if let Some(old) = kept {
                        targets.push(old);
                    }
                }
            }
        }

        // A previously known target missing from the listing may still exist
        // with a backend field that no longer parses; it keeps its old definition.
        for old in previous.iter().filter(|t| !listed.contains(&t.id)) {
            let Some(record) = self.store.get_target(&old.id).await? else {
                continue;
            };
            if let Err(e) = Target::try_from(&record) {
                malformed += 1;
                tracing::warn!(
                    backend = %backend,
                    target_id = %old.id,
                    error = %e,
                    kept_previous = true,
                    "Skipping malformed target record"
                );
                targets.push(Arc::clone(old));
            }
        }

        let set = TargetSet::from_targets(backend, self.generation, targets);
        let enabled = set.len();
        let diff = self.registry.publish(set);

        metrics::record_enabled_targets(backend, enabled);
        if !diff.is_empty() {
            tracing::info!(
                backend = %backend,
                enabled,
                added = ?diff.added,
                removed = ?diff.removed,
                changed = ?diff.changed,
                "Target set changed"
            );
        }
        Ok((diff, malformed))
    }

    /// Refresh on every tick (and nudge) until cancelled.
    pub async fn run(mut self, cancel: CancellationToken) {
        tracing::info!(
            interval_ms = self.interval.as_millis() as u64,
            backends = ?self.backends,
            "Registry refresher starting"
        );

        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut nudge = self.nudge.take();

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
                Some(()) = next_nudge(&mut nudge) => {
                    tracing::debug!("Targets file changed, refreshing early");
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = self.refresh_now() => {}
            }
        }

        tracing::info!("Registry refresher stopped");
    }
}

async fn next_nudge(rx: &mut Option<mpsc::UnboundedReceiver<()>>) -> Option<()> {
    match rx {
        Some(inner) => match inner.recv().await {
            Some(()) => Some(()),
            None => {
                *rx = None;
                None
            }
        },
        None => std::future::pending().await,
    }
}
