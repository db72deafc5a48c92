//! Observable manager state.
//!
//! Managers publish every transition and every change of their worker set
//! here. Entries outlive their manager so the last state stays visible.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;

use crate::target::{BackendClass, TargetId};

/// Target Manager state machine states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ManagerState {
    /// Probing until the target is healthy. No workers run.
    Connecting,
    /// Exactly the desired number of workers run.
    Running,
    /// Growing or shrinking the worker pool.
    ReconfiguringCount,
    /// Health lost; tearing the pool down before reconnecting.
    Degraded,
    /// Terminal. Every worker has been joined.
    Stopped,
}

impl ManagerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ManagerState::Connecting => "connecting",
            ManagerState::Running => "running",
            ManagerState::ReconfiguringCount => "reconfiguring",
            ManagerState::Degraded => "degraded",
            ManagerState::Stopped => "stopped",
        }
    }
}

impl fmt::Display for ManagerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of one manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagerStatus {
    pub state: ManagerState,
    /// Slot indices with a live worker.
    pub live_workers: BTreeSet<usize>,
    /// Number of Degraded → Connecting restarts.
    pub restarts: u64,
}

impl Default for ManagerStatus {
    fn default() -> Self {
        Self {
            state: ManagerState::Connecting,
            live_workers: BTreeSet::new(),
            restarts: 0,
        }
    }
}

type Key = (BackendClass, TargetId);

/// Shared, lock-sharded map of manager statuses.
#[derive(Debug, Clone, Default)]
pub struct StatusBoard {
    inner: Arc<DashMap<Key, ManagerStatus>>,
}

impl StatusBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_state(&self, backend: BackendClass, id: &TargetId, state: ManagerState) {
        self.inner.entry((backend, id.clone())).or_default().state = state;
    }

    pub fn set_workers(&self, backend: BackendClass, id: &TargetId, slots: BTreeSet<usize>) {
        self.inner.entry((backend, id.clone())).or_default().live_workers = slots;
    }

    pub fn record_restart(&self, backend: BackendClass, id: &TargetId) {
        self.inner.entry((backend, id.clone())).or_default().restarts += 1;
    }

    pub fn get(&self, backend: BackendClass, id: &TargetId) -> Option<ManagerStatus> {
        self.inner.get(&(backend, id.clone())).map(|entry| entry.value().clone())
    }

    pub fn state(&self, backend: BackendClass, id: &TargetId) -> Option<ManagerState> {
        self.inner.get(&(backend, id.clone())).map(|entry| entry.state)
    }

    /// Live slot indices, empty if the target has no manager entry.
    pub fn live_workers(&self, backend: BackendClass, id: &TargetId) -> BTreeSet<usize> {
        self.inner
            .get(&(backend, id.clone()))
            .map(|entry| entry.live_workers.clone())
            .unwrap_or_default()
    }

    /// All entries of one backend class, ordered by id.
    pub fn entries(&self, backend: BackendClass) -> Vec<(TargetId, ManagerStatus)> {
        let mut out: Vec<_> = self
            .inner
            .iter()
            .filter(|entry| entry.key().0 == backend)
            .map(|entry| (entry.key().1.clone(), entry.value().clone()))
            .collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }

    /// Sum of live workers across every target of every backend.
    pub fn total_live_workers(&self) -> usize {
        self.inner.iter().map(|entry| entry.live_workers.len()).sum()
    }
}
