//! Target Manager state machine.
//!
//! # Responsibilities
//! - Probe the target until healthy, then run its worker pool
//! - Keep the pool at the desired size, shrinking highest slots first
//! - Tear the pool down on health loss and start over
//! - Stop, joining every worker, when the target disappears or on cancel
//!
//! # State Machine
//! ```text
//!              healthy                  count changed
//! Connecting ─────────▶ Running ──────────────────────▶ ReconfiguringCount
//!     ▲                  │   ▲                                │
//!     │      unhealthy   │   └────────────────────────────────┘
//!     └──── Degraded ◀───┘
//!
//! any state ── target removed / cancelled ──▶ Stopped
//! ```
//!
//! # Design Decisions
//! - The worker map is owned by the control loop and needs no lock
//! - Cancellation is checked before every transition
//! - Every cancelled worker is joined before its handle is dropped

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time;
use tokio_util::sync::CancellationToken;

use crate::backend::Driver;
use crate::health::ProbeOutcome;
use crate::observability::metrics;
use crate::orchestrator::context::PoolContext;
use crate::orchestrator::status::ManagerState;
use crate::orchestrator::worker::WorkerHandle;
use crate::target::{BackendClass, Target, TargetId};

/// Supervisor's view of one running manager.
#[derive(Debug)]
pub struct ManagerHandle {
    cancel: CancellationToken,
    join: JoinHandle<()>,
}

impl ManagerHandle {
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    pub async fn join(self) {
        if let Err(e) = self.join.await {
            if e.is_panic() {
                tracing::error!("Target manager task panicked");
            }
        }
    }
}

pub struct TargetManager<D: Driver> {
    ctx: Arc<PoolContext<D>>,
    backend: BackendClass,
    id: TargetId,
    cancel: CancellationToken,
    state: ManagerState,
    workers: BTreeMap<usize, WorkerHandle>,
    /// Descriptor the current pool was started with.
    connected_with: Option<(String, Option<String>)>,
}

/// What the loop does after a state handler returns.
enum Step {
    Next(ManagerState),
    Stop,
}

impl<D: Driver> TargetManager<D> {
    pub fn new(ctx: Arc<PoolContext<D>>, backend: BackendClass, id: TargetId, cancel: CancellationToken) -> Self {
        Self {
            ctx,
            backend,
            id,
            cancel,
            state: ManagerState::Connecting,
            workers: BTreeMap::new(),
            connected_with: None,
        }
    }

    /// Start a manager task under a child of `parent`.
    pub fn spawn(
        ctx: Arc<PoolContext<D>>,
        backend: BackendClass,
        id: TargetId,
        parent: &CancellationToken,
    ) -> ManagerHandle {
        let cancel = parent.child_token();
        let manager = Self::new(ctx, backend, id, cancel.clone());
        let join = tokio::spawn(manager.run());
        ManagerHandle { cancel, join }
    }

    pub async fn run(mut self) {
        tracing::info!(backend = %self.backend, target_id = %self.id, "Target manager starting");
        self.publish_state();

        loop {
            if self.cancel.is_cancelled() {
                break;
            }
            let step = match self.state {
                ManagerState::Connecting => self.connecting().await,
                ManagerState::Running => self.running().await,
                ManagerState::ReconfiguringCount => self.reconfiguring().await,
                ManagerState::Degraded => self.degraded().await,
                ManagerState::Stopped => Step::Stop,
            };
            match step {
                Step::Next(next) if !self.cancel.is_cancelled() => self.transition(next),
                _ => break,
            }
        }

        self.stop_all_workers().await;
        self.transition(ManagerState::Stopped);
        tracing::info!(backend = %self.backend, target_id = %self.id, "Target manager stopped");
    }

    fn transition(&mut self, next: ManagerState) {
        if next != self.state {
            tracing::info!(
                backend = %self.backend,
                target_id = %self.id,
                from = %self.state,
                to = %next,
                "Target manager state change"
            );
        }
        self.state = next;
        self.publish_state();
    }

    fn publish_state(&self) {
        self.ctx.status.set_state(self.backend, &self.id, self.state);
    }

    fn publish_workers(&self) {
        let slots: BTreeSet<usize> = self.workers.keys().copied().collect();
        metrics::record_live_workers(self.backend, &self.id, slots.len());
        self.ctx.status.set_workers(self.backend, &self.id, slots);
    }

    fn current_target(&self) -> Option<Arc<Target>> {
        self.ctx.registry.target(self.backend, &self.id)
    }

    /// Sleep unless cancelled first. Returns false on cancellation.
    async fn pause(&self, duration: Duration) -> bool {
        tokio::select! {
            _ = self.cancel.cancelled() => false,
            _ = time::sleep(duration) => true,
        }
    }

    async fn probe(&self, target: &Target) -> Option<ProbeOutcome> {
        let outcome = tokio::select! {
            _ = self.cancel.cancelled() => return None,
            outcome = self.ctx.prober.probe(self.backend, &target.connection_string) => outcome,
        };
        metrics::record_target_health(self.backend, &self.id, outcome.is_healthy());
        Some(outcome)
    }

    async fn report_status(&self, outcome: &ProbeOutcome) {
        if let Err(e) = self.ctx.store.report_status(&self.id, &outcome.status_text()).await {
            tracing::debug!(target_id = %self.id, error = %e, "Status write-back failed");
        }
    }

    async fn connecting(&mut self) -> Step {
        let Some(target) = self.current_target() else {
            return Step::Stop;
        };
        let Some(outcome) = self.probe(&target).await else {
            return Step::Stop;
        };
        self.report_status(&outcome).await;

        if outcome.is_healthy() {
            self.connected_with = Some((target.connection_string.clone(), target.database.clone()));
            tracing::info!(
                backend = %self.backend,
                target_id = %self.id,
                descriptor = %target.redacted_descriptor(),
                connections = target.connections,
                "Target healthy, starting workers"
            );
            if !self.resize(&target).await {
                return Step::Stop;
            }
            return Step::Next(ManagerState::Running);
        }

        if self.pause(self.ctx.timings.connect_backoff).await {
            Step::Next(ManagerState::Connecting)
        } else {
            Step::Stop
        }
    }

    async fn running(&mut self) -> Step {
        if !self.pause(self.ctx.timings.manager_tick).await {
            return Step::Stop;
        }

        let Some(target) = self.current_target() else {
            tracing::info!(backend = %self.backend, target_id = %self.id, "Target removed");
            return Step::Stop;
        };

        let descriptor = (target.connection_string.clone(), target.database.clone());
        if self.connected_with.as_ref() != Some(&descriptor) {
            tracing::info!(
                backend = %self.backend,
                target_id = %self.id,
                "Connection settings changed, restarting pool"
            );
            return Step::Next(ManagerState::Degraded);
        }

        let Some(outcome) = self.probe(&target).await else {
            return Step::Stop;
        };
        if !outcome.is_healthy() {
            self.report_status(&outcome).await;
            return Step::Next(ManagerState::Degraded);
        }

        self.reap_finished_workers().await;
        if self.workers.len() != target.connections {
            return Step::Next(ManagerState::ReconfiguringCount);
        }
        Step::Next(ManagerState::Running)
    }

    async fn reconfiguring(&mut self) -> Step {
        let Some(target) = self.current_target() else {
            return Step::Stop;
        };
        if self.resize(&target).await {
            Step::Next(ManagerState::Running)
        } else {
            Step::Stop
        }
    }

    async fn degraded(&mut self) -> Step {
        let stopped = self.workers.len();
        self.stop_all_workers().await;
        self.connected_with = None;
        self.ctx.status.record_restart(self.backend, &self.id);
        metrics::record_manager_restart(self.backend, &self.id);
        tracing::warn!(
            backend = %self.backend,
            target_id = %self.id,
            stopped_workers = stopped,
            "Target unhealthy, pool stopped"
        );
        Step::Next(ManagerState::Connecting)
    }

    /// Bring the pool to `target.connections` workers.
    ///
    /// Shrinking cancels the highest slots first and joins them. Growing
    /// fills the missing slot indices with staggered starts. Returns false
    /// if cancelled part way.
    async fn resize(&mut self, target: &Arc<Target>) -> bool {
        let desired = target.connections;
        let current = self.workers.len();
        if desired == current {
            return true;
        }

        if desired < current {
            let mut cancelled = Vec::with_capacity(current - desired);
            while self.workers.len() > desired {
                if let Some((_, handle)) = self.workers.pop_last() {
                    handle.cancel();
                    cancelled.push(handle);
                }
            }
            let slots: Vec<usize> = cancelled.iter().map(|h| h.slot()).collect();
            for handle in cancelled {
                handle.join().await;
            }
            tracing::info!(
                backend = %self.backend,
                target_id = %self.id,
                from = current,
                to = desired,
                cancelled = ?slots,
                "Worker pool shrunk"
            );
            self.publish_workers();
            return true;
        }

        let stagger = self.ctx.timings.worker_spawn_stagger;
        let mut started = 0;
        for slot in 0..desired {
            if self.workers.contains_key(&slot) {
                continue;
            }
            if started > 0 && !stagger.is_zero() && !self.pause(stagger).await {
                self.publish_workers();
                return false;
            }
            if self.cancel.is_cancelled() {
                self.publish_workers();
                return false;
            }
            let handle = WorkerHandle::spawn(Arc::clone(&self.ctx), Arc::clone(target), slot, &self.cancel);
            self.workers.insert(slot, handle);
            started += 1;
            self.publish_workers();
        }
        tracing::info!(
            backend = %self.backend,
            target_id = %self.id,
            from = current,
            to = desired,
            "Worker pool grown"
        );
        true
    }

    /// Join workers that exited on their own so resize can refill their slots.
    async fn reap_finished_workers(&mut self) {
        let finished: Vec<usize> = self
            .workers
            .iter()
            .filter(|(_, h)| h.is_finished())
            .map(|(slot, _)| *slot)
            .collect();
        for slot in finished {
            if let Some(handle) = self.workers.remove(&slot) {
                handle.join().await;
            }
        }
    }

    async fn stop_all_workers(&mut self) {
        if self.workers.is_empty() {
            self.publish_workers();
            return;
        }
        let handles: Vec<WorkerHandle> = std::mem::take(&mut self.workers).into_values().rev().collect();
        for handle in &handles {
            handle.cancel();
        }
        for handle in handles {
            handle.join().await;
        }
        self.publish_workers();
    }
}
