//! Pool Supervisor, one per backend class.
//!
//! # Responsibilities
//! - Reconcile live Target Managers against the enabled target set each tick
//! - Stagger manager starts so a new batch of targets does not storm a backend
//! - Keep removed managers in a draining table until they have been joined
//! - On cancellation, cancel and join every manager before returning

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::future::join_all;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::backend::Driver;
use crate::observability::metrics;
use crate::orchestrator::context::PoolContext;
use crate::orchestrator::manager::{ManagerHandle, TargetManager};
use crate::target::{BackendClass, TargetId};

pub struct PoolSupervisor<D: Driver> {
    ctx: Arc<PoolContext<D>>,
    backend: BackendClass,
    live: HashMap<TargetId, ManagerHandle>,
    draining: HashMap<TargetId, ManagerHandle>,
}

impl<D: Driver> PoolSupervisor<D> {
    pub fn new(ctx: Arc<PoolContext<D>>, backend: BackendClass) -> Self {
        Self {
            ctx,
            backend,
            live: HashMap::new(),
            draining: HashMap::new(),
        }
    }

    pub fn backend(&self) -> BackendClass {
        self.backend
    }

    /// Reconcile until `cancel` fires, then stop every manager.
    pub async fn run(mut self, cancel: CancellationToken) {
        tracing::info!(
            backend = %self.backend,
            tick_ms = self.ctx.timings.supervisor_tick.as_millis() as u64,
            "Pool supervisor starting"
        );

        let mut ticker = time::interval(self.ctx.timings.supervisor_tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            self.reconcile(&cancel).await;
        }

        self.shutdown().await;
        tracing::info!(backend = %self.backend, "Pool supervisor stopped");
    }

    /// One reconciliation pass.
    pub async fn reconcile(&mut self, cancel: &CancellationToken) {
        self.reap().await;

        let snapshot = self.ctx.registry.snapshot(self.backend);

        let removed: Vec<TargetId> = self
            .live
            .keys()
            .filter(|id| !snapshot.contains(id))
            .cloned()
            .collect();
        for id in removed {
            if let Some(handle) = self.live.remove(&id) {
                tracing::info!(backend = %self.backend, target_id = %id, "Target disabled or removed, stopping manager");
                handle.cancel();
                self.draining.insert(id, handle);
            }
        }

        let stagger = self.ctx.timings.manager_spawn_stagger;
        let mut spawned = 0usize;
        for id in snapshot.ids() {
            if self.live.contains_key(id) || self.draining.contains_key(id) {
                continue;
            }
            if spawned > 0 && !stagger.is_zero() {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = time::sleep(stagger) => {}
                }
            }
            if cancel.is_cancelled() {
                return;
            }
            let handle = TargetManager::spawn(Arc::clone(&self.ctx), self.backend, id.clone(), cancel);
            self.live.insert(id.clone(), handle);
            spawned += 1;
        }

        metrics::record_live_managers(self.backend, self.live.len());
    }

    /// Join managers that have finished: drained ones and ones that stopped on their own.
    async fn reap(&mut self) {
        let drained: Vec<TargetId> = self
            .draining
            .iter()
            .filter(|(_, h)| h.is_finished())
            .map(|(id, _)| id.clone())
            .collect();
        for id in drained {
            if let Some(handle) = self.draining.remove(&id) {
                handle.join().await;
                tracing::debug!(backend = %self.backend, target_id = %id, "Manager drained");
            }
        }

        let exited: Vec<TargetId> = self
            .live
            .iter()
            .filter(|(_, h)| h.is_finished())
            .map(|(id, _)| id.clone())
            .collect();
        for id in exited {
            if let Some(handle) = self.live.remove(&id) {
                handle.join().await;
                tracing::debug!(backend = %self.backend, target_id = %id, "Manager exited");
            }
        }
    }

    async fn shutdown(&mut self) {
        let handles: Vec<ManagerHandle> = self
            .live
            .drain()
            .chain(self.draining.drain())
            .map(|(_, h)| h)
            .collect();
        for handle in &handles {
            handle.cancel();
        }
        let count = handles.len();
        join_all(handles.into_iter().map(|h| h.join())).await;
        metrics::record_live_managers(self.backend, 0);
        tracing::info!(backend = %self.backend, managers = count, "All target managers joined");
    }

    /// Ids with a live (not draining) manager.
    pub fn live_ids(&self) -> Vec<TargetId> {
        let mut ids: Vec<_> = self.live.keys().cloned().collect();
        ids.sort();
        ids
    }
}
