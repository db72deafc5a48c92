//! Workload worker.
//!
//! # Responsibilities
//! - Hold one dedicated connection for its slot, reconnecting with backoff
//! - Run every enabled workload once per iteration
//! - Re-read its target from the registry at a bounded staleness
//! - Exit cleanly when the target disappears or its token is cancelled
//!
//! # Design Decisions
//! - Workload failures are logged and counted, never fatal
//! - An in-flight workload is dropped when the token fires
//! - The connection is dropped with the worker; nothing outlives the task

use std::sync::Arc;
use std::time::Instant;

use tokio::task::JoinHandle;
use tokio::time;
use tokio_util::sync::CancellationToken;

use crate::backend::Driver;
use crate::observability::metrics;
use crate::orchestrator::context::PoolContext;
use crate::resilience::backoff::Backoff;
use crate::target::{BackendClass, Target, TargetId};

/// Owner's view of one running worker.
#[derive(Debug)]
pub struct WorkerHandle {
    slot: usize,
    cancel: CancellationToken,
    join: JoinHandle<()>,
}

impl WorkerHandle {
    /// Start a worker for `slot` under a child of `parent`.
    pub fn spawn<D: Driver>(
        ctx: Arc<PoolContext<D>>,
        target: Arc<Target>,
        slot: usize,
        parent: &CancellationToken,
    ) -> Self {
        let cancel = parent.child_token();
        let worker = Worker {
            backend: target.backend,
            id: target.id.clone(),
            ctx,
            slot,
            cancel: cancel.clone(),
        };
        let join = tokio::spawn(worker.run(target));
        Self { slot, cancel, join }
    }

    pub fn slot(&self) -> usize {
        self.slot
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Wait for the task to end. A panicked worker is logged, not propagated.
    pub async fn join(self) {
        if let Err(e) = self.join.await {
            if e.is_panic() {
                tracing::error!(slot = self.slot, "Worker task panicked");
            }
        }
    }
}

struct Worker<D: Driver> {
    ctx: Arc<PoolContext<D>>,
    backend: BackendClass,
    id: TargetId,
    slot: usize,
    cancel: CancellationToken,
}

impl<D: Driver> Worker<D> {
    async fn run(self, initial: Arc<Target>) {
        let timings = self.ctx.timings;
        let connect_timeout = self.ctx.prober.timeouts().for_backend(self.backend);
        let mut backoff = Backoff::new(timings.reconnect_base, timings.reconnect_max);
        let mut target = initial;
        let mut refreshed_at = Instant::now();
        let mut connection: Option<D::Connection> = None;

        tracing::debug!(backend = %self.backend, target_id = %self.id, slot = self.slot, "Worker started");

        'iterations: loop {
            if self.cancel.is_cancelled() {
                break;
            }

            if refreshed_at.elapsed() >= timings.worker_refresh {
                match self.ctx.registry.target(self.backend, &self.id) {
                    Some(latest) => target = latest,
                    None => {
                        tracing::info!(
                            backend = %self.backend,
                            target_id = %self.id,
                            slot = self.slot,
                            "Target no longer exists, worker exiting"
                        );
                        break;
                    }
                }
                refreshed_at = Instant::now();
            }

            let workloads = target.workloads.enabled();
            if workloads.is_empty() {
                tokio::select! {
                    _ = self.cancel.cancelled() => break,
                    _ = time::sleep(timings.worker_refresh) => continue,
                }
            }

            if connection.is_none() {
                let attempt = tokio::select! {
                    _ = self.cancel.cancelled() => break,
                    r = time::timeout(connect_timeout, self.ctx.driver.connect(&target)) => r,
                };
                match attempt {
                    Ok(Ok(conn)) => {
                        if backoff.attempts() > 0 {
                            tracing::info!(
                                backend = %self.backend,
                                target_id = %self.id,
                                slot = self.slot,
                                "Worker reconnected"
                            );
                        }
                        backoff.reset();
                        connection = Some(conn);
                    }
                    Ok(Err(e)) => {
                        let delay = backoff.next_delay();
                        tracing::warn!(
                            backend = %self.backend,
                            target_id = %self.id,
                            slot = self.slot,
                            error = %e,
                            retry_in_ms = delay.as_millis() as u64,
                            "Worker connect failed"
                        );
                        tokio::select! {
                            _ = self.cancel.cancelled() => break,
                            _ = time::sleep(delay) => continue,
                        }
                    }
                    Err(_) => {
                        let delay = backoff.next_delay();
                        tracing::warn!(
                            backend = %self.backend,
                            target_id = %self.id,
                            slot = self.slot,
                            retry_in_ms = delay.as_millis() as u64,
                            "Worker connect timed out"
                        );
                        tokio::select! {
                            _ = self.cancel.cancelled() => break,
                            _ = time::sleep(delay) => continue,
                        }
                    }
                }
            }

            let mut lost = false;
            if let Some(conn) = connection.as_mut() {
                for workload in workloads {
                    let result = tokio::select! {
                        biased;
                        _ = self.cancel.cancelled() => break 'iterations,
                        r = self.ctx.driver.run(conn, workload, self.slot, &target) => r,
                    };
                    match result {
                        Ok(()) => metrics::record_workload(self.backend, workload, true),
                        Err(e) => {
                            metrics::record_workload(self.backend, workload, false);
                            tracing::warn!(
                                backend = %self.backend,
                                target_id = %self.id,
                                slot = self.slot,
                                workload = workload.as_str(),
                                error = %e,
                                "Workload failed"
                            );
                            if e.is_connection_lost() {
                                lost = true;
                                break;
                            }
                        }
                    }
                }
            }
            if lost {
                connection = None;
            }

            let delay = target.inter_iteration_delay();
            if delay.is_zero() {
                tokio::task::yield_now().await;
            } else {
                tokio::select! {
                    _ = self.cancel.cancelled() => break,
                    _ = time::sleep(delay) => {}
                }
            }
        }

        drop(connection);
        tracing::debug!(backend = %self.backend, target_id = %self.id, slot = self.slot, "Worker stopped");
    }
}
