//! Worker-pool orchestrator.
//!
//! # Data Flow
//! ```text
//! Orchestrator (root token)
//!     ├── RegistryRefresher task ── publishes TargetSet per backend
//!     └── PoolSupervisor per backend (supervisor.rs)
//!             └── TargetManager per enabled target (manager.rs)
//!                     └── Worker per slot (worker.rs)
//!
//! Managers publish ManagerStatus to the StatusBoard (status.rs)
//! ```
//!
//! # Design Decisions
//! - Cancellation is hierarchical: each owner hands its children child tokens
//! - Each owner joins its direct children before it returns
//! - No error crosses a task boundary; failures become state transitions or log lines

pub mod context;
pub mod manager;
pub mod status;
pub mod supervisor;
pub mod worker;

use std::sync::Arc;

use futures_util::future::join_all;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::backend::Driver;
use crate::registry::RegistryRefresher;
use crate::target::BackendClass;

pub use context::{PoolContext, Timings};
pub use manager::{ManagerHandle, TargetManager};
pub use status::{ManagerState, ManagerStatus, StatusBoard};
pub use supervisor::PoolSupervisor;
pub use worker::WorkerHandle;

/// Running refresher and supervisors.
pub struct Orchestrator {
    cancel: CancellationToken,
    status: StatusBoard,
    refresher: JoinHandle<()>,
    supervisors: Vec<(BackendClass, JoinHandle<()>)>,
}

impl Orchestrator {
    /// Load targets once, then start the refresher and one supervisor per backend.
    pub async fn start<D: Driver>(
        ctx: Arc<PoolContext<D>>,
        mut refresher: RegistryRefresher,
        backends: &[BackendClass],
        parent: &CancellationToken,
    ) -> Self {
        let cancel = parent.child_token();

        let report = refresher.refresh_now().await;
        tracing::info!(
            backends = ?backends,
            failed = ?report.failed,
            malformed = report.malformed,
            "Initial target load complete"
        );

        let refresher = tokio::spawn(refresher.run(cancel.child_token()));
        let supervisors = backends
            .iter()
            .map(|backend| {
                let supervisor = PoolSupervisor::new(Arc::clone(&ctx), *backend);
                (*backend, tokio::spawn(supervisor.run(cancel.child_token())))
            })
            .collect();

        Self {
            cancel,
            status: ctx.status.clone(),
            refresher,
            supervisors,
        }
    }

    pub fn status(&self) -> &StatusBoard {
        &self.status
    }

    /// Cancel everything and wait until every task has been joined.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        self.join().await;
    }

    /// Wait for all tasks. Returns once the parent token fired and everything stopped.
    pub async fn join(self) {
        let results = join_all(self.supervisors.into_iter().map(|(backend, handle)| async move {
            (backend, handle.await)
        }))
        .await;
        for (backend, result) in results {
            if let Err(e) = result {
                tracing::error!(backend = %backend, error = %e, "Pool supervisor task failed");
            }
        }
        if let Err(e) = self.refresher.await {
            tracing::error!(error = %e, "Registry refresher task failed");
        }
        tracing::info!("Orchestrator stopped");
    }
}
