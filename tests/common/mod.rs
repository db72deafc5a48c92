//! Shared utilities for orchestrator integration tests.

#![allow(dead_code)]

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio_util::sync::CancellationToken;

use load_generator::backend::{Driver, DriverError};
use load_generator::health::{HealthProber, ProbeOutcome, ProbeTimeouts};
use load_generator::store::{ConfigStore, MemoryStore};
use load_generator::target::{BackendClass, Target, TargetId, Workload, WorkloadFlags};
use load_generator::{Orchestrator, PoolContext, Registry, RegistryRefresher, Timings};

/// Driver whose health is scripted per connection string.
#[derive(Debug, Default)]
pub struct FakeDriver {
    unhealthy: DashMap<String, ()>,
    failing_queries: DashMap<TargetId, ()>,
    live: Arc<AtomicUsize>,
    live_by_target: Arc<DashMap<TargetId, usize>>,
    connects: DashMap<TargetId, usize>,
    runs: DashMap<TargetId, usize>,
    runs_by_workload: DashMap<(TargetId, Workload), usize>,
    query_failures: DashMap<TargetId, usize>,
}

impl FakeDriver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_healthy(&self, descriptor: &str, healthy: bool) {
        if healthy {
            self.unhealthy.remove(descriptor);
        } else {
            self.unhealthy.insert(descriptor.to_string(), ());
        }
    }

    /// Make every workload on `id` fail with a query error while connections stay up.
    pub fn set_query_failure(&self, id: &str, failing: bool) {
        if failing {
            self.failing_queries.insert(TargetId::from(id), ());
        } else {
            self.failing_queries.remove(&TargetId::from(id));
        }
    }

    fn is_healthy(&self, descriptor: &str) -> bool {
        !self.unhealthy.contains_key(descriptor)
    }

    /// Connections currently held by workers.
    pub fn live_connections(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    pub fn live_connections_for(&self, id: &str) -> usize {
        self.live_by_target.get(&TargetId::from(id)).map(|v| *v).unwrap_or(0)
    }

    /// Total successful connects ever made for a target.
    pub fn connects(&self, id: &str) -> usize {
        self.connects.get(&TargetId::from(id)).map(|v| *v).unwrap_or(0)
    }

    pub fn runs(&self, id: &str) -> usize {
        self.runs.get(&TargetId::from(id)).map(|v| *v).unwrap_or(0)
    }

    pub fn workload_runs(&self, id: &str, workload: Workload) -> usize {
        self.runs_by_workload
            .get(&(TargetId::from(id), workload))
            .map(|v| *v)
            .unwrap_or(0)
    }

    /// Workload runs on `id` that returned a query error.
    pub fn query_failures(&self, id: &str) -> usize {
        self.query_failures.get(&TargetId::from(id)).map(|v| *v).unwrap_or(0)
    }
}

/// Connection handle that tracks its own lifetime.
#[derive(Debug)]
pub struct FakeConnection {
    target: TargetId,
    live: Arc<AtomicUsize>,
    live_by_target: Arc<DashMap<TargetId, usize>>,
}

impl Drop for FakeConnection {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
        if let Some(mut count) = self.live_by_target.get_mut(&self.target) {
            *count -= 1;
        }
    }
}

#[async_trait]
impl Driver for FakeDriver {
    type Connection = FakeConnection;

    async fn probe(&self, _backend: BackendClass, descriptor: &str) -> ProbeOutcome {
        if self.is_healthy(descriptor) {
            ProbeOutcome::Healthy
        } else {
            ProbeOutcome::Unhealthy("scripted failure".into())
        }
    }

    async fn connect(&self, target: &Target) -> Result<FakeConnection, DriverError> {
        if !self.is_healthy(&target.connection_string) {
            return Err(DriverError::Connect("scripted failure".into()));
        }
        self.live.fetch_add(1, Ordering::SeqCst);
        *self.live_by_target.entry(target.id.clone()).or_insert(0) += 1;
        *self.connects.entry(target.id.clone()).or_insert(0) += 1;
        Ok(FakeConnection {
            target: target.id.clone(),
            live: Arc::clone(&self.live),
            live_by_target: Arc::clone(&self.live_by_target),
        })
    }

    async fn run(
        &self,
        _connection: &mut FakeConnection,
        workload: Workload,
        _slot: usize,
        target: &Target,
    ) -> Result<(), DriverError> {
        tokio::time::sleep(Duration::from_millis(1)).await;
        *self.runs.entry(target.id.clone()).or_insert(0) += 1;
        *self.runs_by_workload.entry((target.id.clone(), workload)).or_insert(0) += 1;
        if !self.is_healthy(&target.connection_string) {
            return Err(DriverError::ConnectionLost("scripted failure".into()));
        }
        if self.failing_queries.contains_key(&target.id) {
            *self.query_failures.entry(target.id.clone()).or_insert(0) += 1;
            return Err(DriverError::Query("scripted duplicate key".into()));
        }
        Ok(())
    }
}

pub fn fast_timings() -> Timings {
    Timings {
        supervisor_tick: Duration::from_millis(20),
        manager_spawn_stagger: Duration::from_millis(1),
        connect_backoff: Duration::from_millis(20),
        manager_tick: Duration::from_millis(20),
        worker_spawn_stagger: Duration::ZERO,
        worker_refresh: Duration::from_millis(20),
        reconnect_base: Duration::from_millis(10),
        reconnect_max: Duration::from_millis(50),
    }
}

pub fn target(id: &str, backend: BackendClass, connections: usize) -> Target {
    Target {
        id: TargetId::from(id),
        backend,
        connection_string: format!("fake://{}", id),
        database: Some("github".into()),
        enabled: true,
        connections,
        workloads: WorkloadFlags {
            switch1: true,
            ..WorkloadFlags::default()
        },
        sleep_ms: 5,
        position: 0,
    }
}

/// A running orchestrator over a MemoryStore and a FakeDriver.
pub struct Harness {
    pub store: MemoryStore,
    pub driver: Arc<FakeDriver>,
    pub ctx: Arc<PoolContext<FakeDriver>>,
    pub root: CancellationToken,
    pub orchestrator: Orchestrator,
}

impl Harness {
    pub async fn start(store: MemoryStore, backends: &[BackendClass]) -> Self {
        Self::start_with(store, FakeDriver::new(), backends).await
    }

    /// Start over a driver the caller has already scripted.
    pub async fn start_with(store: MemoryStore, driver: Arc<FakeDriver>, backends: &[BackendClass]) -> Self {
        let (ctx, refresher) = context(&store, &driver, backends);
        let root = CancellationToken::new();
        let orchestrator = Orchestrator::start(Arc::clone(&ctx), refresher, backends, &root).await;
        Self {
            store,
            driver,
            ctx,
            root,
            orchestrator,
        }
    }
}

/// A pool context and a refresher over `store`, with nothing running yet.
pub fn context(
    store: &MemoryStore,
    driver: &Arc<FakeDriver>,
    backends: &[BackendClass],
) -> (Arc<PoolContext<FakeDriver>>, RegistryRefresher) {
    let registry = Arc::new(Registry::new());
    let shared: Arc<dyn ConfigStore> = Arc::new(store.clone());
    let refresher = RegistryRefresher::new(
        Arc::clone(&shared),
        Arc::clone(&registry),
        backends.to_vec(),
        Duration::from_millis(20),
    );
    let timeouts = ProbeTimeouts {
        mysql: Duration::from_millis(200),
        postgres: Duration::from_millis(200),
        mongodb: Duration::from_millis(200),
    };
    let prober = HealthProber::new(Arc::clone(driver), timeouts);
    let ctx = Arc::new(PoolContext::new(registry, Arc::clone(driver), prober, shared, fast_timings()));
    (ctx, refresher)
}

/// Poll `condition` every 10ms until it holds or `timeout` passes.
pub async fn wait_until<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Run `f` with a hard timeout so a hung shutdown fails the test instead of blocking it.
pub async fn within<F: Future>(timeout: Duration, f: F) -> F::Output {
    match tokio::time::timeout(timeout, f).await {
        Ok(out) => out,
        Err(_) => panic!("operation did not finish within {:?}", timeout),
    }
}
