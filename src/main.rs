//! Database Load Generator
//!
//! Drives configurable query workloads against MySQL, PostgreSQL and MongoDB
//! targets, following live changes to the target list without restarts.
//!
//! # Architecture Overview
//!
//! ```text
//!                    ┌──────────────────────────────────────────────────────────────┐
//!                    │                       LOAD GENERATOR                          │
//!                    │                                                               │
//!   targets.toml ────┼─▶┌────────────┐  nudge  ┌───────────────────┐                 │
//!   (config store)   │  │  watcher   │────────▶│ registry refresher│                 │
//!                    │  └────────────┘         └─────────┬─────────┘                 │
//!                    │                                   │ TargetSet per backend     │
//!                    │                                   ▼                           │
//!                    │  ┌──────────────────────────────────────────────────────┐    │
//!                    │  │ PoolSupervisor (mysql)  (postgres)  (mongodb)        │    │
//!                    │  │   └── TargetManager per enabled target               │    │
//!                    │  │         Connecting → Running ⇄ ReconfiguringCount    │    │
//!                    │  │         └── Worker per slot ──────────────────────────┼────┼──▶ Databases
//!                    │  └──────────────────────────────────────────────────────┘    │
//!                    │                                                               │
//!                    │  ┌─────────────────────────────────────────────────────────┐ │
//!                    │  │                 Cross-Cutting Concerns                   │ │
//!                    │  │  ┌────────┐ ┌────────┐ ┌──────────────┐ ┌─────────────┐  │ │
//!                    │  │  │ config │ │ health │ │observability │ │  lifecycle  │  │ │
//!                    │  │  │        │ │ prober │ │ logs/metrics │ │  shutdown   │  │ │
//!                    │  │  └────────┘ └────────┘ └──────────────┘ └─────────────┘  │ │
//!                    │  └─────────────────────────────────────────────────────────┘ │
//!                    └──────────────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use load_generator::config::{load_config_or_default, ConfigWatcher};
use load_generator::health::HealthProber;
use load_generator::lifecycle::{wait_for_signal, Shutdown};
use load_generator::observability::{logging, metrics};
use load_generator::store::{ConfigStore, FileStore};
use load_generator::{DatabaseDriver, Orchestrator, PoolContext, Registry, RegistryRefresher, Timings};

#[derive(Parser)]
#[command(name = "load-generator")]
#[command(about = "Synthetic load generator for MySQL, PostgreSQL and MongoDB", long_about = None)]
struct Args {
    /// Process configuration file.
    #[arg(short, long, env = "LOADGEN_CONFIG", default_value = "loadgen.toml")]
    config: PathBuf,

    /// Targets file, overrides `store.path`.
    #[arg(short, long, env = "LOADGEN_TARGETS")]
    targets: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let mut config = load_config_or_default(&args.config)?;
    if let Some(targets) = &args.targets {
        config.store.path = targets.display().to_string();
    }

    logging::init_logging(&config.observability).map_err(|e| e as Box<dyn std::error::Error>)?;

    tracing::info!(
        config = %args.config.display(),
        targets = %config.store.path,
        backends = ?config.supervisor.backends,
        "load-generator v0.1.0 starting"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let store: Arc<dyn ConfigStore> = Arc::new(FileStore::new(&config.store.path));
    let registry = Arc::new(Registry::new());
    let mut refresher = RegistryRefresher::new(
        Arc::clone(&store),
        Arc::clone(&registry),
        config.supervisor.backends.clone(),
        std::time::Duration::from_millis(config.registry.refresh_interval_ms),
    );

    // Dropping the handle stops the watcher, so it lives until main returns.
    let _watcher = if config.store.watch {
        let (watcher, nudges) = ConfigWatcher::new(std::path::Path::new(&config.store.path));
        match watcher.run() {
            Ok(handle) => {
                refresher = refresher.with_nudge(nudges);
                Some(handle)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Targets file watcher unavailable, relying on polling");
                None
            }
        }
    } else {
        None
    };

    let driver = Arc::new(DatabaseDriver::new());
    let prober = HealthProber::new(Arc::clone(&driver), config.health.timeouts());
    let ctx = Arc::new(PoolContext::new(
        registry,
        driver,
        prober,
        store,
        Timings::from_config(&config),
    ));

    let shutdown = Shutdown::new();
    let orchestrator = Orchestrator::start(ctx, refresher, &config.supervisor.backends, &shutdown.token()).await;

    wait_for_signal().await;
    tracing::info!("Shutdown requested, stopping workers");
    shutdown.trigger();
    orchestrator.join().await;

    tracing::info!("Shutdown complete");
    Ok(())
}
