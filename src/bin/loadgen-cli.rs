use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde_json::json;

use load_generator::config::{load_config, load_config_or_default};
use load_generator::health::HealthProber;
use load_generator::store::{ConfigStore, FileStore};
use load_generator::target::{BackendClass, Target, TargetId};
use load_generator::DatabaseDriver;

#[derive(Parser)]
#[command(name = "loadgen-cli")]
#[command(about = "Management CLI for the database load generator", long_about = None)]
struct Cli {
    /// Process configuration file.
    #[arg(short, long, env = "LOADGEN_CONFIG", default_value = "loadgen.toml")]
    config: PathBuf,

    /// Targets file, overrides `store.path`.
    #[arg(short, long, env = "LOADGEN_TARGETS")]
    targets: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List targets with redacted connection strings
    List {
        /// Only this backend class
        #[arg(short, long)]
        backend: Option<BackendClass>,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Probe one target once and print its connection status
    Check {
        /// Target id
        id: String,
    },
    /// Validate the configuration file
    Validate,
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    if let Commands::Validate = cli.command {
        return match load_config(&cli.config) {
            Ok(_) => {
                println!("{}: ok", cli.config.display());
                Ok(ExitCode::SUCCESS)
            }
            Err(e) => {
                eprintln!("{}: {}", cli.config.display(), e);
                Ok(ExitCode::FAILURE)
            }
        };
    }

    let config = load_config_or_default(&cli.config)?;
    let path = cli
        .targets
        .clone()
        .unwrap_or_else(|| PathBuf::from(&config.store.path));
    let store = FileStore::new(path);

    match cli.command {
        Commands::List { backend, json } => {
            let backends = match backend {
                Some(b) => vec![b],
                None => BackendClass::ALL.to_vec(),
            };
            let mut targets: Vec<Target> = Vec::new();
            for b in backends {
                for record in store.list_targets(b).await? {
                    match Target::try_from(&record) {
                        Ok(target) => targets.push(target),
                        Err(e) => eprintln!("skipping: {}", e),
                    }
                }
            }
            targets.sort_by(|a, b| a.position.cmp(&b.position).then_with(|| a.id.cmp(&b.id)));
            print_targets(&targets, json)?;
        }
        Commands::Check { id } => {
            let id = TargetId::new(id);
            let Some(record) = store.get_target(&id).await? else {
                eprintln!("Error: no target with id '{}'", id);
                return Ok(ExitCode::FAILURE);
            };
            let target = Target::try_from(&record)?;
            let prober = HealthProber::new(Arc::new(DatabaseDriver::new()), config.health.timeouts());
            let outcome = prober.probe(target.backend, &target.connection_string).await;
            println!("{} ({}): {}", target.id, target.backend, outcome.status_text());
            if !outcome.is_healthy() {
                return Ok(ExitCode::FAILURE);
            }
        }
        Commands::Validate => {}
    }

    Ok(ExitCode::SUCCESS)
}

fn print_targets(targets: &[Target], as_json: bool) -> Result<(), Box<dyn std::error::Error>> {
    if as_json {
        let rows: Vec<_> = targets
            .iter()
            .map(|t| {
                json!({
                    "id": t.id,
                    "backend": t.backend,
                    "connection_string": t.redacted_descriptor(),
                    "database": t.database,
                    "enabled": t.enabled,
                    "connections": t.connections,
                    "workloads": t.workloads.enabled().iter().map(|w| w.as_str()).collect::<Vec<_>>(),
                    "sleep_ms": t.sleep_ms,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    println!(
        "{:<20} {:<9} {:<8} {:>5} {:>8}  {:<24} CONNECTION",
        "ID", "BACKEND", "ENABLED", "CONNS", "SLEEP", "WORKLOADS"
    );
    for t in targets {
        let workloads: Vec<&str> = t.workloads.enabled().iter().map(|w| w.as_str()).collect();
        println!(
            "{:<20} {:<9} {:<8} {:>5} {:>8}  {:<24} {}",
            t.id.as_str(),
            t.backend.as_str(),
            t.enabled,
            t.connections,
            format!("{}ms", t.sleep_ms),
            workloads.join(","),
            t.redacted_descriptor()
        );
    }
    Ok(())
}
