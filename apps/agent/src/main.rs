//! # EdgeSync Agent
//!
//! Runs the sync engine on an edge instance.
//!
//! ## Commands
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  edgesync-agent run               scheduler (+ peer server if enabled) │
//! │  edgesync-agent sync              one cycle, result as JSON            │
//! │  edgesync-agent status            per-entity status as JSON            │
//! │  edgesync-agent tables            discovered entities as JSON          │
//! │  edgesync-agent reset [ENTITY]    forget watermark(s), --all for every │
//! │                                                                         │
//! │  --config <PATH>   TOML file (default: platform config dir)            │
//! │  EDGESYNC_*        environment overrides                               │
//! │  RUST_LOG          log filter override                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

mod scheduler;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use edgesync_db::{Database, DbConfig};
use edgesync_sync::config::LoggingSettings;
use edgesync_sync::{PeerServer, SyncConfig, SyncEngine, SyncEngineBuilder};

/// Default log filter when `RUST_LOG` is unset.
const DEFAULT_FILTER: &str = "info,edgesync=debug,sqlx=warn";

#[derive(Debug, Parser)]
#[command(name = "edgesync-agent", version, about = "Edge ↔ master table sync")]
struct Cli {
    /// Path to the TOML config file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run scheduled cycles until interrupted.
    Run,
    /// Run one cycle now.
    Sync,
    /// Show per-entity sync status.
    Status,
    /// List the entities that would be synced.
    Tables,
    /// Forget sync progress so the next cycle starts from the default epoch.
    Reset {
        /// Entity (table) to reset.
        entity: Option<String>,
        /// Reset every entity.
        #[arg(long)]
        all: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let config = SyncConfig::load(cli.config).context("Failed to load configuration")?;
    init_tracing(&config.logging);

    let engine = Arc::new(build_engine(config.clone()).await?);

    match cli.command {
        Command::Run => run(engine, &config).await?,
        Command::Sync => {
            let result = engine.sync().await;
            print_json(&serde_json::to_value(&result)?)?;
            if !result.success {
                return Ok(ExitCode::FAILURE);
            }
        }
        Command::Status => {
            let status = engine.status().await;
            print_json(&serde_json::to_value(&status)?)?;
        }
        Command::Tables => {
            let catalog = engine.tables().await;
            let tables: Vec<Value> = catalog
                .iter()
                .map(|entity| {
                    json!({
                        "table": entity.table,
                        "model": entity.model,
                        "capabilities": entity.capabilities,
                        "push": entity.push,
                    })
                })
                .collect();
            print_json(&Value::from(tables))?;
        }
        Command::Reset { entity, all } => {
            let target = if all { None } else { entity.as_deref() };
            let removed = engine.reset(target).await?;
            match target {
                Some(name) => println!("Reset sync data for table '{name}' ({removed} removed)"),
                None => println!("Reset sync data for all tables ({removed} removed)"),
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}

/// Installs the global subscriber. Disabling logging silences only the
/// sync engine; the agent's own lines still go out.
fn init_tracing(settings: &LoggingSettings) {
    let mut filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(settings.filter.as_deref().unwrap_or(DEFAULT_FILTER)))
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    if !settings.enabled {
        if let Ok(directive) = "edgesync_sync=off".parse() {
            filter = filter.add_directive(directive);
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}

async fn build_engine(config: SyncConfig) -> anyhow::Result<SyncEngine> {
    let db_config = DbConfig::new(config.database_path())
        .max_connections(config.database.max_connections);
    let db = Database::new(db_config)
        .await
        .context("Failed to open the database")?;

    let engine = SyncEngineBuilder::new(config)
        .with_database(db)
        .build()
        .context("Failed to build the sync engine")?;
    Ok(engine)
}

async fn run(engine: Arc<SyncEngine>, config: &SyncConfig) -> anyhow::Result<()> {
    info!("Starting EdgeSync agent...");

    let peer = if config.server.enabled {
        let handle = PeerServer::new(engine.clone(), config.server.bind_address())
            .start()
            .await
            .context("Failed to start the peer server")?;
        Some(handle)
    } else {
        None
    };

    if config.schedule.enabled {
        scheduler::run(
            engine,
            std::time::Duration::from_secs(config.schedule.interval_secs),
            shutdown_signal(),
        )
        .await;
    } else {
        info!("Scheduler disabled");
        shutdown_signal().await;
    }

    if let Some(handle) = peer {
        if let Err(e) = handle.shutdown().await {
            warn!(error = %e, "Peer server did not acknowledge shutdown");
        }
    }

    info!("Agent shutdown complete");
    Ok(())
}

fn print_json(value: &Value) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Graceful shutdown signal handler.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, starting graceful shutdown...");
}
