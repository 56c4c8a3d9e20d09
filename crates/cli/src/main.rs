//! Mediation configuration service entry point.
//!
//! This binary is the composition root. Responsibilities:
//!
//! 1. **Parse configuration**: load the TOML file named by `--config` (or
//!    `MEDIATION_CONFIG`) and apply command-line overrides.
//! 2. **Wire observability**: `tracing-subscriber` with a JSON or pretty
//!    layer and an optional OpenTelemetry OTLP exporter (see [`telemetry`]).
//! 3. **Construct infrastructure**: the configured [`mediation::ConfigStore`]
//!    and the [`MediationService`] on top of it.
//! 4. **Run the command**: serve the HTTP API, export or import a flow, or
//!    check the stored configuration.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use mediation::{ConfigStore, FlowExport, FlowId, MediationService, MemoryStore};
use store::JsonFileStore;

mod config;
mod telemetry;

use config::{Config, StorageBackend};

#[derive(Debug, Parser)]
#[command(name = "mediation", version, about = "Mediation pipeline configuration service")]
struct Cli {
    /// TOML configuration file.
    #[arg(long, env = "MEDIATION_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Overrides `[storage] path`.
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Serve the HTTP API.
    Serve {
        /// Overrides `[server] bind`.
        #[arg(long)]
        bind: Option<std::net::SocketAddr>,
    },
    /// Write a flow in the exchange format.
    Export {
        #[arg(long)]
        flow: FlowId,
        /// Output file; stdout when omitted.
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Create a new flow from an exchange document.
    Import { file: PathBuf },
    /// Load the configuration, verify its invariants and validate every flow.
    Check,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(path) = cli.store {
        config.storage.path = path;
    }
    let _telemetry = telemetry::init(&config.telemetry)?;

    let service = Arc::new(open_service(&config).await?);
    match cli.command {
        Command::Serve { bind } => serve(service, bind.unwrap_or(config.server.bind)).await,
        Command::Export { flow, output } => export(&service, flow, output.as_deref()).await,
        Command::Import { file } => import(&service, &file).await,
        Command::Check => check(&service).await,
    }
}

async fn open_service(config: &Config) -> anyhow::Result<MediationService> {
    let store: Arc<dyn ConfigStore> = match config.storage.backend {
        StorageBackend::File => Arc::new(
            JsonFileStore::open(&config.storage.path)
                .await
                .with_context(|| format!("opening {}", config.storage.path.display()))?,
        ),
        StorageBackend::Memory => {
            tracing::warn!("Using the in-memory store; nothing will be persisted");
            Arc::new(MemoryStore::new())
        }
    };
    MediationService::open(store)
        .await
        .context("failed to load configuration")
}

async fn serve(service: Arc<MediationService>, bind: std::net::SocketAddr) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("failed to bind {bind}"))?;
    api::serve(listener, service, shutdown_signal()).await?;
    tracing::info!("HTTP API stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested");
}

async fn export(
    service: &MediationService,
    flow: FlowId,
    output: Option<&Path>,
) -> anyhow::Result<()> {
    let document = service.export_flow(flow).await?;
    let json = serde_json::to_string_pretty(&document)?;
    match output {
        Some(path) => {
            tokio::fs::write(path, json)
                .await
                .with_context(|| format!("failed to write {}", path.display()))?;
            tracing::info!(%flow, path = %path.display(), "Flow exported");
        }
        None => println!("{json}"),
    }
    Ok(())
}

async fn import(service: &MediationService, file: &Path) -> anyhow::Result<()> {
    let text = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("failed to read {}", file.display()))?;
    let document: FlowExport = serde_json::from_str(&text)
        .with_context(|| format!("{} is not a flow export", file.display()))?;
    let flow = service.import_flow(document).await?;
    println!("{}", flow.id);
    Ok(())
}

async fn check(service: &MediationService) -> anyhow::Result<()> {
    let snapshot = service.snapshot().await;
    match service.active_version().await {
        Some(active) => println!("active version: {}", snapshot.version_label(&active)),
        None => println!("active version: none"),
    }
    println!(
        "{} parameters, {} families, {} versions, {} subnodes, {} flows",
        snapshot.parameters.len(),
        snapshot.families.len(),
        snapshot.versions.len(),
        snapshot.subnodes.len(),
        snapshot.flows.len()
    );

    let mut blocked = 0;
    for flow in service.list_flows().await {
        let issues = service.validate_flow(flow.id).await?;
        let blocking = issues.iter().filter(|i| i.is_blocking()).count();
        if blocking > 0 {
            blocked += 1;
        }
        println!(
            "flow '{}' ({}): {} blocking, {} other",
            flow.name,
            flow.id,
            blocking,
            issues.len() - blocking
        );
        for issue in &issues {
            println!("  [{}] {}", issue.code.as_str(), issue.message);
        }
    }
    if blocked > 0 {
        tracing::warn!(blocked, "Some flows cannot run or deploy");
    }
    Ok(())
}
