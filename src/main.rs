use anyhow::Context;
use clap::{Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info};

use turo_ingest::app::IngestService;
use turo_ingest::config::{Config, StoreBackend};
use turo_ingest::observability::{init_logging, metrics};
use turo_ingest::pipeline::DetailConflictPolicy;
use turo_ingest::server;

#[derive(Parser)]
#[command(name = "turo_ingest")]
#[command(about = "Ingestion service for scraped rental marketplace captures")]
#[command(version)]
struct Cli {
    /// Path to a TOML config file (defaults to ./config.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// SQLite database file
    #[arg(long, global = true)]
    database_path: Option<PathBuf>,

    /// Storage backend: sqlite or memory
    #[arg(long, global = true)]
    store: Option<StoreBackend>,

    /// What to do with booked days that are already stored: reject or skip_existing
    #[arg(long, global = true)]
    detail_conflict_policy: Option<DetailConflictPolicy>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP ingestion API
    Serve {
        /// Port to listen on
        #[arg(long)]
        port: Option<u16>,
    },
    /// Ingest a captured search batch file (vehicles only)
    IngestSearch {
        /// Path to the JSON capture
        file: PathBuf,
    },
    /// Ingest a captured search batch file as booking summaries
    IngestSummaries {
        /// Path to the JSON capture
        file: PathBuf,
    },
    /// Ingest a captured daily pricing calendar file
    IngestPricing {
        /// Path to the JSON capture
        file: PathBuf,
    },
    /// Print a stored vehicle as JSON
    ShowVehicle {
        /// Marketplace vehicle id
        id: i64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(path) = cli.database_path {
        config.database_path = path;
    }
    if let Some(store) = cli.store {
        config.store = store;
    }
    if let Some(policy) = cli.detail_conflict_policy {
        config.detail_conflict_policy = policy;
    }
    if let Commands::Serve { port: Some(port) } = &cli.command {
        config.listen_port = *port;
    }

    let _log_guard = init_logging(&config.log_dir);
    if let Some(port) = config.metrics_port {
        metrics::init(port);
    }

    let store = config.build_store().context("Failed to open store")?;
    let service = Arc::new(IngestService::new(store, config.detail_conflict_policy));
    info!(
        store = service.store().backend(),
        policy = service.detail_policy().as_str(),
        "Ingestion service ready"
    );

    match cli.command {
        Commands::Serve { .. } => {
            server::start_server(service, config.listen_port).await?;
        }
        Commands::IngestSearch { file } => {
            let raw = read_capture(&file)?;
            let report = run_blocking(move || service.ingest_search_batch(&raw)).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::IngestSummaries { file } => {
            let raw = read_capture(&file)?;
            let report = run_blocking(move || service.ingest_booking_summaries(&raw)).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::IngestPricing { file } => {
            let raw = read_capture(&file)?;
            let report = run_blocking(move || service.ingest_daily_pricing(&raw)).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::ShowVehicle { id } => {
            let vehicle = run_blocking(move || service.read_vehicle(id)).await?;
            println!("{}", serde_json::to_string_pretty(&vehicle)?);
        }
    }

    Ok(())
}

fn read_capture(path: &Path) -> anyhow::Result<Vec<u8>> {
    fs::read(path).with_context(|| format!("Failed to read capture file {}", path.display()))
}

async fn run_blocking<T, F>(call: F) -> anyhow::Result<T>
where
    F: FnOnce() -> turo_ingest::error::Result<T> + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(call).await? {
        Ok(value) => Ok(value),
        Err(e) => {
            error!(kind = e.kind(), "Ingestion failed: {}", e);
            Err(e.into())
        }
    }
}
