//! lotkeeper - parking lot allocation service
//!
//! An HTTP service that allocates parking spaces, bills stays and reports
//! daily usage, with journal durability.

use clap::Parser;
use lotkeeper_core::{LotStore, MemoryStore, ParkingEngine, SystemClock};
use lotkeeper_server::{run_metrics_server, Config, Metrics, Server, ServerConfig, StorageBackend};
use lotkeeper_storage::JournalStore;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "lotkeeper", version, about = "Parking lot allocation service")]
struct Cli {
    /// Path to a YAML configuration file.
    #[arg(short, long, env = "LOTKEEPER_CONFIG")]
    config: Option<PathBuf>,

    /// Print the effective configuration and exit.
    #[arg(long)]
    print_config: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let config = match Config::load(cli.config.as_deref()) {
        Ok(c) => {
            if let Some(ref path) = cli.config {
                tracing::info!("Loaded config from {}", path.display());
            }
            c
        }
        Err(e) => {
            tracing::error!("Failed to load config: {}", e);
            return Err(e.into());
        }
    };

    if cli.print_config {
        print!("{}", config.to_yaml()?);
        return Ok(());
    }

    tracing::info!("Starting lotkeeper");
    tracing::info!("  Bind address: {}", config.network.bind_addr);
    tracing::info!("  Hourly rate: {}", config.billing.hourly_rate);
    tracing::info!("  Max spaces per lot: {}", config.lots.max_spaces);

    // Open storage
    let journal_store = match config.storage.backend {
        StorageBackend::Journal => {
            tracing::info!("  Storage: journal");
            tracing::info!("  Journal directory: {}", config.storage.journal_dir().display());
            Some(Arc::new(JournalStore::open(
                config.storage.storage_config(),
            )?))
        }
        StorageBackend::Memory => {
            tracing::warn!("  Storage: memory (state is lost on exit)");
            None
        }
    };
    let store: Arc<dyn LotStore> = match journal_store {
        Some(ref journal) => journal.clone() as Arc<dyn LotStore>,
        None => Arc::new(MemoryStore::new()),
    };

    let engine = ParkingEngine::new(store, Arc::new(SystemClock::new()), config.billing.billing())
        .with_max_spaces(config.lots.max_spaces);
    let engine = Arc::new(engine);

    // Configure server
    let mut server_config = ServerConfig::new(config.network.bind_addr)
        .with_max_body_bytes(config.network.max_body_bytes);
    let metrics = if config.metrics.enabled {
        let metrics = Arc::new(Metrics::new()?);
        server_config = server_config.with_metrics(metrics.clone());
        Some(metrics)
    } else {
        tracing::info!("  Metrics: disabled");
        None
    };
    let server = Arc::new(Server::new(server_config, engine));

    // Spawn metrics server
    let metrics_handle = metrics.map(|metrics| {
        let addr = config.metrics.bind_addr;
        let shutdown = server.subscribe_shutdown();
        tokio::spawn(async move {
            if let Err(e) = run_metrics_server(addr, metrics, shutdown).await {
                tracing::error!("Metrics server error: {}", e);
            }
        })
    });

    // Spawn shutdown signal handler
    let shutdown_server = server.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        tracing::info!("Received shutdown signal, stopping server...");
        shutdown_server.shutdown();
    });

    // Run server (blocks until shutdown)
    server.run().await?;

    if let Some(handle) = metrics_handle {
        let _ = handle.await;
    }

    // Sync journal before exit
    if let Some(journal) = journal_store {
        if let Err(e) = journal.close() {
            tracing::error!("Failed to close journal on shutdown: {}", e);
        }
        let stats = journal.stats();
        tracing::info!(
            "Journal closed: {} writes, {} bytes, {} fsyncs",
            stats.writes,
            stats.bytes_written,
            stats.fsyncs
        );
    }

    tracing::info!("Server stopped");
    Ok(())
}
