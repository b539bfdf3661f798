//! ledger-store - Immutable hash-chained event ledger

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ledger_store::api::{create_router, AppState};
use ledger_store::background::{BackgroundJobRunner, TierManager};
use ledger_store::config::Config;
use ledger_store::ingest::IngestPipeline;
use ledger_store::query::QueryService;
use ledger_store::storage::SqliteStore;
use ledger_store::traits::{
    AlertSink, BroadcastNotifier, CommitNotifier, RecordStore, TierStore, TracingAlertSink,
};

#[derive(Parser, Debug)]
#[command(name = "ledger-store")]
#[command(about = "Immutable hash-chained event ledger with hot/warm/cold tiering")]
struct Args {
    /// Host to bind to
    #[arg(long, env = "LEDGER_HOST", default_value = "127.0.0.1")]
    host: String,

    /// Port to bind to
    #[arg(long, env = "LEDGER_PORT", default_value = "8003")]
    port: u16,

    /// Path to SQLite database
    #[arg(long, env = "LEDGER_DATABASE_PATH", default_value = "./ledger.db")]
    database: String,

    /// Root directory for warm and cold segment files
    #[arg(long, env = "LEDGER_DATA_DIR", default_value = "./data/raw-store")]
    data_dir: PathBuf,

    /// Log level
    #[arg(long, env = "LEDGER_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(&args.log_level))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = Config::from_env();
    config.host = args.host;
    config.port = args.port;
    config.log_level = args.log_level;
    config.sqlite.path = args.database;
    config.sqlite.data_dir = args.data_dir;

    tracing::info!("Starting ledger-store v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        database = %config.sqlite.path,
        data_dir = %config.sqlite.data_dir.display(),
        "Opening store"
    );

    let store = Arc::new(SqliteStore::with_config(config.sqlite.clone())?);

    let notifier = Arc::new(BroadcastNotifier::new(config.notify_capacity));
    let mut commits = notifier.subscribe();
    tokio::spawn(async move {
        loop {
            match commits.recv().await {
                Ok(event) => tracing::debug!(
                    record_id = %event.record_id,
                    chain_key = %event.chain_key,
                    sequence_no = event.sequence_no,
                    event_type = %event.event_type,
                    "Record committed"
                ),
                Err(RecvError::Lagged(missed)) => {
                    tracing::warn!(missed, "Commit subscriber lagged")
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    let alerts: Arc<dyn AlertSink> = Arc::new(TracingAlertSink);
    let pipeline = Arc::new(IngestPipeline::new(
        Arc::clone(&store) as Arc<dyn RecordStore>,
        notifier as Arc<dyn CommitNotifier>,
        config.ingest.clone(),
    ));
    let query = Arc::new(QueryService::new(
        Arc::clone(&store) as Arc<dyn RecordStore>,
        Arc::clone(&alerts),
        config.query.clone(),
    ));
    let tier_manager = Arc::new(TierManager::new(
        Arc::clone(&store) as Arc<dyn TierStore>,
        Arc::clone(&store) as Arc<dyn RecordStore>,
        Arc::clone(&pipeline),
        alerts,
        config.background.tier_manager.clone(),
    ));

    let runner = BackgroundJobRunner::new(Arc::clone(&tier_manager), config.background.clone());
    let handles = runner.start().await?;

    let state = Arc::new(AppState::new(pipeline, query, tier_manager));
    let router = create_router(state);

    let listener = tokio::net::TcpListener::bind(config.bind_addr()).await?;
    tracing::info!(addr = %config.bind_addr(), "HTTP server listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
            }
            tracing::info!("Shutdown signal received");
        })
        .await?;

    runner.shutdown();
    for handle in handles {
        if let Err(e) = handle.await {
            tracing::warn!(error = %e, "Background job ended abnormally");
        }
    }

    tracing::info!("ledger-store stopped");
    Ok(())
}
