// CivicEase - Web Server
// REST API over the registry, backed by SQLite (or memory for demos)

use anyhow::{Context, Result};
use civic_ease::{
    build_router, logging, AppState, CivicStore, Config, MemoryStore, Registry, SqliteStore,
};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "civic-server", version, about = "CivicEase REST API")]
struct Args {
    /// Database path (overrides CIVIC_DB_PATH)
    #[arg(long, value_name = "PATH")]
    db: Option<PathBuf>,

    /// Listen address (overrides CIVIC_BIND_ADDR)
    #[arg(long, value_name = "ADDR")]
    bind: Option<String>,

    /// Keep everything in memory; nothing is persisted
    #[arg(long)]
    in_memory: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::init();

    let args = Args::parse();
    let mut config = Config::from_env().with_db_path(args.db);
    if let Some(bind) = args.bind {
        config.bind_addr = bind;
    }

    let store: Arc<dyn CivicStore> = if args.in_memory {
        warn!("running with in-memory store, data is lost on exit");
        Arc::new(MemoryStore::new())
    } else {
        Arc::new(SqliteStore::open(&config.db_path)?)
    };

    let state = AppState::new(Registry::new(store, config.actor.clone()));
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_addr))?;

    info!(addr = %config.bind_addr, version = civic_ease::VERSION, "civic-server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("civic-server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for ctrl-c");
    }
}
