use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use tile_cistern::config::Config;
use tile_cistern::error::Error;
use tile_cistern::ingest::IngestPipeline;
use tile_cistern::server::{router, AppState};
use tile_cistern::store;
use tile_cistern::tiler::Tiler;

#[derive(Debug, Parser)]
#[command(name = "tile_cistern", about = "Vector feature store and tile server")]
struct Args {
    /// Path to the YAML configuration file.
    #[arg(short, long, default_value = "cistern.yml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = match std::fs::read_to_string(&args.config) {
        Ok(data) => Config::from_str(&data)?,
        Err(_) => {
            info!(path = %args.config.display(), "no config file, using defaults");
            Config::default()
        }
    };

    // Bootstrap blocks readiness; exhausting the retry budget is fatal.
    let pool = store::connect(&config.store, config.bootstrap_interval()).await?;

    let (ingest, worker) = IngestPipeline::spawn(
        pool.clone(),
        config.store.table.clone(),
        config.filter.default_img_date,
    );
    let state = AppState {
        pool,
        tiler: Arc::new(Tiler::new(&config)),
        ingest,
        config: Arc::new(config.clone()),
    };

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    info!(addr = %config.server.bind, "serving");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // The server owned the last ingest handles, so the queue is now
    // closed; wait for the worker to flush whatever was still pending.
    if worker.await.is_err() {
        error!("ingest worker panicked during shutdown");
    }
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutting down");
}
