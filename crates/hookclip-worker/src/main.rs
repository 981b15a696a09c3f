//! Clip pipeline worker binary.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use hookclip_storage::Sweeper;
use hookclip_worker::{init_tracing, JobExecutor, WorkerContext};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    // Install rustls crypto provider (required for TLS/HTTPS)
    let _ = rustls::crypto::ring::default_provider().install_default();

    // Load environment variables
    dotenvy::dotenv().ok();

    if let Err(e) = run().await {
        error!("Worker failed: {:#}", e);
        eprintln!("hookclip-worker: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let log_dir = std::env::var("LOG_DIR").unwrap_or_else(|_| "./logs".to_string());
    init_tracing("hookclip-worker", Some(Path::new(&log_dir)))?;

    info!("Starting hookclip-worker");

    let ctx = Arc::new(WorkerContext::from_env().await?);
    info!("Worker config: {:?}", ctx.config);

    if let Ok(port) = std::env::var("METRICS_PORT") {
        let addr: SocketAddr = format!("0.0.0.0:{}", port).parse()?;
        PrometheusBuilder::new().with_http_listener(addr).install()?;
        info!("Metrics exporter listening on {}", addr);
    }

    let (sweep_tx, sweep_rx) = tokio::sync::watch::channel(false);
    let sweeper = Sweeper::new(ctx.layout.clone(), ctx.retention.clone()).spawn(sweep_rx);

    let executor = Arc::new(JobExecutor::new(Arc::clone(&ctx)));

    // Setup signal handlers
    let shutdown_handle = tokio::spawn({
        let executor = Arc::clone(&executor);
        async move {
            tokio::signal::ctrl_c().await.ok();
            info!("Received shutdown signal");
            executor.shutdown();
        }
    });

    let result = executor.run().await;

    let _ = sweep_tx.send(true);
    if sweeper.await.is_err() {
        warn!("Sweeper task ended abnormally");
    }
    shutdown_handle.abort();

    result?;
    info!("Worker shutdown complete");
    Ok(())
}
