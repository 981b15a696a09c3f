//! Axum API server binary.
//!
//! Serves the HTTP surface and runs the job executor in the same process.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use hookclip_api::{create_router, metrics, ApiConfig, AppState};
use hookclip_storage::{DeliveryConfig, Sweeper};
use hookclip_worker::{init_tracing, JobExecutor, WorkerContext};
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Install rustls crypto provider (required for rustls 0.23+)
    let _ = rustls::crypto::ring::default_provider().install_default();

    if let Err(e) = run().await {
        error!("API server failed: {:#}", e);
        eprintln!("hookclip-api: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let log_dir = std::env::var("LOG_DIR").unwrap_or_else(|_| "./logs".to_string());
    init_tracing("hookclip-api", Some(Path::new(&log_dir)))?;

    info!("Starting hookclip-api");

    let config = ApiConfig::from_env();
    info!("API config: host={}, port={}", config.host, config.port);

    // Initialize metrics
    let metrics_enabled = std::env::var("METRICS_ENABLED")
        .map(|v| v == "true" || v == "1")
        .unwrap_or(true);

    let metrics_handle = if metrics_enabled {
        info!("Prometheus metrics enabled at /metrics");
        Some(metrics::init_metrics()?)
    } else {
        None
    };

    let ctx = Arc::new(WorkerContext::from_env().await?);
    let state = AppState::new(config.clone(), Arc::clone(&ctx), DeliveryConfig::from_env());

    // Background work: queue executor and file sweeper
    let background = if config.embedded_worker {
        let (sweep_tx, sweep_rx) = tokio::sync::watch::channel(false);
        let sweeper = Sweeper::new(ctx.layout.clone(), ctx.retention.clone()).spawn(sweep_rx);
        let executor = Arc::new(JobExecutor::new(Arc::clone(&ctx)));
        let executor_task = tokio::spawn({
            let executor = Arc::clone(&executor);
            async move { executor.run().await }
        });
        Some((executor, executor_task, sweep_tx, sweeper))
    } else {
        info!("Embedded worker disabled; jobs run in hookclip-worker");
        None
    };

    let app = create_router(state, metrics_handle);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some((executor, executor_task, sweep_tx, sweeper)) = background {
        executor.shutdown();
        match executor_task.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Executor stopped with error: {}", e),
            Err(e) => warn!("Executor task failed: {}", e),
        }
        let _ = sweep_tx.send(true);
        let _ = sweeper.await;
    }

    info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Received shutdown signal");
}
