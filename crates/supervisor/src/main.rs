use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use distqueue_common::config::{self, SupervisorConfig};
use distqueue_supervisor::pool::AnalyzerPool;
use distqueue_supervisor::routes::{build_router, AppState};
use distqueue_supervisor::worker::{Processor, SimulatedProcessor};
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::sync::watch;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    tracing::info!("supervisor starting");

    let config_path = std::env::var("SUPERVISOR_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config/supervisor.toml"));

    let supervisor_config = if config_path.exists() {
        match config::load_toml_config::<SupervisorConfig>(&config_path) {
            Ok(config) => config,
            Err(e) => {
                tracing::error!(error = %e, "failed to load configuration — refusing to start");
                std::process::exit(1);
            }
        }
    } else {
        tracing::info!(path = %config_path.display(), "no config file found, using defaults");
        SupervisorConfig::default()
    };

    if let Err(e) = supervisor_config.validate() {
        tracing::error!(error = %e, "invalid configuration — refusing to start");
        std::process::exit(1);
    }

    let metrics_handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus metrics recorder");

    let processor: Arc<dyn Processor> = Arc::new(SimulatedProcessor::new(Duration::from_millis(
        supervisor_config.processing_delay_ms,
    )));

    let pool = Arc::new(AnalyzerPool::new(supervisor_config, processor));
    pool.start().await;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    {
        let pool = Arc::clone(&pool);
        tokio::spawn(async move {
            pool.run_autoscaler(shutdown_rx).await;
        });
    }

    let shutdown_pool = Arc::clone(&pool);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutdown signal received");
            let _ = shutdown_tx.send(true);
            shutdown_pool.stop().await;
        }
    });

    let state = Arc::new(AppState {
        pool,
        metrics_handle,
    });

    let app = build_router(state);

    let port: u16 = std::env::var("SUPERVISOR_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8001);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}"))
        .await
        .expect("failed to bind TCP listener");

    tracing::info!(port, "supervisor listening");

    axum::serve(listener, app).await.expect("HTTP server error");
}
