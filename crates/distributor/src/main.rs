use std::path::PathBuf;
use std::sync::Arc;

use distqueue_common::config::{self, DistributorConfig};
use distqueue_distributor::routes::{build_router, AppState};
use distqueue_distributor::Distributor;
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

    tracing::info!("distributor starting");

    let config_path = std::env::var("DISTRIBUTOR_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config/distributor.toml"));

    let distributor_config = if config_path.exists() {
        match config::load_toml_config::<DistributorConfig>(&config_path) {
            Ok(config) => config,
            Err(e) => {
                tracing::error!(error = %e, "failed to load configuration — refusing to start");
                std::process::exit(1);
            }
        }
    } else {
        tracing::info!(path = %config_path.display(), "no config file found, using defaults");
        DistributorConfig::default()
    };

    if let Err(e) = distributor_config.validate() {
        tracing::error!(error = %e, "invalid configuration — refusing to start");
        std::process::exit(1);
    }

    let metrics_handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus metrics recorder");

    let port = distributor_config.port;
    let distributor = Distributor::new(distributor_config);

    let state = Arc::new(AppState {
        distributor,
        metrics_handle,
    });

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    {
        let state = Arc::clone(&state);
        tokio::spawn(async move {
            state.distributor.run_monitor(shutdown_rx).await;
        });
    }

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutdown signal received");
            let _ = shutdown_tx.send(true);
        }
    });

    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}"))
        .await
        .expect("failed to bind TCP listener");

    tracing::info!(port, "distributor listening");

    axum::serve(listener, app).await.expect("HTTP server error");
}
