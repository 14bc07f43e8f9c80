use anyhow::Result;
use lpr_service::{
    api,
    capability::{mock::MockModelLoader, ModelLoader, OnnxModelLoader},
    LprServiceConfig, LprServiceState,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // Keep the file writer alive until exit
    let _log_guard = telemetry::init_with_service("lpr-service");

    info!(version = common::VERSION, "Starting License Plate Recognition service...");

    let config = LprServiceConfig::from_env()?;
    info!(
        bind = %config.bind_addr,
        detector = %config.detector_model_path,
        recognizer = %config.recognizer_model_path,
        workers = config.inference_workers,
        gpu = config.use_gpu,
        "LPR service configuration"
    );

    let loader: Arc<dyn ModelLoader> = if config.use_mock_models {
        warn!("Serving with mock models, results are synthetic");
        Arc::new(MockModelLoader::demo())
    } else {
        Arc::new(OnnxModelLoader::from_config(&config))
    };

    let state = LprServiceState::new(config.clone());
    if !state.initialize(loader).await {
        warn!("Models failed to load, recognition requests will be rejected");
    }

    let app = api::router(state);

    info!("Binding to {}", config.bind_addr);
    let listener = TcpListener::bind(&config.bind_addr).await?;
    info!("LPR service listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("LPR service stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received terminate signal");
        },
    }

    info!("Shutting down gracefully...");
}
