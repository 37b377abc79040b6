//! # Docket Server
//!
//! Main entry point for the Docket job engine.
//!
//! Loads layered configuration, initialises logging, starts the worker
//! dispatcher and job queue, and runs until Ctrl+C or SIGTERM, then drains
//! running jobs before exiting.

use docket_config::ConfigLoader;
use docket_core::{init_logging, DocketResult};
use docket_jobs::register_metrics;
use docket_server::app::Application;
use docket_server::startup::{print_banner, print_startup_info};
use tokio::signal;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        // Logging may not be initialised yet.
        eprintln!("Application error: {e}");
        error!("Application error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> DocketResult<()> {
    let config_loader = ConfigLoader::from_default_location()?;
    let config = config_loader.get().await;

    init_logging(&config.telemetry)?;
    print_banner();
    info!("Starting Docket Server...");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    register_metrics();
    print_startup_info(&config);

    let app = Application::start(config).await?;
    app.run_until(shutdown_signal()).await;
    app.shutdown().await;

    info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown...");
        }
        () = terminate => {
            info!("Received terminate signal, initiating graceful shutdown...");
        }
    }
}
