//! Clinic Server: application entry point.

use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;

use clinic_auth::LogMailer;
use clinic_db::{DbManager, run_migrations};
use clinic_server::{AppState, ServerConfig, build_router};
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("clinic=info")),
        )
        .json()
        .init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "Server failed");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = ServerConfig::from_env()?;
    info!(environment = %config.environment, "Starting clinic server");

    let db = DbManager::connect(&config.db).await?;
    run_migrations(db.client()).await?;

    let state = AppState::new(
        db.client().clone(),
        config.auth.clone(),
        config.audit.clone(),
        Arc::new(LogMailer),
    )
    .with_trusted_proxies(config.trusted_proxies.clone());
    let audit = state.audit.clone();
    let app = build_router(state, &config);

    let listener = TcpListener::bind(config.bind_addr).await?;
    info!(addr = %config.bind_addr, "Listening");
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    audit.shutdown().await;
    info!("Clinic server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "Failed to listen for shutdown signal");
    }
}
