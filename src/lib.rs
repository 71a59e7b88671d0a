pub mod api;
pub mod authorization;
pub mod confidence;
pub mod config;
pub mod core_state;
pub mod credentials;
pub mod db;
pub mod export;
pub mod extraction;
pub mod lifecycle;
pub mod models;
pub mod storage;
pub mod workflow;

use std::sync::Arc;

use axum::http::{header, HeaderValue};
use tower_http::cors::CorsLayer;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] config::ConfigError),
    #[error(transparent)]
    Core(#[from] core_state::CoreError),
    #[error("Bootstrap admin failed: {0}")]
    Bootstrap(#[from] workflow::WorkflowError),
    #[error("Server I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub async fn run() -> Result<(), StartupError> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();

    tracing::info!("{} starting v{}", config::APP_NAME, config::APP_VERSION);

    let service_config = config::ServiceConfig::from_env()?;
    tracing::debug!(config = ?service_config, "Configuration loaded");

    let core = Arc::new(core_state::CoreState::from_config(&service_config)?);

    if let Some(admin) = service_config.bootstrap_admin.clone() {
        let core = core.clone();
        let iterations = service_config.pbkdf2_iterations;
        tokio::task::spawn_blocking(move || -> Result<(), StartupError> {
            let conn = core.open_db()?;
            workflow::bootstrap_admin(&conn, &admin.email, &admin.password, iterations)?;
            Ok(())
        })
        .await
        .map_err(|e| std::io::Error::other(e.to_string()))??;
    }

    let app = api::api_router(core)
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(service_config.bind_addr).await?;
    tracing::info!(addr = %service_config.bind_addr, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Cannot listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
