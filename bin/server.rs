// SME Credibility Score - Web Server
// Serves the scoring engine over HTTP (feature "server")

use anyhow::{Context, Result};
use sme_credibility::{api, telemetry, AppConfig, CredibilityEngine};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

// ============================================================================
// Main Server
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::load().context("Failed to load configuration")?;
    telemetry::init(&config.telemetry).context("Failed to initialise telemetry")?;

    let policy = config.scoring_policy()?;
    match &config.policy_path {
        Some(path) => tracing::info!(path = ?path, "scoring policy loaded"),
        None => tracing::info!("using default scoring policy"),
    }

    let engine = Arc::new(CredibilityEngine::new(policy));
    let app = api::router(engine).layer(CorsLayer::permissive());

    let addr = config
        .server
        .socket_addr()
        .context("Invalid server address")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    tracing::info!(
        %addr,
        environment = ?config.environment,
        "credibility server listening"
    );

    axum::serve(listener, app)
        .await
        .context("Server terminated unexpectedly")?;

    Ok(())
}
