// Transaction Risk Analytics - Web Server
// REST API with Axum

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use risk_analytics::api::{self, AppState};
use risk_analytics::{AppConfig, RiskAnalyzer, SqliteStore};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("risk_analytics=info,tower_http=info")),
        )
        .init();

    let config_path = std::env::args_os().nth(1).map(std::path::PathBuf::from);
    let config = AppConfig::load(config_path.as_deref())?;

    let store = SqliteStore::open(&config.database.path)
        .with_context(|| format!("Failed to open database {:?}", config.database.path))?;
    info!(path = %config.database.path.display(), "database ready");

    let analyzer = RiskAnalyzer::from_config(Arc::new(store), &config)?;
    if let Some(webhook) = &config.webhook {
        info!(url = %webhook.url, "webhook notifications enabled");
    }

    let app = api::router(AppState::new(analyzer, config.webhook.clone()));

    let addr = config.server.bind_addr()?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("🚀 Risk analytics server listening on http://{}", addr);
    info!("📊 API: http://{}/api/analyze?account_no=...&bank_code=...", addr);

    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}
