use std::env;

use anyhow::Result;
use chief_agents::ChiefConfig;
use chief_api::build_app;
use chief_observability::init_tracing;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing("chief_api");

    let bind = env::var("CHIEF_BIND").unwrap_or_else(|_| "127.0.0.1:5000".to_string());
    let config = ChiefConfig::from_env();

    let app = build_app(&config).await?;

    let listener = tokio::net::TcpListener::bind(&bind).await?;
    tracing::info!(bind = %bind, dev_mode = config.dev_mode, "chief webhook api started");

    axum::serve(listener, app).await?;
    Ok(())
}
