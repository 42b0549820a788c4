use portfolio_agent::{api::start_server, AgentConfig, AgentSession};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenv::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AgentConfig::from_env()?;

    if config.api_key.is_empty() {
        warn!("OPENROUTER_API_KEY not set; chat requests will return 503");
    }
    if config.database_url.is_none() {
        warn!("DATABASE_URL not set; conversation history is kept in memory");
    }

    info!("🚀 Portfolio Agent - API Server");
    info!("📍 Port: {}", config.port);

    let session = Arc::new(AgentSession::from_config(&config)?);

    info!("✅ Agent session initialized");
    info!("📡 Starting API server...");

    start_server(session, config.port).await?;

    Ok(())
}
