use company_analysis_agent::{api::start_server, create_orchestrator, AgentConfig};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = AgentConfig::from_env()?;

    if config.gemini_api_key.is_none() {
        warn!("GEMINI_API_KEY not set; directive requests will fail and sessions will fall back");
    }

    info!("Company Analysis Agent - API Server");
    info!("Port: {}", config.api_port);

    let orchestrator = Arc::new(create_orchestrator(&config)?);

    info!("Orchestrator initialized");

    start_server(orchestrator, config.api_port).await?;

    Ok(())
}
