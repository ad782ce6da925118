use std::sync::Arc;

use anyhow::Context;
use rmcp::{transport::stdio, ServiceExt};
use tidal_mcp::config::Config;
use tidal_mcp::remote::{RemoteApi, TidalClient};
use tidal_mcp::server::TidalServer;
use tidal_mcp::services::Services;
use tidal_mcp::tools::ToolRegistry;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // stdout carries the MCP protocol
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let config = Config::from_env()?;
    info!("Starting {} with {:?}", env!("CARGO_PKG_NAME"), config);

    let session = config.session_store();
    if let Err(e) = session.reload() {
        warn!("No usable TIDAL session yet ({}); tidal_login will retry", e);
    }

    let client = TidalClient::new(&config, session.clone())?;
    let pager = config.pager(client.max_page_size());
    let remote: Arc<dyn RemoteApi> = Arc::new(client);
    let services = Services::new(remote, session, pager);
    let registry = Arc::new(ToolRegistry::with_services(&services));
    info!("Registered {} tools", registry.len());

    let service = TidalServer::new(registry)
        .serve(stdio())
        .await
        .context("Failed to start stdio MCP service")?;
    info!("MCP server running on stdio");

    service.waiting().await?;
    info!("MCP server shut down");
    Ok(())
}
