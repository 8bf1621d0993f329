#![deny(warnings)]
#![deny(clippy::unwrap_used)]

use std::time::Duration;

use dotenv::dotenv;
use kube_ssh_mcp::mcp::types::HealthResponse;
use kube_ssh_mcp::mcp::{McpKubeSshCommands, SessionManager};
use poem::http::StatusCode;
use poem::web::{Data, Json};
use poem::{EndpointExt, Route, Server, get, handler, listener::TcpListener, middleware::Tracing};
use poem_mcpserver::{McpServer, streamable_http};
use tracing::info;

/// `GET /health`: 200 while the manager accepts work, 503 once it is shutting down.
#[handler]
fn health(Data(manager): Data<&SessionManager>) -> (StatusCode, Json<HealthResponse>) {
    let report = manager.health();
    let status = if report.healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(report))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();

    // Initialize logging with proper tracing default
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("info".parse().expect("valid directive")),
        )
        .init();

    let manager = SessionManager::from_env();
    let reaper = manager.spawn_reaper();
    info!(
        "Session manager ready: max_sessions={}, idle_timeout={}s",
        manager.config().max_sessions,
        manager.config().idle_timeout.as_secs()
    );

    // Setup MCP server
    let mcp_port: u16 = std::env::var("MCP_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8000);
    let mcp_addr = format!("0.0.0.0:{}", mcp_port);
    info!("Starting MCP server on {}", mcp_addr);

    let tools_manager = manager.clone();
    let app = Route::new()
        .at(
            "/",
            streamable_http::endpoint(move |_| {
                McpServer::new().tools(McpKubeSshCommands::new(tools_manager.clone()))
            }),
        )
        .at("/health", get(health))
        .data(manager.clone())
        .with(Tracing);

    info!("Use ssh_connect to open a session, then kube_fetch_config to reach its cluster");

    let served = Server::new(TcpListener::bind(mcp_addr))
        .name("Kube SSH MCP Server")
        .run_with_graceful_shutdown(
            app,
            async {
                let _ = tokio::signal::ctrl_c().await;
                info!("Shutdown signal received");
            },
            Some(Duration::from_secs(10)),
        )
        .await;

    manager.shutdown().await;
    reaper.await?;
    served?;
    Ok(())
}
