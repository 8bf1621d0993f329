#![deny(warnings)]
#![deny(clippy::unwrap_used)]

use dotenv::dotenv;
use kube_ssh_mcp::mcp::{McpKubeSshCommands, SessionManager};
use poem_mcpserver::McpServer;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();

    // stdout carries the protocol, so logs go to stderr
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let manager = SessionManager::from_env();
    let reaper = manager.spawn_reaper();

    let served = poem_mcpserver::stdio::stdio(
        McpServer::new().tools(McpKubeSshCommands::new(manager.clone())),
    )
    .await;

    manager.shutdown().await;
    reaper.await?;
    served?;
    Ok(())
}
