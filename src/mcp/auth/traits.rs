//! Authentication strategy trait definition.

use async_trait::async_trait;
use russh::client;

use crate::mcp::error::TransportError;
use crate::mcp::session::SshClientHandler;

/// Trait for SSH authentication strategies.
///
/// Implementations must be thread-safe (`Send + Sync`) because the connector
/// runs them inside spawned tasks.
#[async_trait]
pub trait AuthStrategy: Send + Sync {
    /// Attempt to authenticate with the SSH server.
    ///
    /// # Returns
    ///
    /// * `Ok(true)` - Authentication succeeded
    /// * `Ok(false)` - The server rejected the credential
    /// * `Err(_)` - The credential could not be used (unreadable key, no agent)
    async fn authenticate(
        &self,
        handle: &mut client::Handle<SshClientHandler>,
        username: &str,
    ) -> Result<bool, TransportError>;

    /// Name of this strategy, used for logging.
    fn name(&self) -> &'static str;
}
