//! SSH agent authentication.

use async_trait::async_trait;
use russh::{client, keys};
use tracing::{debug, info};

use crate::mcp::error::TransportError;
use crate::mcp::session::SshClientHandler;

use super::traits::AuthStrategy;

/// SSH agent authentication strategy.
///
/// Connects to the agent named by `SSH_AUTH_SOCK` and tries each identity
/// until one is accepted.
#[derive(Debug, Default)]
pub struct AgentAuth;

impl AgentAuth {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl AuthStrategy for AgentAuth {
    async fn authenticate(
        &self,
        handle: &mut client::Handle<SshClientHandler>,
        username: &str,
    ) -> Result<bool, TransportError> {
        let mut agent = keys::agent::client::AgentClient::connect_env()
            .await
            .map_err(|e| TransportError::Auth(format!("failed to connect to SSH agent: {}", e)))?;

        let identities = agent.request_identities().await.map_err(|e| {
            TransportError::Auth(format!("failed to get identities from SSH agent: {}", e))
        })?;

        if identities.is_empty() {
            return Err(TransportError::Auth(
                "no identities found in SSH agent".to_string(),
            ));
        }

        for identity in identities {
            debug!("Trying SSH agent identity: {:?}", identity.comment());

            let hash_alg = handle
                .best_supported_rsa_hash()
                .await
                .ok()
                .flatten()
                .flatten();

            match handle
                .authenticate_publickey_with(username, identity.clone(), hash_alg, &mut agent)
                .await
            {
                Ok(result) if result.success() => {
                    info!("Authenticated with SSH agent");
                    return Ok(true);
                }
                Ok(_) => debug!("Agent identity not accepted, trying next"),
                Err(e) => debug!("Agent authentication error: {}, trying next", e),
            }
        }

        Ok(false)
    }

    fn name(&self) -> &'static str {
        "agent"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_auth_name() {
        assert_eq!(AgentAuth::new().name(), "agent");
    }

    #[test]
    fn test_agent_auth_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<AgentAuth>();
    }
}
