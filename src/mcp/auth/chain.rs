//! Authentication chain for trying multiple strategies.

use async_trait::async_trait;
use russh::client;
use tracing::debug;

use crate::mcp::credentials::{Credential, Secret};
use crate::mcp::error::TransportError;
use crate::mcp::session::SshClientHandler;

use super::traits::AuthStrategy;
use super::{AgentAuth, KeyAuth, KeySource, PasswordAuth};

/// Authentication chain that tries multiple strategies in order.
///
/// The first strategy the server accepts stops the chain.
pub struct AuthChain {
    strategies: Vec<Box<dyn AuthStrategy>>,
}

impl AuthChain {
    pub fn new() -> Self {
        Self {
            strategies: Vec::new(),
        }
    }

    pub fn with_password(mut self, password: Secret) -> Self {
        self.strategies.push(Box::new(PasswordAuth::new(password)));
        self
    }

    pub fn with_key(mut self, source: KeySource, passphrase: Option<Secret>) -> Self {
        self.strategies
            .push(Box::new(KeyAuth::new(source, passphrase)));
        self
    }

    pub fn with_agent(mut self) -> Self {
        self.strategies.push(Box::new(AgentAuth::new()));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    #[cfg(test)]
    fn names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }
}

impl Default for AuthChain {
    fn default() -> Self {
        Self::new()
    }
}

/// Build the chain for a stored credential.
///
/// An explicit credential is used on its own. The agent is only consulted when
/// the session was opened without one.
pub fn build_auth_chain(credential: &Credential) -> AuthChain {
    let chain = AuthChain::new();
    match credential {
        Credential::Password(password) => chain.with_password(password.clone()),
        Credential::KeyFile { path, passphrase } => {
            chain.with_key(KeySource::File(path.clone()), passphrase.clone())
        }
        Credential::KeyMaterial { pem, passphrase } => {
            chain.with_key(KeySource::Pem(pem.clone()), passphrase.clone())
        }
        Credential::Agent => chain.with_agent(),
    }
}

#[async_trait]
impl AuthStrategy for AuthChain {
    async fn authenticate(
        &self,
        handle: &mut client::Handle<SshClientHandler>,
        username: &str,
    ) -> Result<bool, TransportError> {
        if self.strategies.is_empty() {
            return Err(TransportError::Auth(
                "no authentication strategies configured".to_string(),
            ));
        }

        let mut last_error = None;

        for strategy in &self.strategies {
            debug!("Trying authentication strategy: {}", strategy.name());

            match strategy.authenticate(handle, username).await {
                Ok(true) => {
                    debug!("Authentication succeeded with strategy: {}", strategy.name());
                    return Ok(true);
                }
                Ok(false) => {
                    debug!("Authentication rejected for strategy: {}", strategy.name());
                    last_error = Some(TransportError::Auth(format!(
                        "{} authentication rejected for user {}",
                        strategy.name(),
                        username
                    )));
                }
                Err(e) => {
                    debug!("Authentication error with strategy {}: {}", strategy.name(), e);
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            TransportError::Auth("all authentication methods failed".to_string())
        }))
    }

    fn name(&self) -> &'static str {
        "chain"
    }
}
