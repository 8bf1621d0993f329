//! Private key SSH authentication.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use russh::{client, keys};
use tracing::debug;

use crate::mcp::credentials::Secret;
use crate::mcp::error::TransportError;
use crate::mcp::session::SshClientHandler;

use super::traits::AuthStrategy;

/// Where the private key comes from.
#[derive(Debug, Clone)]
pub enum KeySource {
    /// Key file readable by the server process.
    File(PathBuf),
    /// OpenSSH/PEM text supplied by the caller.
    Pem(Secret),
}

/// Public key authentication strategy.
///
/// Encrypted keys are supported when a passphrase is supplied.
pub struct KeyAuth {
    source: KeySource,
    passphrase: Option<Secret>,
}

impl KeyAuth {
    pub fn new(source: KeySource, passphrase: Option<Secret>) -> Self {
        Self { source, passphrase }
    }

    /// Decode the private key, decrypting it with the passphrase if present.
    pub fn load(&self) -> Result<keys::PrivateKey, TransportError> {
        let passphrase = match &self.passphrase {
            Some(secret) => Some(secret.expose_str().map_err(|_| {
                TransportError::Auth("key passphrase is not valid UTF-8".to_string())
            })?),
            None => None,
        };

        match &self.source {
            KeySource::File(path) => keys::load_secret_key(path, passphrase).map_err(|e| {
                TransportError::Auth(format!("failed to load private key from {:?}: {}", path, e))
            }),
            KeySource::Pem(pem) => {
                let text = pem.expose_str().map_err(|_| {
                    TransportError::Auth("private key is not valid UTF-8".to_string())
                })?;
                keys::decode_secret_key(text, passphrase).map_err(|e| {
                    TransportError::Auth(format!("failed to decode private key: {}", e))
                })
            }
        }
    }
}

#[async_trait]
impl AuthStrategy for KeyAuth {
    async fn authenticate(
        &self,
        handle: &mut client::Handle<SshClientHandler>,
        username: &str,
    ) -> Result<bool, TransportError> {
        let key_pair = self.load()?;

        // For RSA keys, use the best supported hash algorithm
        let hash_alg = handle
            .best_supported_rsa_hash()
            .await
            .ok()
            .flatten()
            .flatten();
        debug!("Using RSA hash algorithm for key auth: {:?}", hash_alg);

        let key_with_hash = keys::PrivateKeyWithHashAlg::new(Arc::new(key_pair), hash_alg);

        let result = handle
            .authenticate_publickey(username, key_with_hash)
            .await
            .map_err(|e| TransportError::Auth(format!("key authentication failed: {}", e)))?;

        Ok(result.success())
    }

    fn name(&self) -> &'static str {
        "key"
    }
}
