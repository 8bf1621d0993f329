//! russh client handler shared by every SSH transport.
//!
//! Host keys are accepted without verification (the equivalent of
//! `StrictHostKeyChecking=no`). Checking against a known_hosts file is not
//! implemented.

use russh::{client, keys};
use tracing::debug;

/// Client handler for russh that accepts all host keys.
pub struct SshClientHandler;

impl client::Handler for SshClientHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        _server_public_key: &keys::PublicKey,
    ) -> Result<bool, Self::Error> {
        debug!("Accepting server host key without verification");
        Ok(true)
    }
}
