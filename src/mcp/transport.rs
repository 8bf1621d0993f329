//! Collaborator seams between the session manager and the SSH transport.
//!
//! The manager only talks to [`Connector`] and [`RemoteShell`]. The russh
//! implementation lives in [`client`](super::client); tests plug in fakes.

use std::time::Duration;

use async_trait::async_trait;

use super::credentials::Credential;
use super::error::TransportError;
use super::types::SshCommandResponse;

/// Everything needed to open one authenticated transport.
#[derive(Debug, Clone)]
pub struct ConnectRequest {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub credential: Credential,
    /// Deadline covering TCP connect, handshake and authentication
    pub timeout: Duration,
}

/// Opens authenticated transports.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, request: &ConnectRequest)
    -> Result<Box<dyn RemoteShell>, TransportError>;
}

/// One authenticated transport to one host.
#[async_trait]
pub trait RemoteShell: Send + Sync {
    /// Run a command and collect its output.
    ///
    /// Exceeding `timeout` yields [`TransportError::Timeout`]; the transport
    /// stays usable. [`TransportError::Disconnected`] means it does not.
    async fn exec(
        &self,
        command: &str,
        timeout: Duration,
    ) -> Result<SshCommandResponse, TransportError>;

    /// Read a whole remote file.
    async fn fetch_file(&self, remote_path: &str, timeout: Duration)
    -> Result<Vec<u8>, TransportError>;

    /// Release the transport. Calling it again does nothing.
    async fn close(&self);

    fn is_closed(&self) -> bool;

    /// Authentication method that opened this transport.
    fn auth_method(&self) -> &'static str;
}
