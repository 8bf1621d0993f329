//! russh-backed SSH transport.
//!
//! ## Connection Lifecycle
//!
//! 1. **Client Configuration**: keepalive and compression settings. Sessions have
//!    no inactivity timeout of their own; idle sessions are evicted by the
//!    session manager's reaper instead.
//!
//! 2. **Connection Establishment**: TCP connect, handshake and authentication run
//!    under one deadline. Crossing it yields [`TransportError::Timeout`].
//!
//! 3. **Authentication**: the stored credential is turned into an
//!    [`AuthChain`](crate::mcp::auth::AuthChain) by
//!    [`build_auth_chain`](crate::mcp::auth::build_auth_chain).
//!
//! 4. **Command Execution**: each command gets its own channel, driven by a
//!    spawned task. One deadline covers opening the channel, starting the
//!    command and reading its output. Dropping the caller's future stops the
//!    task, and the task closes the channel on every path.
//!
//! 5. **File Retrieval**: SFTP first. When the server has no SFTP subsystem the
//!    file is read with `cat` over an exec channel.
//!
//! No retries happen here. The tool layer retries `open` on transient errors.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use russh::{Channel, ChannelMsg, Disconnect, client};
use russh_sftp::client::SftpSession;
use russh_sftp::client::error::Error as SftpError;
use russh_sftp::protocol::StatusCode;
use tokio::io::AsyncReadExt;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::mcp::auth::{AuthStrategy, build_auth_chain};
use crate::mcp::error::TransportError;
use crate::mcp::session::SshClientHandler;
use crate::mcp::transport::{ConnectRequest, Connector, RemoteShell};
use crate::mcp::types::SshCommandResponse;

/// Build russh client configuration.
///
/// - Inactivity timeout as given (`None` keeps the connection open indefinitely)
/// - Keepalive interval of 30 seconds with max 3 keepalives
/// - Compression preference based on `compress` (ZLIB if enabled, NONE if disabled)
pub(crate) fn build_client_config(
    inactivity_timeout: Option<Duration>,
    compress: bool,
) -> Arc<client::Config> {
    let compression = if compress {
        (&[russh::compression::ZLIB, russh::compression::NONE][..]).into()
    } else {
        (&[russh::compression::NONE][..]).into()
    };

    let preferred = russh::Preferred {
        compression,
        ..Default::default()
    };

    Arc::new(client::Config {
        inactivity_timeout,
        keepalive_interval: Some(Duration::from_secs(30)),
        keepalive_max: 3,
        preferred,
        ..Default::default()
    })
}

/// Parse address string into host and port components.
///
/// Supports `host:port` and bare `host` (default SSH port 22). Uses
/// `rsplit_once` so bracketed IPv6 addresses such as `[::1]:22` work.
///
/// ```ignore
/// let (host, port) = parse_address("example.com:2222")?;
/// assert_eq!(port, 2222);
/// ```
pub(crate) fn parse_address(address: &str) -> Result<(String, u16), String> {
    if let Some((host, port_str)) = address.rsplit_once(':') {
        let port = port_str
            .parse::<u16>()
            .map_err(|e| format!("Invalid port number: {}", e))?;
        Ok((host.to_string(), port))
    } else {
        Ok((address.to_string(), 22))
    }
}

/// Quote a string for a POSIX shell.
fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// Command used to read a file when SFTP is unavailable.
///
/// A leading `~/` is left outside the quotes so the remote shell expands it.
pub(crate) fn cat_command(remote_path: &str) -> String {
    match remote_path.strip_prefix("~/") {
        Some(rest) => format!("cat -- ~/{}", shell_quote(rest)),
        None => format!("cat -- {}", shell_quote(remote_path)),
    }
}

/// SFTP resolves relative paths against the login directory.
fn sftp_path(remote_path: &str) -> &str {
    remote_path.strip_prefix("~/").unwrap_or(remote_path)
}

fn looks_missing(stderr: &str) -> bool {
    let lower = stderr.to_ascii_lowercase();
    lower.contains("no such file") || lower.contains("not found")
}

/// Opens russh connections.
pub struct SshConnector {
    compress: bool,
}

impl SshConnector {
    pub fn new(compress: bool) -> Self {
        Self { compress }
    }
}

#[async_trait]
impl Connector for SshConnector {
    async fn connect(
        &self,
        request: &ConnectRequest,
    ) -> Result<Box<dyn RemoteShell>, TransportError> {
        let config = build_client_config(None, self.compress);
        let target = format!("{}@{}:{}", request.username, request.host, request.port);

        let attempt = async {
            let mut handle = client::connect(
                config,
                (request.host.as_str(), request.port),
                SshClientHandler,
            )
            .await
            .map_err(|e| TransportError::Connect(format!("{}: {}", target, e)))?;

            let chain = build_auth_chain(&request.credential);
            if !chain.authenticate(&mut handle, &request.username).await? {
                return Err(TransportError::Auth(format!(
                    "no authentication method succeeded for {}",
                    target
                )));
            }
            Ok(handle)
        };

        let handle = tokio::time::timeout(request.timeout, attempt)
            .await
            .map_err(|_| TransportError::Timeout(request.timeout))??;

        info!(
            "SSH transport to {} authenticated via {}",
            target,
            request.credential.method()
        );

        Ok(Box::new(SshConnection {
            handle: Arc::new(handle),
            target,
            auth_method: request.credential.method(),
            closed: AtomicBool::new(false),
        }))
    }
}

/// One authenticated russh connection.
pub struct SshConnection {
    handle: Arc<client::Handle<SshClientHandler>>,
    target: String,
    auth_method: &'static str,
    closed: AtomicBool,
}

/// Raw output of one exec channel.
struct ChannelOutput {
    stdout: Vec<u8>,
    stderr: Vec<u8>,
    exit_code: Option<u32>,
    /// The server sent Close before we did
    closed_by_peer: bool,
}

/// How one bounded step of an exec task ended.
#[derive(Debug, PartialEq, Eq)]
enum Step<T> {
    Done(T),
    TimedOut,
    /// The caller stopped waiting
    Abandoned,
}

/// Drive `work` until it finishes, `deadline` passes or `cancel` fires.
async fn bounded<T>(
    cancel: &CancellationToken,
    deadline: Instant,
    work: impl Future<Output = T>,
) -> Step<T> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Step::Abandoned,
        result = tokio::time::timeout_at(deadline, work) => match result {
            Ok(value) => Step::Done(value),
            Err(_) => Step::TimedOut,
        },
    }
}

/// Start `command` on `channel` and collect its output until exit or close.
async fn exchange(
    channel: &mut Channel<client::Msg>,
    command: &str,
) -> Result<ChannelOutput, russh::Error> {
    channel.exec(true, command).await?;

    let mut output = ChannelOutput {
        stdout: Vec::with_capacity(4096),
        stderr: Vec::with_capacity(1024),
        exit_code: None,
        closed_by_peer: false,
    };

    loop {
        match channel.wait().await {
            Some(ChannelMsg::Data { data }) => output.stdout.extend_from_slice(&data),
            Some(ChannelMsg::ExtendedData { data, ext }) => {
                // ext == 1 is stderr in SSH protocol
                if ext == 1 {
                    output.stderr.extend_from_slice(&data);
                }
            }
            Some(ChannelMsg::ExitStatus { exit_status }) => {
                output.exit_code = Some(exit_status);
            }
            Some(ChannelMsg::Eof) => {
                if output.exit_code.is_some() {
                    break;
                }
            }
            Some(ChannelMsg::Close) => {
                output.closed_by_peer = true;
                break;
            }
            Some(_) => {}
            None => break,
        }
    }
    Ok(output)
}

impl SshConnection {
    /// Classify a russh failure: a dead handle means the transport is gone.
    fn failure(
        handle: &client::Handle<SshClientHandler>,
        context: &str,
        err: impl std::fmt::Display,
    ) -> TransportError {
        if handle.is_closed() {
            TransportError::Disconnected(format!("{}: {}", context, err))
        } else {
            TransportError::Exec(format!("{}: {}", context, err))
        }
    }

    /// Run `command` on a fresh channel inside a spawned task.
    ///
    /// `timeout` bounds the whole exchange, channel setup included.
    async fn run_channel(
        &self,
        command: &str,
        timeout: Duration,
    ) -> Result<ChannelOutput, TransportError> {
        if self.is_closed() {
            return Err(TransportError::Disconnected(format!(
                "transport to {} is closed",
                self.target
            )));
        }

        let handle = Arc::clone(&self.handle);
        let command = command.to_string();
        let deadline = Instant::now() + timeout;
        let cancel = CancellationToken::new();
        let _abandon = cancel.clone().drop_guard();

        let task = tokio::spawn(async move {
            let abandoned = || TransportError::Exec("command abandoned by caller".to_string());

            let mut channel = match bounded(&cancel, deadline, handle.channel_open_session()).await
            {
                Step::Done(opened) => {
                    opened.map_err(|e| Self::failure(&handle, "failed to open channel", e))?
                }
                Step::TimedOut => return Err(TransportError::Timeout(timeout)),
                Step::Abandoned => return Err(abandoned()),
            };

            let exchanged = bounded(&cancel, deadline, exchange(&mut channel, &command)).await;
            let _ = channel.close().await;

            match exchanged {
                Step::Done(Ok(output)) => {
                    if output.exit_code.is_none() && !output.closed_by_peer && handle.is_closed() {
                        return Err(TransportError::Disconnected(
                            "connection dropped while the command was running".to_string(),
                        ));
                    }
                    Ok(output)
                }
                Step::Done(Err(e)) => Err(Self::failure(&handle, "failed to execute command", e)),
                Step::TimedOut => {
                    warn!(
                        "Command timed out after {:?}; partial output discarded",
                        timeout
                    );
                    Err(TransportError::Timeout(timeout))
                }
                Step::Abandoned => {
                    debug!("Command abandoned by caller, channel closed");
                    Err(abandoned())
                }
            }
        });

        task.await
            .map_err(|e| TransportError::Exec(format!("command task failed: {}", e)))?
    }

    async fn fetch_via_sftp(&self, remote_path: &str) -> Result<Option<Vec<u8>>, TransportError> {
        let channel = self
            .handle
            .channel_open_session()
            .await
            .map_err(|e| Self::failure(&self.handle, "failed to open channel", e))?;

        if let Err(e) = channel.request_subsystem(true, "sftp").await {
            debug!("SFTP subsystem unavailable on {}: {}", self.target, e);
            return Ok(None);
        }

        let sftp = match SftpSession::new(channel.into_stream()).await {
            Ok(sftp) => sftp,
            Err(e) => {
                debug!("SFTP session failed to start on {}: {}", self.target, e);
                return Ok(None);
            }
        };

        let result = async {
            let mut file = sftp
                .open(sftp_path(remote_path))
                .await
                .map_err(|e| sftp_failure(remote_path, e))?;
            let mut contents = Vec::new();
            file.read_to_end(&mut contents)
                .await
                .map_err(|e| TransportError::Fetch(format!("{}: {}", remote_path, e)))?;
            Ok(contents)
        }
        .await;

        let _ = sftp.close().await;
        result.map(Some)
    }

    async fn fetch_via_cat(
        &self,
        remote_path: &str,
        timeout: Duration,
    ) -> Result<Vec<u8>, TransportError> {
        let output = self
            .run_channel(&cat_command(remote_path), timeout)
            .await
            .map_err(|e| match e {
                TransportError::Exec(message) => TransportError::Fetch(message),
                other => other,
            })?;

        match output.exit_code {
            Some(0) => Ok(output.stdout),
            _ => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                if looks_missing(&stderr) {
                    Err(TransportError::RemoteNotFound(remote_path.to_string()))
                } else {
                    Err(TransportError::Fetch(format!(
                        "{}: {}",
                        remote_path,
                        stderr.trim()
                    )))
                }
            }
        }
    }
}

fn sftp_failure(remote_path: &str, err: SftpError) -> TransportError {
    match err {
        SftpError::Status(status) if status.status_code == StatusCode::NoSuchFile => {
            TransportError::RemoteNotFound(remote_path.to_string())
        }
        other => TransportError::Fetch(format!("{}: {}", remote_path, other)),
    }
}

#[async_trait]
impl RemoteShell for SshConnection {
    async fn exec(
        &self,
        command: &str,
        timeout: Duration,
    ) -> Result<SshCommandResponse, TransportError> {
        let output = self.run_channel(command, timeout).await?;
        Ok(SshCommandResponse {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.exit_code.map(|c| c as i32).unwrap_or(-1),
        })
    }

    async fn fetch_file(
        &self,
        remote_path: &str,
        timeout: Duration,
    ) -> Result<Vec<u8>, TransportError> {
        if self.is_closed() {
            return Err(TransportError::Disconnected(format!(
                "transport to {} is closed",
                self.target
            )));
        }

        let via_sftp = tokio::time::timeout(timeout, self.fetch_via_sftp(remote_path))
            .await
            .map_err(|_| TransportError::Timeout(timeout))??;

        match via_sftp {
            Some(contents) => Ok(contents),
            None => {
                debug!("Falling back to cat for {} on {}", remote_path, self.target);
                self.fetch_via_cat(remote_path, timeout).await
            }
        }
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Err(e) = self
            .handle
            .disconnect(Disconnect::ByApplication, "", "English")
            .await
        {
            debug!("Disconnect from {} reported: {}", self.target, e);
        }
        info!("SSH transport to {} closed", self.target);
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst) || self.handle.is_closed()
    }

    fn auth_method(&self) -> &'static str {
        self.auth_method
    }
}
