//! MCP tool surface.
//!
//! Each tool validates its inputs, hands a typed request to the
//! [`SessionManager`], and renders the result for the MCP client:
//!
//! - `ssh_connect`: Open a session, retrying transient connection failures
//! - `ssh_execute`: Run a command and wait for its output
//! - `ssh_disconnect`: Close a session and release everything it holds
//! - `ssh_list_sessions`: Describe every known session
//! - `kube_fetch_config`: Load a kubeconfig from the session's host
//! - `kube_list_pods`, `kube_list_namespaces`, `kube_list_services`,
//!   `kube_list_deployments`, `kube_pod_logs`, `kube_describe_pod`,
//!   `kube_list_events`: Read the attached cluster
//! - `health_check`: Report server health and session usage
//!
//! Errors are returned as strings prefixed with their kind, e.g.
//! `[not_active] session ... is not active (state: closed)`.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};
use poem_mcpserver::{Tools, content::Text, tool::StructuredContent};
use tracing::{error, info, warn};

use super::client::parse_address;
use super::config::{
    MAX_RETRY_DELAY, resolve_command_timeout, resolve_connect_timeout, resolve_max_retries,
    resolve_retry_delay,
};
use super::credentials::Credential;
use super::error::SessionError;
use super::manager::{OpenRequest, SessionManager};
use super::types::{
    DeploymentListResponse, EventListResponse, HealthResponse, KubeContextHandle,
    NamespaceListResponse, PodDetailResponse, PodListResponse, PodLogsResponse,
    ServiceListResponse, SessionInfo, SessionListResponse, SshCommandResponse,
    SshConnectResponse,
};

/// Remote kubeconfig location used when `kube_fetch_config` gets no path.
pub(crate) const DEFAULT_KUBECONFIG_PATH: &str = "~/.kube/config";

/// Largest `tail_lines` accepted by `kube_pod_logs`.
const MAX_TAIL_LINES: i64 = 10_000;

/// Render a manager error for the MCP client.
pub(crate) fn tool_error(err: SessionError) -> String {
    format!("[{}] {}", err.kind(), err)
}

/// Reject empty or whitespace-only required inputs.
fn required(field: &str, value: String) -> Result<String, String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(format!("'{}' must not be empty", field))
    } else {
        Ok(trimmed.to_string())
    }
}

/// Treat blank optional inputs as absent.
fn optional(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn validate_tail_lines(tail_lines: Option<i64>) -> Result<Option<i64>, String> {
    match tail_lines {
        Some(n) if !(1..=MAX_TAIL_LINES).contains(&n) => Err(format!(
            "'tail_lines' must be between 1 and {}",
            MAX_TAIL_LINES
        )),
        other => Ok(other),
    }
}

/// Open a session with exponential backoff and jitter on connection-level failures.
///
/// Every attempt is a fresh `open` with its own session id. Authentication and
/// capacity errors end the loop immediately. Returns the session and the number
/// of retries it took.
pub(crate) async fn open_with_retry(
    manager: &SessionManager,
    request: OpenRequest,
    max_retries: u32,
    min_delay: Duration,
) -> Result<(SessionInfo, u32), SessionError> {
    let attempt_counter = AtomicU32::new(0);
    let target = format!("{}@{}:{}", request.username, request.host, request.port);

    let backoff = ExponentialBuilder::default()
        .with_min_delay(min_delay)
        .with_max_delay(MAX_RETRY_DELAY)
        .with_max_times(max_retries as usize)
        .with_jitter();

    let result = (|| async {
        let current_attempt = attempt_counter.fetch_add(1, Ordering::SeqCst);
        if current_attempt > 0 {
            warn!("SSH connection retry attempt {} to {}", current_attempt, target);
        }
        manager.open(request.clone()).await
    })
    .retry(backoff)
    .when(|e: &SessionError| {
        let retryable = e.is_retryable();
        if !retryable {
            warn!(
                "SSH connection to {} failed with non-retryable error: {}",
                target, e
            );
        }
        retryable
    })
    .notify(|err, dur| {
        warn!("SSH connection failed: {}. Retrying in {:?}", err, dur);
    })
    .await;

    let retry_count = attempt_counter.load(Ordering::SeqCst).saturating_sub(1);

    match result {
        Ok(info) => {
            if retry_count > 0 {
                info!(
                    "SSH connection to {} succeeded after {} retry attempt(s)",
                    target, retry_count
                );
            }
            Ok((info, retry_count))
        }
        Err(e) => {
            error!(
                "SSH connection to {} failed after {} attempt(s): {}",
                target,
                retry_count + 1,
                e
            );
            Err(e)
        }
    }
}

/// MCP tools for SSH sessions and the Kubernetes contexts fetched through them.
#[derive(Clone)]
pub struct McpKubeSshCommands {
    manager: SessionManager,
}

impl McpKubeSshCommands {
    pub fn new(manager: SessionManager) -> Self {
        Self { manager }
    }
}

#[Tools]
impl McpKubeSshCommands {
    /// Connect to an SSH server and open a session.
    ///
    /// Returns a session_id for every other tool. Credentials are tried in this
    /// order: inline private_key, key_path, password, then the local SSH agent.
    /// Connection failures and timeouts are retried with exponential backoff;
    /// authentication failures are not.
    #[allow(clippy::too_many_arguments)]
    async fn ssh_connect(
        &self,
        /// SSH server address in format "host:port" (e.g., "192.168.1.1:22"); port defaults to 22
        address: String,
        /// SSH username for authentication
        username: String,
        /// Password for password-based authentication
        password: Option<String>,
        /// Path to a private key file on the server host
        key_path: Option<String>,
        /// Private key in OpenSSH/PEM text form
        private_key: Option<String>,
        /// Passphrase for an encrypted private key
        passphrase: Option<String>,
        /// Connection timeout in seconds (default: 30, env: SSH_CONNECT_TIMEOUT)
        timeout_secs: Option<u64>,
        /// Maximum retry attempts for transient connection failures (default: 3, env: SSH_MAX_RETRIES)
        max_retries: Option<u32>,
        /// Initial delay between retries in milliseconds, uses exponential backoff (default: 1000, env: SSH_RETRY_DELAY_MS)
        retry_delay_ms: Option<u64>,
        /// Optional human-readable name for the session (e.g., "prod-bastion")
        name: Option<String>,
    ) -> Result<StructuredContent<SshConnectResponse>, String> {
        let address = required("address", address)?;
        let username = required("username", username)?;
        let (host, port) = parse_address(&address)?;
        if host.is_empty() {
            return Err("'address' must include a host".to_string());
        }

        let credential = Credential::from_parts(password, key_path, private_key, passphrase);
        let timeout = resolve_connect_timeout(timeout_secs);
        let max_retries = resolve_max_retries(max_retries);
        let retry_delay = resolve_retry_delay(retry_delay_ms);
        let name = optional(name);

        info!(
            "Attempting SSH connection to {}@{} ({} auth) with timeout {}s, max_retries={}, retry_delay={}ms, name={:?}",
            username,
            address,
            credential.method(),
            timeout.as_secs(),
            max_retries,
            retry_delay.as_millis(),
            name
        );

        let request = OpenRequest {
            host,
            port,
            username,
            credential,
            name,
            connect_timeout: Some(timeout),
        };

        let (session, retry_attempts) =
            open_with_retry(&self.manager, request, max_retries, retry_delay)
                .await
                .map_err(tool_error)?;

        let message = {
            let name_part = session
                .name
                .as_ref()
                .map(|n| format!(" (name: '{}')", n))
                .unwrap_or_default();
            let retry_part = if retry_attempts > 0 {
                format!(" after {} retry attempt(s)", retry_attempts)
            } else {
                String::new()
            };
            format!(
                "Connected to {}@{}{}{}. Use session_id '{}' with ssh_execute or kube_fetch_config.",
                session.username, address, name_part, retry_part, session.session_id
            )
        };

        Ok(StructuredContent(SshConnectResponse {
            session_id: session.session_id,
            message,
            authenticated: true,
            retry_attempts,
        }))
    }

    /// Execute a command on a connected session and wait for it to finish.
    ///
    /// A non-zero exit code is reported in the result, not as an error. A
    /// timeout fails this call only; the session stays usable.
    async fn ssh_execute(
        &self,
        /// Session ID returned from ssh_connect
        session_id: String,
        /// Shell command to execute on the remote server
        command: String,
        /// Command execution timeout in seconds (default: 180, env: SSH_COMMAND_TIMEOUT)
        timeout_secs: Option<u64>,
    ) -> Result<StructuredContent<SshCommandResponse>, String> {
        let session_id = required("session_id", session_id)?;
        if command.trim().is_empty() {
            return Err("'command' must not be empty".to_string());
        }
        let timeout = resolve_command_timeout(timeout_secs);

        self.manager
            .run(&session_id, &command, Some(timeout))
            .await
            .map(StructuredContent)
            .map_err(tool_error)
    }

    /// Disconnect a session and release its connection, kube context and credentials.
    ///
    /// Commands still running on the session are cancelled. Disconnecting an
    /// already closed session forgets it entirely.
    async fn ssh_disconnect(
        &self,
        /// Session ID to disconnect
        session_id: String,
    ) -> Result<Text<String>, String> {
        let session_id = required("session_id", session_id)?;
        info!("Disconnecting session: {}", session_id);

        self.manager
            .close(&session_id)
            .await
            .map_err(tool_error)?;
        Ok(Text(format!(
            "Session {} disconnected successfully",
            session_id
        )))
    }

    /// List known sessions with their state and attached kube context.
    ///
    /// Closed sessions remain listed until the next cleanup sweep.
    async fn ssh_list_sessions(&self) -> StructuredContent<SessionListResponse> {
        let sessions = self.manager.list_sessions();
        let count = sessions.len();
        StructuredContent(SessionListResponse { sessions, count })
    }

    /// Fetch a kubeconfig from the session's host and attach a Kubernetes context.
    ///
    /// The kubeconfig's current-context decides the cluster and default
    /// namespace. Fetching again replaces the previous context.
    async fn kube_fetch_config(
        &self,
        /// Session ID returned from ssh_connect
        session_id: String,
        /// Path of the kubeconfig on the remote host (default: "~/.kube/config")
        remote_path: Option<String>,
    ) -> Result<StructuredContent<KubeContextHandle>, String> {
        let session_id = required("session_id", session_id)?;
        let remote_path =
            optional(remote_path).unwrap_or_else(|| DEFAULT_KUBECONFIG_PATH.to_string());

        self.manager
            .fetch_kubeconfig(&session_id, &remote_path)
            .await
            .map(StructuredContent)
            .map_err(tool_error)
    }

    /// List pods, sorted by name.
    async fn kube_list_pods(
        &self,
        /// Session ID with an attached kube context
        session_id: String,
        /// Namespace to list (default: the context's namespace)
        namespace: Option<String>,
    ) -> Result<StructuredContent<PodListResponse>, String> {
        let session_id = required("session_id", session_id)?;
        let namespace = optional(namespace);

        self.manager
            .list_pods(&session_id, namespace.as_deref())
            .await
            .map(StructuredContent)
            .map_err(tool_error)
    }

    /// List namespaces of the attached cluster.
    async fn kube_list_namespaces(
        &self,
        /// Session ID with an attached kube context
        session_id: String,
    ) -> Result<StructuredContent<NamespaceListResponse>, String> {
        let session_id = required("session_id", session_id)?;

        let namespaces = self
            .manager
            .list_namespaces(&session_id)
            .await
            .map_err(tool_error)?;
        Ok(StructuredContent(NamespaceListResponse {
            session_id,
            namespaces,
        }))
    }

    /// List services with their type, cluster IP and ports.
    async fn kube_list_services(
        &self,
        /// Session ID with an attached kube context
        session_id: String,
        /// Namespace to list (default: the context's namespace)
        namespace: Option<String>,
    ) -> Result<StructuredContent<ServiceListResponse>, String> {
        let session_id = required("session_id", session_id)?;
        let namespace = optional(namespace);

        self.manager
            .list_services(&session_id, namespace.as_deref())
            .await
            .map(StructuredContent)
            .map_err(tool_error)
    }

    /// List deployments with replica counts and image.
    async fn kube_list_deployments(
        &self,
        /// Session ID with an attached kube context
        session_id: String,
        /// Namespace to list (default: the context's namespace)
        namespace: Option<String>,
    ) -> Result<StructuredContent<DeploymentListResponse>, String> {
        let session_id = required("session_id", session_id)?;
        let namespace = optional(namespace);

        self.manager
            .list_deployments(&session_id, namespace.as_deref())
            .await
            .map(StructuredContent)
            .map_err(tool_error)
    }

    /// Read logs of a pod.
    async fn kube_pod_logs(
        &self,
        /// Session ID with an attached kube context
        session_id: String,
        /// Pod name
        pod: String,
        /// Namespace of the pod (default: the context's namespace)
        namespace: Option<String>,
        /// Container name, required for multi-container pods
        container: Option<String>,
        /// Only return this many lines from the end of the log (1-10000)
        tail_lines: Option<i64>,
    ) -> Result<StructuredContent<PodLogsResponse>, String> {
        let session_id = required("session_id", session_id)?;
        let pod = required("pod", pod)?;
        let namespace = optional(namespace);
        let container = optional(container);
        let tail_lines = validate_tail_lines(tail_lines)?;

        self.manager
            .pod_logs(
                &session_id,
                &pod,
                namespace.as_deref(),
                container.as_deref(),
                tail_lines,
            )
            .await
            .map(StructuredContent)
            .map_err(tool_error)
    }

    /// Describe a pod: phase, node, labels, annotations and per-container readiness.
    async fn kube_describe_pod(
        &self,
        /// Session ID with an attached kube context
        session_id: String,
        /// Pod name
        pod: String,
        /// Namespace of the pod (default: the context's namespace)
        namespace: Option<String>,
    ) -> Result<StructuredContent<PodDetailResponse>, String> {
        let session_id = required("session_id", session_id)?;
        let pod = required("pod", pod)?;
        let namespace = optional(namespace);

        self.manager
            .describe_pod(&session_id, &pod, namespace.as_deref())
            .await
            .map(StructuredContent)
            .map_err(tool_error)
    }

    /// List cluster events, newest first.
    ///
    /// Give resource_kind and/or resource_name to see only the events about
    /// one object, e.g. kind "Pod" and name "web-0".
    async fn kube_list_events(
        &self,
        /// Session ID with an attached kube context
        session_id: String,
        /// Namespace to list (default: the context's namespace)
        namespace: Option<String>,
        /// List events of every namespace; namespace is ignored (default: false)
        all_namespaces: Option<bool>,
        /// Kind of the involved object (e.g., "Pod", "Deployment")
        resource_kind: Option<String>,
        /// Name of the involved object
        resource_name: Option<String>,
    ) -> Result<StructuredContent<EventListResponse>, String> {
        let session_id = required("session_id", session_id)?;
        let namespace = optional(namespace);
        let kind = optional(resource_kind);
        let name = optional(resource_name);

        self.manager
            .list_events(
                &session_id,
                namespace.as_deref(),
                all_namespaces.unwrap_or(false),
                kind.as_deref(),
                name.as_deref(),
            )
            .await
            .map(StructuredContent)
            .map_err(tool_error)
    }

    /// Report server health and how many sessions hold a connection.
    async fn health_check(&self) -> StructuredContent<HealthResponse> {
        StructuredContent(self.manager.health())
    }
}
