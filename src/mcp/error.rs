//! Error taxonomy for sessions and the collaborators they drive.
//!
//! Two layers are kept apart:
//!
//! - [`TransportError`]: what a collaborator (the SSH transport or the Kubernetes
//!   client) reports. It knows nothing about sessions.
//! - [`SessionError`]: what the session manager reports to callers. Collaborator
//!   failures are wrapped together with the session id and the [`Operation`] that
//!   failed, so a caller always knows which session and which step to act on.
//!
//! [`ErrorKind`] flattens both layers into the single taxonomy exposed to the
//! tool layer.
//!
//! # Retry Classification
//!
//! The session manager never retries. The dispatcher may retry `open`, and asks
//! [`SessionError::is_retryable`] which failures are transient:
//!
//! - **Not retryable**: authentication failures, capacity rejections, anything
//!   scoped to an existing session.
//! - **Retryable**: connection failures and connect timeouts.
//!
//! Authentication failures are never retried to avoid account lockouts.

use std::fmt;
use std::time::Duration;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::types::SessionState;

/// Failure reported by a remote collaborator.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("failed to connect: {0}")]
    Connect(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("command execution failed: {0}")]
    Exec(String),

    /// The transport itself is gone; the owning session cannot be used again.
    #[error("connection lost: {0}")]
    Disconnected(String),

    #[error("remote file not found: {0}")]
    RemoteNotFound(String),

    #[error("failed to fetch remote file: {0}")]
    Fetch(String),

    #[error("invalid kubeconfig: {0}")]
    Parse(String),

    #[error("kubernetes API error: {0}")]
    Api(String),

    #[error("kubernetes authorization denied: {0}")]
    Authz(String),
}

/// Session manager operation, used for error context and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Open,
    Run,
    FetchKubeconfig,
    ListPods,
    ListNamespaces,
    ListServices,
    ListDeployments,
    PodLogs,
    DescribePod,
    ListEvents,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Open => "open",
            Operation::Run => "run",
            Operation::FetchKubeconfig => "fetch_kubeconfig",
            Operation::ListPods => "list_pods",
            Operation::ListNamespaces => "list_namespaces",
            Operation::ListServices => "list_services",
            Operation::ListDeployments => "list_deployments",
            Operation::PodLogs => "pod_logs",
            Operation::DescribePod => "describe_pod",
            Operation::ListEvents => "list_events",
        };
        f.write_str(name)
    }
}

/// Flat error taxonomy exposed to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    AuthError,
    ConnectError,
    TimeoutError,
    ExecError,
    FetchError,
    RemoteNotFound,
    ParseError,
    ApiError,
    AuthzError,
    NotFound,
    NotActive,
    NoKubeContext,
    CapacityError,
    Cancelled,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::AuthError => "auth_error",
            ErrorKind::ConnectError => "connect_error",
            ErrorKind::TimeoutError => "timeout_error",
            ErrorKind::ExecError => "exec_error",
            ErrorKind::FetchError => "fetch_error",
            ErrorKind::RemoteNotFound => "remote_not_found",
            ErrorKind::ParseError => "parse_error",
            ErrorKind::ApiError => "api_error",
            ErrorKind::AuthzError => "authz_error",
            ErrorKind::NotFound => "not_found",
            ErrorKind::NotActive => "not_active",
            ErrorKind::NoKubeContext => "no_kube_context",
            ErrorKind::CapacityError => "capacity_error",
            ErrorKind::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&TransportError> for ErrorKind {
    fn from(err: &TransportError) -> Self {
        match err {
            TransportError::Auth(_) => ErrorKind::AuthError,
            TransportError::Connect(_) => ErrorKind::ConnectError,
            TransportError::Timeout(_) => ErrorKind::TimeoutError,
            TransportError::Exec(_) | TransportError::Disconnected(_) => ErrorKind::ExecError,
            TransportError::RemoteNotFound(_) => ErrorKind::RemoteNotFound,
            TransportError::Fetch(_) => ErrorKind::FetchError,
            TransportError::Parse(_) => ErrorKind::ParseError,
            TransportError::Api(_) => ErrorKind::ApiError,
            TransportError::Authz(_) => ErrorKind::AuthzError,
        }
    }
}

/// Error returned by every [`SessionManager`](super::manager::SessionManager) operation.
#[derive(Debug, Clone, Error)]
pub enum SessionError {
    #[error("no session with ID: {session_id}")]
    NotFound { session_id: String },

    #[error("session {session_id} is not active (state: {state})")]
    NotActive {
        session_id: String,
        state: SessionState,
    },

    #[error("session {session_id} has no kube context; call kube_fetch_config first")]
    NoKubeContext { session_id: String },

    #[error("session limit reached ({limit} active); close a session before opening another")]
    Capacity { limit: usize },

    #[error("{operation} on session {session_id} was cancelled because the session is closing")]
    Cancelled {
        session_id: String,
        operation: Operation,
    },

    #[error("{operation} on session {session_id} failed: {source}")]
    Transport {
        session_id: String,
        operation: Operation,
        #[source]
        source: TransportError,
    },
}

impl SessionError {
    pub(crate) fn transport(
        session_id: impl Into<String>,
        operation: Operation,
        source: TransportError,
    ) -> Self {
        SessionError::Transport {
            session_id: session_id.into(),
            operation,
            source,
        }
    }

    /// Flat taxonomy for this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            SessionError::NotFound { .. } => ErrorKind::NotFound,
            SessionError::NotActive { .. } => ErrorKind::NotActive,
            SessionError::NoKubeContext { .. } => ErrorKind::NoKubeContext,
            SessionError::Capacity { .. } => ErrorKind::CapacityError,
            SessionError::Cancelled { .. } => ErrorKind::Cancelled,
            SessionError::Transport { source, .. } => ErrorKind::from(source),
        }
    }

    /// Session the error refers to, if any.
    pub fn session_id(&self) -> Option<&str> {
        match self {
            SessionError::NotFound { session_id }
            | SessionError::NotActive { session_id, .. }
            | SessionError::NoKubeContext { session_id }
            | SessionError::Cancelled { session_id, .. }
            | SessionError::Transport { session_id, .. } => Some(session_id),
            SessionError::Capacity { .. } => None,
        }
    }

    /// Whether the transport reported that the connection itself is gone.
    pub fn is_connection_lost(&self) -> bool {
        matches!(
            self,
            SessionError::Transport {
                source: TransportError::Disconnected(_),
                ..
            }
        )
    }

    /// Whether a fresh `open` might succeed where this one failed.
    ///
    /// Only connection-level failures of `open` qualify. Authentication failures
    /// take precedence and are never retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            SessionError::Transport {
                operation: Operation::Open,
                source,
                ..
            } => matches!(
                source,
                TransportError::Connect(_) | TransportError::Timeout(_)
            ),
            _ => false,
        }
    }
}
