//! Serializable response types for the MCP tools.
//!
//! All types implement `Serialize`, `Deserialize`, and `JsonSchema` for proper
//! MCP protocol compatibility. None of them carry secret material.

use std::collections::BTreeMap;
use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Authentication in progress
    Connecting,
    /// Connected and usable
    Active,
    /// Teardown in progress
    Closing,
    /// Resources released; the id is dead
    Closed,
    /// Transport lost or connect failed; only `close` is accepted
    Failed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Connecting => write!(f, "connecting"),
            SessionState::Active => write!(f, "active"),
            SessionState::Closing => write!(f, "closing"),
            SessionState::Closed => write!(f, "closed"),
            SessionState::Failed => write!(f, "failed"),
        }
    }
}

/// Session descriptor returned to callers.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SessionInfo {
    pub session_id: String,
    /// Optional human-readable name for the session
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub host: String,
    #[schemars(schema_with = "crate::mcp::schema::uint")]
    pub port: u16,
    pub username: String,
    /// Authentication method used ("password", "key", "agent")
    pub auth_method: String,
    pub state: SessionState,
    /// When the session was opened (RFC3339 format)
    pub created_at: String,
    /// Last time an operation touched the session (RFC3339 format)
    pub last_activity: String,
    /// Connect timeout in seconds negotiated for this session
    #[schemars(schema_with = "crate::mcp::schema::uint")]
    pub connect_timeout_secs: u64,
    /// Kube context attached to this session, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kube_context: Option<KubeContextHandle>,
}

/// Opaque handle describing an attached kube context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct KubeContextHandle {
    /// Unique identifier of this context; changes when the kubeconfig is re-fetched
    pub handle: String,
    pub session_id: String,
    /// Name of the kubeconfig context the client is bound to
    pub context: String,
    /// Namespace used when a namespace is not given
    pub default_namespace: String,
    /// Remote path the kubeconfig was read from
    pub source_path: String,
    /// When the kubeconfig was fetched (RFC3339 format)
    pub fetched_at: String,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct SshConnectResponse {
    pub session_id: String,
    pub message: String,
    pub authenticated: bool,
    /// Number of retry attempts needed to establish the connection
    #[schemars(schema_with = "crate::mcp::schema::uint")]
    pub retry_attempts: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct SshCommandResponse {
    pub stdout: String,
    pub stderr: String,
    /// Remote exit status, -1 when the server did not report one
    pub exit_code: i32,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct SessionListResponse {
    /// Sessions known to the server (closed tombstones included)
    pub sessions: Vec<SessionInfo>,
    /// Total number of sessions returned
    #[schemars(schema_with = "crate::mcp::schema::uint")]
    pub count: usize,
}

/// Pod summary returned by `kube_list_pods`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct PodDescriptor {
    pub name: String,
    pub namespace: String,
    /// Pod phase ("Running", "Pending", ...), "Unknown" when not reported
    pub phase: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct PodListResponse {
    pub session_id: String,
    pub namespace: String,
    pub pods: Vec<PodDescriptor>,
    #[schemars(schema_with = "crate::mcp::schema::uint")]
    pub count: usize,
}

/// One container of a described pod.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ContainerDetail {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// Readiness from the pod status; false when the container has not reported
    pub ready: bool,
}

/// Full description of one pod, returned by `kube_describe_pod`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct PodDetail {
    pub name: String,
    pub namespace: String,
    pub phase: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node: Option<String>,
    /// Creation time (RFC3339 format)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<String>,
    pub labels: BTreeMap<String, String>,
    pub annotations: BTreeMap<String, String>,
    pub containers: Vec<ContainerDetail>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct PodDetailResponse {
    pub session_id: String,
    pub pod: PodDetail,
}

/// Cluster event summary returned by `kube_list_events`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct EventDescriptor {
    pub namespace: String,
    /// "Normal" or "Warning"
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub event_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Kind and name of the involved object, e.g. "Pod/web-0"
    pub object: String,
    pub count: i32,
    /// Most recent occurrence (RFC3339 format)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct EventListResponse {
    pub session_id: String,
    /// Namespace listed, absent when events of every namespace were requested
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    /// Newest first
    pub events: Vec<EventDescriptor>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct NamespaceDescriptor {
    pub name: String,
    pub phase: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ServicePort {
    pub port: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_port: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ServiceDescriptor {
    pub name: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub service_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_ip: Option<String>,
    pub ports: Vec<ServicePort>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct DeploymentDescriptor {
    pub name: String,
    pub replicas: i32,
    pub ready_replicas: i32,
    pub available_replicas: i32,
    pub updated_replicas: i32,
    /// Image of the first container in the pod template
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct NamespaceListResponse {
    pub session_id: String,
    pub namespaces: Vec<NamespaceDescriptor>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct ServiceListResponse {
    pub session_id: String,
    pub namespace: String,
    pub services: Vec<ServiceDescriptor>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct DeploymentListResponse {
    pub session_id: String,
    pub namespace: String,
    pub deployments: Vec<DeploymentDescriptor>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct PodLogsResponse {
    pub session_id: String,
    pub namespace: String,
    pub pod: String,
    pub logs: String,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct HealthResponse {
    pub healthy: bool,
    /// Sessions currently holding a transport
    #[schemars(schema_with = "crate::mcp::schema::uint")]
    pub active_sessions: usize,
    /// Configured concurrency ceiling
    #[schemars(schema_with = "crate::mcp::schema::uint")]
    pub max_sessions: usize,
}

#[cfg(test)]
mod response_serialization {
    use super::*;

    mod session_state {
        use super::*;

        #[test]
        fn test_serializes_snake_case() {
            let json = serde_json::to_string(&SessionState::Closing).unwrap();
            assert_eq!(json, "\"closing\"");
        }

        #[test]
        fn test_display_matches_serde() {
            for state in [
                SessionState::Connecting,
                SessionState::Active,
                SessionState::Closing,
                SessionState::Closed,
                SessionState::Failed,
            ] {
                let json = serde_json::to_string(&state).unwrap();
                assert_eq!(json, format!("\"{}\"", state));
            }
        }
    }

    mod session_info {
        use super::*;

        fn sample(kube_context: Option<KubeContextHandle>) -> SessionInfo {
            SessionInfo {
                session_id: "uuid-123".to_string(),
                name: None,
                host: "10.0.0.5".to_string(),
                port: 22,
                username: "dev".to_string(),
                auth_method: "key".to_string(),
                state: SessionState::Active,
                created_at: "2024-01-15T10:30:00Z".to_string(),
                last_activity: "2024-01-15T10:31:00Z".to_string(),
                connect_timeout_secs: 30,
                kube_context,
            }
        }

        #[test]
        fn test_optional_fields_omitted() {
            let json = serde_json::to_string(&sample(None)).unwrap();
            // Check for "name": pattern to avoid matching "username"
            assert!(!json.contains("\"name\":"));
            assert!(!json.contains("\"kube_context\":"));
        }

        #[test]
        fn test_never_contains_credentials() {
            let json = serde_json::to_value(sample(None)).unwrap();
            assert!(json.get("password").is_none());
            assert!(json.get("private_key").is_none());
            assert!(json.get("kubeconfig").is_none());
        }

        #[test]
        fn test_with_kube_context() {
            let handle = KubeContextHandle {
                handle: "h-1".to_string(),
                session_id: "uuid-123".to_string(),
                context: "prod".to_string(),
                default_namespace: "apps".to_string(),
                source_path: "/home/dev/.kube/config".to_string(),
                fetched_at: "2024-01-15T10:32:00Z".to_string(),
            };
            let json = serde_json::to_string(&sample(Some(handle.clone()))).unwrap();
            let back: SessionInfo = serde_json::from_str(&json).unwrap();
            assert_eq!(back.kube_context, Some(handle));
        }
    }

    mod descriptors {
        use super::*;

        #[test]
        fn test_service_type_field_renamed() {
            let svc = ServiceDescriptor {
                name: "web".to_string(),
                service_type: Some("ClusterIP".to_string()),
                cluster_ip: Some("10.96.0.10".to_string()),
                ports: vec![ServicePort {
                    port: 80,
                    target_port: Some("8080".to_string()),
                    protocol: Some("TCP".to_string()),
                }],
            };
            let json = serde_json::to_value(&svc).unwrap();
            assert_eq!(json["type"], "ClusterIP");
            assert!(json.get("service_type").is_none());
        }

        #[test]
        fn test_pod_descriptor_omits_missing_node() {
            let pod = PodDescriptor {
                name: "web-0".to_string(),
                namespace: "default".to_string(),
                phase: "Pending".to_string(),
                node: None,
                start_time: None,
            };
            let json = serde_json::to_string(&pod).unwrap();
            assert!(!json.contains("node"));
            assert!(!json.contains("start_time"));
        }

        #[test]
        fn test_event_type_field_renamed() {
            let event = EventDescriptor {
                namespace: "apps".to_string(),
                event_type: Some("Warning".to_string()),
                reason: Some("BackOff".to_string()),
                message: None,
                object: "Pod/web-0".to_string(),
                count: 4,
                last_seen: None,
            };
            let json = serde_json::to_value(&event).unwrap();
            assert_eq!(json["type"], "Warning");
            assert!(json.get("message").is_none());
        }

        #[test]
        fn test_command_response_negative_exit_code() {
            let response = SshCommandResponse {
                stdout: String::new(),
                stderr: String::new(),
                exit_code: -1,
            };
            let json = serde_json::to_string(&response).unwrap();
            let back: SshCommandResponse = serde_json::from_str(&json).unwrap();
            assert_eq!(back.exit_code, -1);
        }
    }
}
