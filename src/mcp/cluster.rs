//! Kubernetes contexts derived from fetched kubeconfig files.
//!
//! A kubeconfig fetched over SSH is validated by [`validate_kubeconfig`], then a
//! [`ClusterConnector`] turns it into a [`ClusterApi`] bound to that file alone.
//! The ambient kubeconfig of the server process is never consulted.

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Event, Namespace, Pod, Service};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::api::{Api, ListParams, LogParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use tracing::debug;

use super::error::TransportError;
use super::types::{
    ContainerDetail, DeploymentDescriptor, EventDescriptor, KubeContextHandle,
    NamespaceDescriptor, PodDescriptor, PodDetail, ServiceDescriptor, ServicePort,
};

/// A kubeconfig that passed validation.
#[derive(Debug, Clone)]
pub struct ValidatedKubeconfig {
    pub kubeconfig: Kubeconfig,
    /// Name of the current context
    pub context: String,
    /// Namespace set on the current context, if any
    pub namespace: Option<String>,
}

/// Parse and validate raw kubeconfig bytes.
///
/// Requires a current context that names an existing context entry and at
/// least one cluster.
pub fn validate_kubeconfig(bytes: &[u8]) -> Result<ValidatedKubeconfig, TransportError> {
    let text = std::str::from_utf8(bytes)
        .map_err(|_| TransportError::Parse("kubeconfig is not valid UTF-8".to_string()))?;

    if text.trim().is_empty() {
        return Err(TransportError::Parse("kubeconfig is empty".to_string()));
    }

    let kubeconfig = Kubeconfig::from_yaml(text)
        .map_err(|e| TransportError::Parse(format!("malformed kubeconfig: {}", e)))?;

    if kubeconfig.clusters.is_empty() {
        return Err(TransportError::Parse(
            "kubeconfig defines no clusters".to_string(),
        ));
    }

    let context = kubeconfig
        .current_context
        .clone()
        .filter(|name| !name.is_empty())
        .ok_or_else(|| TransportError::Parse("kubeconfig has no current-context".to_string()))?;

    let entry = kubeconfig
        .contexts
        .iter()
        .find(|named| named.name == context)
        .ok_or_else(|| {
            TransportError::Parse(format!(
                "current-context {} does not match any context entry",
                context
            ))
        })?;

    let namespace = entry
        .context
        .as_ref()
        .and_then(|ctx| ctx.namespace.clone())
        .filter(|ns| !ns.is_empty());

    Ok(ValidatedKubeconfig {
        kubeconfig,
        context,
        namespace,
    })
}

/// Read access to one cluster.
#[async_trait]
pub trait ClusterApi: Send + Sync {
    async fn list_pods(&self, namespace: &str) -> Result<Vec<PodDescriptor>, TransportError>;

    async fn list_namespaces(&self) -> Result<Vec<NamespaceDescriptor>, TransportError>;

    async fn list_services(&self, namespace: &str)
    -> Result<Vec<ServiceDescriptor>, TransportError>;

    async fn list_deployments(
        &self,
        namespace: &str,
    ) -> Result<Vec<DeploymentDescriptor>, TransportError>;

    async fn pod_logs(
        &self,
        namespace: &str,
        pod: &str,
        container: Option<&str>,
        tail_lines: Option<i64>,
    ) -> Result<String, TransportError>;

    async fn describe_pod(&self, namespace: &str, pod: &str) -> Result<PodDetail, TransportError>;

    /// Events in `namespace`, or in every namespace when `None`, newest first.
    async fn list_events(
        &self,
        namespace: Option<&str>,
        field_selector: Option<&str>,
    ) -> Result<Vec<EventDescriptor>, TransportError>;
}

/// Builds a [`ClusterApi`] from a validated kubeconfig.
#[async_trait]
pub trait ClusterConnector: Send + Sync {
    async fn connect(
        &self,
        kubeconfig: &ValidatedKubeconfig,
    ) -> Result<Box<dyn ClusterApi>, TransportError>;
}

/// Kube context attached to a session.
pub struct KubeContext {
    handle: KubeContextHandle,
    api: Box<dyn ClusterApi>,
}

impl KubeContext {
    pub fn new(handle: KubeContextHandle, api: Box<dyn ClusterApi>) -> Self {
        Self { handle, api }
    }

    pub fn api(&self) -> &dyn ClusterApi {
        self.api.as_ref()
    }

    /// The requested namespace, or the context default when none (or blank) is given.
    pub fn namespace_or_default(&self, namespace: Option<&str>) -> String {
        match namespace.map(str::trim) {
            Some(ns) if !ns.is_empty() => ns.to_string(),
            _ => self.handle.default_namespace.clone(),
        }
    }
}

/// [`ClusterConnector`] backed by the `kube` client.
#[derive(Debug, Default)]
pub struct KubeClusterConnector;

#[async_trait]
impl ClusterConnector for KubeClusterConnector {
    async fn connect(
        &self,
        kubeconfig: &ValidatedKubeconfig,
    ) -> Result<Box<dyn ClusterApi>, TransportError> {
        let options = KubeConfigOptions {
            context: Some(kubeconfig.context.clone()),
            ..Default::default()
        };
        let config = Config::from_custom_kubeconfig(kubeconfig.kubeconfig.clone(), &options)
            .await
            .map_err(|e| TransportError::Parse(format!("unusable kubeconfig: {}", e)))?;
        let client = Client::try_from(config)
            .map_err(|e| TransportError::Parse(format!("failed to build client: {}", e)))?;

        debug!("Built Kubernetes client for context {}", kubeconfig.context);
        Ok(Box::new(KubeClusterApi { client }))
    }
}

/// [`ClusterApi`] over a `kube::Client`.
pub struct KubeClusterApi {
    client: Client,
}

fn api_failure(err: kube::Error) -> TransportError {
    match &err {
        kube::Error::Api(response) if response.code == 401 || response.code == 403 => {
            TransportError::Authz(err.to_string())
        }
        _ => TransportError::Api(err.to_string()),
    }
}

pub(crate) fn pod_descriptor(pod: Pod) -> PodDescriptor {
    let phase = pod
        .status
        .as_ref()
        .and_then(|s| s.phase.clone())
        .unwrap_or_else(|| "Unknown".to_string());
    let start_time = pod
        .status
        .as_ref()
        .and_then(|s| s.start_time.as_ref())
        .map(|t| t.0.to_string());

    PodDescriptor {
        name: pod.metadata.name.unwrap_or_default(),
        namespace: pod.metadata.namespace.unwrap_or_default(),
        phase,
        node: pod.spec.and_then(|s| s.node_name),
        start_time,
    }
}

pub(crate) fn pod_detail(pod: Pod) -> PodDetail {
    let status = pod.status.unwrap_or_default();
    let spec = pod.spec.unwrap_or_default();
    let statuses = status.container_statuses.unwrap_or_default();

    let containers = spec
        .containers
        .into_iter()
        .map(|c| {
            let ready = statuses
                .iter()
                .find(|s| s.name == c.name)
                .is_some_and(|s| s.ready);
            ContainerDetail {
                name: c.name,
                image: c.image,
                ready,
            }
        })
        .collect();

    PodDetail {
        name: pod.metadata.name.unwrap_or_default(),
        namespace: pod.metadata.namespace.unwrap_or_default(),
        phase: status.phase.unwrap_or_else(|| "Unknown".to_string()),
        node: spec.node_name,
        created: pod.metadata.creation_timestamp.map(|t| t.0.to_string()),
        labels: pod.metadata.labels.unwrap_or_default(),
        annotations: pod.metadata.annotations.unwrap_or_default(),
        containers,
    }
}

/// Field selector matching events about one kind and/or name of object.
pub(crate) fn involved_object_selector(kind: Option<&str>, name: Option<&str>) -> Option<String> {
    let parts: Vec<String> = [("kind", kind), ("name", name)]
        .into_iter()
        .filter_map(|(field, value)| value.map(|v| format!("involvedObject.{}={}", field, v)))
        .collect();
    (!parts.is_empty()).then(|| parts.join(","))
}

/// Map events newest first. Events with no timestamp sort last.
pub(crate) fn event_descriptors(mut events: Vec<Event>) -> Vec<EventDescriptor> {
    events.sort_by(|a, b| b.last_timestamp.cmp(&a.last_timestamp));
    events
        .into_iter()
        .map(|event| {
            let object = format!(
                "{}/{}",
                event.involved_object.kind.unwrap_or_default(),
                event.involved_object.name.unwrap_or_default()
            );
            EventDescriptor {
                namespace: event.metadata.namespace.unwrap_or_default(),
                event_type: event.type_,
                reason: event.reason,
                message: event.message,
                object,
                count: event.count.unwrap_or(1),
                last_seen: event.last_timestamp.map(|t| t.0.to_string()),
            }
        })
        .collect()
}

pub(crate) fn namespace_descriptor(ns: Namespace) -> NamespaceDescriptor {
    NamespaceDescriptor {
        name: ns.metadata.name.unwrap_or_default(),
        phase: ns
            .status
            .and_then(|s| s.phase)
            .unwrap_or_else(|| "Unknown".to_string()),
        created: ns.metadata.creation_timestamp.map(|t| t.0.to_string()),
    }
}

pub(crate) fn service_descriptor(svc: Service) -> ServiceDescriptor {
    let spec = svc.spec.unwrap_or_default();
    let ports = spec
        .ports
        .unwrap_or_default()
        .into_iter()
        .map(|p| ServicePort {
            port: p.port,
            target_port: p.target_port.map(|t| match t {
                IntOrString::Int(n) => n.to_string(),
                IntOrString::String(s) => s,
            }),
            protocol: p.protocol,
        })
        .collect();

    ServiceDescriptor {
        name: svc.metadata.name.unwrap_or_default(),
        service_type: spec.type_,
        cluster_ip: spec.cluster_ip,
        ports,
    }
}

pub(crate) fn deployment_descriptor(deploy: Deployment) -> DeploymentDescriptor {
    let spec = deploy.spec.unwrap_or_default();
    let status = deploy.status.unwrap_or_default();
    let image = spec
        .template
        .spec
        .as_ref()
        .and_then(|s| s.containers.first())
        .and_then(|c| c.image.clone());

    DeploymentDescriptor {
        name: deploy.metadata.name.unwrap_or_default(),
        replicas: spec.replicas.unwrap_or(0),
        ready_replicas: status.ready_replicas.unwrap_or(0),
        available_replicas: status.available_replicas.unwrap_or(0),
        updated_replicas: status.updated_replicas.unwrap_or(0),
        image,
    }
}

#[async_trait]
impl ClusterApi for KubeClusterApi {
    async fn list_pods(&self, namespace: &str) -> Result<Vec<PodDescriptor>, TransportError> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let list = pods.list(&ListParams::default()).await.map_err(api_failure)?;
        Ok(list.items.into_iter().map(pod_descriptor).collect())
    }

    async fn list_namespaces(&self) -> Result<Vec<NamespaceDescriptor>, TransportError> {
        let namespaces: Api<Namespace> = Api::all(self.client.clone());
        let list = namespaces
            .list(&ListParams::default())
            .await
            .map_err(api_failure)?;
        Ok(list.items.into_iter().map(namespace_descriptor).collect())
    }

    async fn list_services(
        &self,
        namespace: &str,
    ) -> Result<Vec<ServiceDescriptor>, TransportError> {
        let services: Api<Service> = Api::namespaced(self.client.clone(), namespace);
        let list = services
            .list(&ListParams::default())
            .await
            .map_err(api_failure)?;
        Ok(list.items.into_iter().map(service_descriptor).collect())
    }

    async fn list_deployments(
        &self,
        namespace: &str,
    ) -> Result<Vec<DeploymentDescriptor>, TransportError> {
        let deployments: Api<Deployment> = Api::namespaced(self.client.clone(), namespace);
        let list = deployments
            .list(&ListParams::default())
            .await
            .map_err(api_failure)?;
        Ok(list.items.into_iter().map(deployment_descriptor).collect())
    }

    async fn pod_logs(
        &self,
        namespace: &str,
        pod: &str,
        container: Option<&str>,
        tail_lines: Option<i64>,
    ) -> Result<String, TransportError> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let params = LogParams {
            container: container.map(str::to_string),
            tail_lines,
            ..Default::default()
        };
        pods.logs(pod, &params).await.map_err(api_failure)
    }

    async fn describe_pod(&self, namespace: &str, pod: &str) -> Result<PodDetail, TransportError> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let found = pods.get(pod).await.map_err(api_failure)?;
        Ok(pod_detail(found))
    }

    async fn list_events(
        &self,
        namespace: Option<&str>,
        field_selector: Option<&str>,
    ) -> Result<Vec<EventDescriptor>, TransportError> {
        let events: Api<Event> = match namespace {
            Some(ns) => Api::namespaced(self.client.clone(), ns),
            None => Api::all(self.client.clone()),
        };
        let mut params = ListParams::default();
        if let Some(selector) = field_selector {
            params = params.fields(selector);
        }
        let list = events.list(&params).await.map_err(api_failure)?;
        Ok(event_descriptors(list.items))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use k8s_openapi::api::apps::v1::{DeploymentSpec, DeploymentStatus};
    use k8s_openapi::api::core::v1::{
        Container, ContainerStatus, NamespaceStatus, PodSpec, PodStatus, PodTemplateSpec,
        ServiceSpec,
    };
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    pub(crate) const SAMPLE_KUBECONFIG: &str = r#"apiVersion: v1
kind: Config
current-context: prod
clusters:
- name: prod-cluster
  cluster:
    server: https://10.0.0.1:6443
contexts:
- name: prod
  context:
    cluster: prod-cluster
    user: admin
    namespace: apps
- name: staging
  context:
    cluster: prod-cluster
    user: admin
users:
- name: admin
  user:
    token: not-a-real-token
"#;

    fn meta(name: &str) -> ObjectMeta {
        ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some("apps".to_string()),
            ..Default::default()
        }
    }

    mod validation {
        use super::*;
        use crate::mcp::error::ErrorKind;

        fn parse_error(yaml: &str) -> String {
            let err = validate_kubeconfig(yaml.as_bytes()).unwrap_err();
            assert_eq!(ErrorKind::from(&err), ErrorKind::ParseError);
            err.to_string()
        }

        #[test]
        fn test_valid_kubeconfig() {
            let validated = validate_kubeconfig(SAMPLE_KUBECONFIG.as_bytes()).unwrap();
            assert_eq!(validated.context, "prod");
            assert_eq!(validated.namespace.as_deref(), Some("apps"));
            assert_eq!(validated.kubeconfig.clusters.len(), 1);
        }

        #[test]
        fn test_context_without_namespace() {
            let yaml = SAMPLE_KUBECONFIG.replace("current-context: prod", "current-context: staging");
            let validated = validate_kubeconfig(yaml.as_bytes()).unwrap();
            assert_eq!(validated.context, "staging");
            assert!(validated.namespace.is_none());
        }

        #[test]
        fn test_empty_file() {
            assert!(parse_error("   \n").contains("empty"));
        }

        #[test]
        fn test_not_yaml() {
            parse_error("{{{ this is not a kubeconfig");
        }

        #[test]
        fn test_invalid_utf8() {
            let err = validate_kubeconfig(&[0xff, 0xfe, 0x00]).unwrap_err();
            assert!(matches!(err, TransportError::Parse(_)));
        }

        #[test]
        fn test_missing_current_context() {
            let yaml = SAMPLE_KUBECONFIG.replace("current-context: prod\n", "");
            assert!(parse_error(&yaml).contains("current-context"));
        }

        #[test]
        fn test_current_context_not_defined() {
            let yaml = SAMPLE_KUBECONFIG.replace("current-context: prod", "current-context: dev");
            assert!(parse_error(&yaml).contains("dev"));
        }

        #[test]
        fn test_no_clusters() {
            let yaml = r#"apiVersion: v1
kind: Config
current-context: prod
clusters: []
contexts:
- name: prod
  context:
    cluster: prod-cluster
"#;
            assert!(parse_error(yaml).contains("no clusters"));
        }
    }

    mod descriptors {
        use super::*;

        #[test]
        fn test_pod_descriptor() {
            let pod = Pod {
                metadata: meta("web-0"),
                spec: Some(PodSpec {
                    node_name: Some("node-a".to_string()),
                    ..Default::default()
                }),
                status: Some(PodStatus {
                    phase: Some("Running".to_string()),
                    ..Default::default()
                }),
            };
            let descriptor = pod_descriptor(pod);
            assert_eq!(descriptor.name, "web-0");
            assert_eq!(descriptor.namespace, "apps");
            assert_eq!(descriptor.phase, "Running");
            assert_eq!(descriptor.node.as_deref(), Some("node-a"));
            assert!(descriptor.start_time.is_none());
        }

        #[test]
        fn test_pod_without_status_is_unknown() {
            let pod = Pod {
                metadata: meta("pending-0"),
                ..Default::default()
            };
            let descriptor = pod_descriptor(pod);
            assert_eq!(descriptor.phase, "Unknown");
            assert!(descriptor.node.is_none());
        }

        #[test]
        fn test_pod_detail_matches_container_readiness() {
            let mut metadata = meta("web-0");
            metadata.labels = Some([("app".to_string(), "web".to_string())].into());
            let pod = Pod {
                metadata,
                spec: Some(PodSpec {
                    node_name: Some("node-b".to_string()),
                    containers: vec![
                        Container {
                            name: "web".to_string(),
                            image: Some("nginx:1.27".to_string()),
                            ..Default::default()
                        },
                        Container {
                            name: "sidecar".to_string(),
                            image: Some("envoy:1.30".to_string()),
                            ..Default::default()
                        },
                    ],
                    ..Default::default()
                }),
                status: Some(PodStatus {
                    phase: Some("Running".to_string()),
                    container_statuses: Some(vec![ContainerStatus {
                        name: "web".to_string(),
                        ready: true,
                        ..Default::default()
                    }]),
                    ..Default::default()
                }),
            };

            let detail = pod_detail(pod);
            assert_eq!(detail.namespace, "apps");
            assert_eq!(detail.node.as_deref(), Some("node-b"));
            assert_eq!(detail.labels.get("app").map(String::as_str), Some("web"));
            assert!(detail.annotations.is_empty());
            assert_eq!(detail.containers.len(), 2);
            assert!(detail.containers[0].ready);
            // No status reported for the sidecar yet
            assert!(!detail.containers[1].ready);
            assert_eq!(detail.containers[1].image.as_deref(), Some("envoy:1.30"));
        }

        #[test]
        fn test_pod_detail_without_spec() {
            let detail = pod_detail(Pod {
                metadata: meta("ghost"),
                ..Default::default()
            });
            assert_eq!(detail.phase, "Unknown");
            assert!(detail.containers.is_empty());
            assert!(detail.created.is_none());
        }

        fn event(name: &str, last: Option<&str>) -> Event {
            let mut value = serde_json::json!({
                "metadata": { "name": name, "namespace": "apps" },
                "involvedObject": { "kind": "Pod", "name": "web-0" },
                "type": "Warning",
                "reason": "BackOff",
            });
            if let Some(ts) = last {
                value["lastTimestamp"] = serde_json::Value::from(ts);
            }
            serde_json::from_value(value).unwrap()
        }

        #[test]
        fn test_events_newest_first() {
            let events = event_descriptors(vec![
                event("older", Some("2024-01-15T10:00:00Z")),
                event("undated", None),
                event("newer", Some("2024-01-15T11:30:00Z")),
            ]);

            let seen: Vec<_> = events.iter().map(|e| e.last_seen.is_some()).collect();
            assert_eq!(seen, vec![true, true, false]);
            assert!(events[0].last_seen.as_deref().unwrap().starts_with("2024-01-15T11:30"));
            assert!(events[1].last_seen.as_deref().unwrap().starts_with("2024-01-15T10:00"));
            assert_eq!(events[0].object, "Pod/web-0");
            assert_eq!(events[0].count, 1);
            assert_eq!(events[0].event_type.as_deref(), Some("Warning"));
        }

        #[test]
        fn test_involved_object_selector() {
            assert_eq!(involved_object_selector(None, None), None);
            assert_eq!(
                involved_object_selector(Some("Pod"), Some("web-0")).as_deref(),
                Some("involvedObject.kind=Pod,involvedObject.name=web-0")
            );
            assert_eq!(
                involved_object_selector(None, Some("api")).as_deref(),
                Some("involvedObject.name=api")
            );
        }

        #[test]
        fn test_namespace_descriptor() {
            let ns = Namespace {
                metadata: meta("apps"),
                status: Some(NamespaceStatus {
                    phase: Some("Active".to_string()),
                    ..Default::default()
                }),
                ..Default::default()
            };
            let descriptor = namespace_descriptor(ns);
            assert_eq!(descriptor.name, "apps");
            assert_eq!(descriptor.phase, "Active");
        }

        #[test]
        fn test_service_descriptor_ports() {
            let svc = Service {
                metadata: meta("web"),
                spec: Some(ServiceSpec {
                    type_: Some("ClusterIP".to_string()),
                    cluster_ip: Some("10.96.0.10".to_string()),
                    ports: Some(vec![
                        k8s_openapi::api::core::v1::ServicePort {
                            port: 80,
                            target_port: Some(IntOrString::Int(8080)),
                            protocol: Some("TCP".to_string()),
                            ..Default::default()
                        },
                        k8s_openapi::api::core::v1::ServicePort {
                            port: 443,
                            target_port: Some(IntOrString::String("https".to_string())),
                            ..Default::default()
                        },
                    ]),
                    ..Default::default()
                }),
                ..Default::default()
            };
            let descriptor = service_descriptor(svc);
            assert_eq!(descriptor.service_type.as_deref(), Some("ClusterIP"));
            assert_eq!(descriptor.ports.len(), 2);
            assert_eq!(descriptor.ports[0].target_port.as_deref(), Some("8080"));
            assert_eq!(descriptor.ports[1].target_port.as_deref(), Some("https"));
        }

        #[test]
        fn test_deployment_descriptor() {
            let deploy = Deployment {
                metadata: meta("api"),
                spec: Some(DeploymentSpec {
                    replicas: Some(3),
                    template: PodTemplateSpec {
                        spec: Some(PodSpec {
                            containers: vec![Container {
                                name: "api".to_string(),
                                image: Some("registry.local/api:1.4".to_string()),
                                ..Default::default()
                            }],
                            ..Default::default()
                        }),
                        ..Default::default()
                    },
                    ..Default::default()
                }),
                status: Some(DeploymentStatus {
                    ready_replicas: Some(2),
                    available_replicas: Some(2),
                    updated_replicas: Some(3),
                    ..Default::default()
                }),
            };
            let descriptor = deployment_descriptor(deploy);
            assert_eq!(descriptor.replicas, 3);
            assert_eq!(descriptor.ready_replicas, 2);
            assert_eq!(descriptor.updated_replicas, 3);
            assert_eq!(descriptor.image.as_deref(), Some("registry.local/api:1.4"));
        }

        #[test]
        fn test_deployment_without_status() {
            let deploy = Deployment {
                metadata: meta("idle"),
                ..Default::default()
            };
            let descriptor = deployment_descriptor(deploy);
            assert_eq!(descriptor.replicas, 0);
            assert_eq!(descriptor.available_replicas, 0);
            assert!(descriptor.image.is_none());
        }
    }
}
