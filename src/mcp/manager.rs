//! Session manager for SSH sessions and the Kubernetes contexts derived from them.
//!
//! # Lifecycle
//!
//! ```text
//! open ──> Connecting ──> Active ──(transport lost)──> Failed
//!              │            │                            │
//!              │            └──────────> Closing <───────┘
//!              │                            │
//!              └──(connect error: removed)  └──> Closed (tombstone) ──> purged
//! ```
//!
//! A session stuck in Connecting past its connect timeout is closed by the
//! reaper like an idle one.
//!
//! A closed session stays in the registry as a tombstone so that operations on it
//! report `NotActive`. A second `close`, or the reaper's next sweep, purges it;
//! from then on the id is unknown and every call reports `NotFound`.
//!
//! # Concurrency
//!
//! Each session serializes its operations through a fair async mutex around its
//! resources. `close` fires the session's cancellation token before taking that
//! mutex, so an in-flight operation either finishes or returns `Cancelled`, and
//! the teardown runs exactly once. Teardown runs in its own task so a caller
//! that gives up waiting cannot leave a session half closed.
//!
//! # Capacity
//!
//! One unit of capacity is reserved before connecting and given back when the
//! session fails or closes. `open` never queues: with the ceiling reached it
//! fails immediately.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use tokio::sync::OwnedMutexGuard;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::client::SshConnector;
use super::cluster::{
    ClusterConnector, KubeClusterConnector, KubeContext, involved_object_selector,
    validate_kubeconfig,
};
use super::config::{ManagerConfig, resolve_compression};
use super::credentials::{Credential, CredentialStore, Secret};
use super::error::{Operation, SessionError, TransportError};
use super::storage::{
    CloseStart, DashMapSessionStorage, SessionSlot, SessionStorage, SlotMeta, SlotResources,
};
use super::transport::{ConnectRequest, Connector, RemoteShell};
use super::types::{
    DeploymentListResponse, EventListResponse, HealthResponse, KubeContextHandle,
    NamespaceDescriptor, PodDetailResponse, PodListResponse, PodLogsResponse,
    ServiceListResponse, SessionInfo, SessionState, SshCommandResponse,
};

/// Parameters for [`SessionManager::open`].
#[derive(Debug, Clone)]
pub struct OpenRequest {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub credential: Credential,
    /// Optional human-readable label
    pub name: Option<String>,
    /// Overrides the configured connect timeout
    pub connect_timeout: Option<Duration>,
}

struct Inner {
    config: ManagerConfig,
    connector: Arc<dyn Connector>,
    clusters: Arc<dyn ClusterConnector>,
    sessions: Box<dyn SessionStorage>,
    credentials: CredentialStore,
    /// Capacity units held by Connecting and Active sessions
    occupied: AtomicUsize,
    /// Transports currently open
    live_connections: AtomicUsize,
    shutdown: CancellationToken,
}

/// Owns every session. Cheap to clone; clones share the same registry.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Inner>,
}

impl SessionManager {
    pub fn new(
        config: ManagerConfig,
        connector: Arc<dyn Connector>,
        clusters: Arc<dyn ClusterConnector>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                connector,
                clusters,
                sessions: Box::new(DashMapSessionStorage::new()),
                credentials: CredentialStore::new(),
                occupied: AtomicUsize::new(0),
                live_connections: AtomicUsize::new(0),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    /// Manager wired to russh and the `kube` client.
    pub fn with_defaults(config: ManagerConfig, compress: bool) -> Self {
        Self::new(
            config,
            Arc::new(SshConnector::new(compress)),
            Arc::new(KubeClusterConnector),
        )
    }

    /// Manager configured from the environment.
    pub fn from_env() -> Self {
        Self::with_defaults(ManagerConfig::from_env(), resolve_compression(None))
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.inner.config
    }

    /// Number of open transports.
    pub fn live_connections(&self) -> usize {
        self.inner.live_connections.load(Ordering::SeqCst)
    }

    /// Capacity units currently held.
    pub fn occupied(&self) -> usize {
        self.inner.occupied.load(Ordering::SeqCst)
    }

    pub fn is_healthy(&self) -> bool {
        !self.inner.shutdown.is_cancelled()
    }

    pub fn health(&self) -> HealthResponse {
        HealthResponse {
            healthy: self.is_healthy(),
            active_sessions: self.live_connections(),
            max_sessions: self.inner.config.max_sessions,
        }
    }

    /// Descriptors of every known session, oldest first.
    pub fn list_sessions(&self) -> Vec<SessionInfo> {
        let mut sessions: Vec<SessionInfo> = self
            .inner
            .sessions
            .list()
            .iter()
            .map(|slot| slot.info())
            .collect();
        sessions.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.session_id.cmp(&b.session_id))
        });
        sessions
    }

    /// Descriptor of one session.
    pub fn session_info(&self, session_id: &str) -> Result<SessionInfo, SessionError> {
        self.slot(session_id).map(|slot| slot.info())
    }

    fn slot(&self, session_id: &str) -> Result<Arc<SessionSlot>, SessionError> {
        self.inner
            .sessions
            .get(session_id)
            .ok_or_else(|| SessionError::NotFound {
                session_id: session_id.to_string(),
            })
    }

    fn reserve_capacity(&self) -> Result<(), SessionError> {
        let limit = self.inner.config.max_sessions;
        self.inner
            .occupied
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |held| {
                (held < limit).then_some(held + 1)
            })
            .map(|_| ())
            .map_err(|_| SessionError::Capacity { limit })
    }

    fn release_capacity(&self, slot: &SessionSlot) {
        if slot.release_capacity() {
            self.inner.occupied.fetch_sub(1, Ordering::SeqCst);
        }
    }

    /// Open an authenticated SSH session.
    ///
    /// The handshake runs in a task the manager owns. A caller that stops
    /// waiting leaves a Connecting session behind; the reaper closes it once
    /// its connect timeout has passed.
    pub async fn open(&self, request: OpenRequest) -> Result<SessionInfo, SessionError> {
        self.reserve_capacity()?;

        let session_id = Uuid::new_v4().to_string();
        let connect_timeout = request
            .connect_timeout
            .unwrap_or(self.inner.config.connect_timeout);

        let slot = Arc::new(SessionSlot::new(
            session_id.clone(),
            SlotMeta {
                name: request.name.clone(),
                host: request.host.clone(),
                port: request.port,
                username: request.username.clone(),
                auth_method: request.credential.method(),
                created_at: Utc::now(),
                connect_timeout,
            },
        ));

        self.inner
            .credentials
            .put(&session_id, request.credential.clone());
        self.inner.sessions.insert(Arc::clone(&slot));

        info!(
            "Opening session {} to {}@{}:{} ({} auth)",
            session_id,
            request.username,
            request.host,
            request.port,
            request.credential.method()
        );

        let connect = ConnectRequest {
            host: request.host,
            port: request.port,
            username: request.username,
            credential: request.credential,
            timeout: connect_timeout,
        };

        let manager = self.clone();
        let owned = Arc::clone(&slot);
        let handshake = tokio::spawn(async move { manager.establish(&owned, connect).await });

        match handshake.await {
            Ok(result) => result,
            Err(e) => {
                error!("Handshake task of session {} aborted: {}", session_id, e);
                self.discard_failed_open(&slot);
                Err(SessionError::Cancelled {
                    session_id,
                    operation: Operation::Open,
                })
            }
        }
    }

    /// Connect and authenticate a Connecting slot, holding its lock throughout.
    async fn establish(
        &self,
        slot: &Arc<SessionSlot>,
        connect: ConnectRequest,
    ) -> Result<SessionInfo, SessionError> {
        let session_id = slot.id().to_string();
        let resources = slot.resources();
        let mut guard = resources.lock().await;

        let outcome = tokio::select! {
            biased;
            _ = slot.cancel_token().cancelled() => None,
            result = self.inner.connector.connect(&connect) => Some(result),
        };

        match outcome {
            Some(Ok(shell)) => {
                if slot
                    .transition(&[SessionState::Connecting], SessionState::Active)
                    .is_err()
                {
                    // Closed while authenticating; the closer owns the teardown.
                    shell.close().await;
                    return Err(SessionError::Cancelled {
                        session_id,
                        operation: Operation::Open,
                    });
                }
                debug!(
                    "Session {} authenticated via {}",
                    session_id,
                    shell.auth_method()
                );
                guard.shell = Some(shell);
                self.inner.live_connections.fetch_add(1, Ordering::SeqCst);
                drop(guard);

                slot.touch();
                info!("Session {} is active", session_id);
                Ok(slot.info())
            }
            Some(Err(err)) => {
                drop(guard);
                warn!("Session {} failed to open: {}", session_id, err);
                self.discard_failed_open(slot);
                Err(SessionError::transport(session_id, Operation::Open, err))
            }
            None => Err(SessionError::Cancelled {
                session_id,
                operation: Operation::Open,
            }),
        }
    }

    /// Remove every trace of a session whose connect attempt failed.
    fn discard_failed_open(&self, slot: &Arc<SessionSlot>) {
        if slot
            .transition(&[SessionState::Connecting], SessionState::Failed)
            .is_err()
        {
            return;
        }
        self.inner.credentials.scrub(slot.id());
        self.release_capacity(slot);
        slot.mark_closed();
        self.inner.sessions.remove_slot(slot);
        debug!("Discarded failed session {}", slot.id());
    }

    /// Look up an Active session and take its lock.
    async fn acquire(
        &self,
        session_id: &str,
        operation: Operation,
    ) -> Result<(Arc<SessionSlot>, OwnedMutexGuard<SlotResources>), SessionError> {
        let slot = self.slot(session_id)?;
        slot.ensure_active()?;

        let resources = slot.resources();
        let guard = tokio::select! {
            biased;
            _ = slot.cancel_token().cancelled() => {
                return Err(SessionError::Cancelled {
                    session_id: session_id.to_string(),
                    operation,
                });
            }
            guard = resources.lock_owned() => guard,
        };

        // State may have changed while queued for the lock.
        slot.ensure_active()?;
        slot.touch();
        Ok((slot, guard))
    }

    fn shell<'g>(
        slot: &SessionSlot,
        resources: &'g SlotResources,
    ) -> Result<&'g dyn RemoteShell, SessionError> {
        resources
            .shell
            .as_deref()
            .ok_or_else(|| SessionError::NotActive {
                session_id: slot.id().to_string(),
                state: slot.state(),
            })
    }

    fn kube<'g>(
        slot: &SessionSlot,
        resources: &'g SlotResources,
    ) -> Result<&'g KubeContext, SessionError> {
        resources
            .kube
            .as_ref()
            .ok_or_else(|| SessionError::NoKubeContext {
                session_id: slot.id().to_string(),
            })
    }

    /// Drive one collaborator call, racing it against the session's cancellation.
    async fn guarded<T>(
        &self,
        slot: &SessionSlot,
        operation: Operation,
        work: impl Future<Output = Result<T, TransportError>>,
    ) -> Result<T, SessionError> {
        let result = tokio::select! {
            biased;
            _ = slot.cancel_token().cancelled() => {
                return Err(SessionError::Cancelled {
                    session_id: slot.id().to_string(),
                    operation,
                });
            }
            result = work => result,
        };

        match result {
            Ok(value) => {
                slot.touch();
                Ok(value)
            }
            Err(err) => Err(self.transport_failure(slot, operation, err)),
        }
    }

    fn transport_failure(
        &self,
        slot: &SessionSlot,
        operation: Operation,
        err: TransportError,
    ) -> SessionError {
        if matches!(err, TransportError::Disconnected(_)) {
            if slot
                .transition(&[SessionState::Active], SessionState::Failed)
                .is_ok()
            {
                self.release_capacity(slot);
                error!(
                    "Session {} failed during {}: {}",
                    slot.id(),
                    operation,
                    err
                );
            }
        } else {
            slot.touch();
            warn!("{} on session {} failed: {}", operation, slot.id(), err);
        }
        SessionError::transport(slot.id(), operation, err)
    }

    /// Run a shell command on a session.
    ///
    /// `timeout` defaults to the configured command timeout. A timeout leaves
    /// the session Active.
    pub async fn run(
        &self,
        session_id: &str,
        command: &str,
        timeout: Option<Duration>,
    ) -> Result<SshCommandResponse, SessionError> {
        let operation = Operation::Run;
        let (slot, guard) = self.acquire(session_id, operation).await?;
        let shell = Self::shell(&slot, &guard)?;
        let timeout = timeout.unwrap_or(self.inner.config.command_timeout);

        debug!("Running command on session {}: {}", session_id, command);
        self.guarded(&slot, operation, shell.exec(command, timeout))
            .await
    }

    /// Fetch a kubeconfig from the remote host and attach a kube context built
    /// from it, replacing any previous one.
    pub async fn fetch_kubeconfig(
        &self,
        session_id: &str,
        remote_path: &str,
    ) -> Result<KubeContextHandle, SessionError> {
        let operation = Operation::FetchKubeconfig;
        let (slot, mut guard) = self.acquire(session_id, operation).await?;

        let bytes = {
            let shell = Self::shell(&slot, &guard)?;
            self.guarded(
                &slot,
                operation,
                shell.fetch_file(remote_path, self.inner.config.command_timeout),
            )
            .await?
        };

        let validated = validate_kubeconfig(&bytes)
            .map_err(|err| SessionError::transport(session_id, operation, err))?;

        let api = self
            .guarded(&slot, operation, self.inner.clusters.connect(&validated))
            .await?;

        let handle = KubeContextHandle {
            handle: Uuid::new_v4().to_string(),
            session_id: session_id.to_string(),
            context: validated.context.clone(),
            default_namespace: validated
                .namespace
                .clone()
                .unwrap_or_else(|| self.inner.config.default_namespace.clone()),
            source_path: remote_path.to_string(),
            fetched_at: Utc::now().to_rfc3339(),
        };

        self.inner
            .credentials
            .attach_kubeconfig(session_id, Secret::new(bytes))?;
        guard.kube = Some(KubeContext::new(handle.clone(), api));
        slot.set_kube_handle(Some(handle.clone()));

        info!(
            "Session {} attached kube context {} (namespace {})",
            session_id, handle.context, handle.default_namespace
        );
        Ok(handle)
    }

    /// Pods in `namespace` (or the context default), ordered by name.
    pub async fn list_pods(
        &self,
        session_id: &str,
        namespace: Option<&str>,
    ) -> Result<PodListResponse, SessionError> {
        let operation = Operation::ListPods;
        let (slot, guard) = self.acquire(session_id, operation).await?;
        let kube = Self::kube(&slot, &guard)?;
        let namespace = kube.namespace_or_default(namespace);

        let mut pods = self
            .guarded(&slot, operation, kube.api().list_pods(&namespace))
            .await?;
        pods.sort_by(|a, b| a.name.cmp(&b.name));

        Ok(PodListResponse {
            session_id: session_id.to_string(),
            namespace,
            count: pods.len(),
            pods,
        })
    }

    pub async fn list_namespaces(
        &self,
        session_id: &str,
    ) -> Result<Vec<NamespaceDescriptor>, SessionError> {
        let operation = Operation::ListNamespaces;
        let (slot, guard) = self.acquire(session_id, operation).await?;
        let kube = Self::kube(&slot, &guard)?;

        let mut namespaces = self
            .guarded(&slot, operation, kube.api().list_namespaces())
            .await?;
        namespaces.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(namespaces)
    }

    pub async fn list_services(
        &self,
        session_id: &str,
        namespace: Option<&str>,
    ) -> Result<ServiceListResponse, SessionError> {
        let operation = Operation::ListServices;
        let (slot, guard) = self.acquire(session_id, operation).await?;
        let kube = Self::kube(&slot, &guard)?;
        let namespace = kube.namespace_or_default(namespace);

        let mut services = self
            .guarded(&slot, operation, kube.api().list_services(&namespace))
            .await?;
        services.sort_by(|a, b| a.name.cmp(&b.name));

        Ok(ServiceListResponse {
            session_id: session_id.to_string(),
            namespace,
            services,
        })
    }

    pub async fn list_deployments(
        &self,
        session_id: &str,
        namespace: Option<&str>,
    ) -> Result<DeploymentListResponse, SessionError> {
        let operation = Operation::ListDeployments;
        let (slot, guard) = self.acquire(session_id, operation).await?;
        let kube = Self::kube(&slot, &guard)?;
        let namespace = kube.namespace_or_default(namespace);

        let mut deployments = self
            .guarded(&slot, operation, kube.api().list_deployments(&namespace))
            .await?;
        deployments.sort_by(|a, b| a.name.cmp(&b.name));

        Ok(DeploymentListResponse {
            session_id: session_id.to_string(),
            namespace,
            deployments,
        })
    }

    pub async fn pod_logs(
        &self,
        session_id: &str,
        pod: &str,
        namespace: Option<&str>,
        container: Option<&str>,
        tail_lines: Option<i64>,
    ) -> Result<PodLogsResponse, SessionError> {
        let operation = Operation::PodLogs;
        let (slot, guard) = self.acquire(session_id, operation).await?;
        let kube = Self::kube(&slot, &guard)?;
        let namespace = kube.namespace_or_default(namespace);

        let logs = self
            .guarded(
                &slot,
                operation,
                kube.api().pod_logs(&namespace, pod, container, tail_lines),
            )
            .await?;

        Ok(PodLogsResponse {
            session_id: session_id.to_string(),
            namespace,
            pod: pod.to_string(),
            logs,
        })
    }

    pub async fn describe_pod(
        &self,
        session_id: &str,
        pod: &str,
        namespace: Option<&str>,
    ) -> Result<PodDetailResponse, SessionError> {
        let operation = Operation::DescribePod;
        let (slot, guard) = self.acquire(session_id, operation).await?;
        let kube = Self::kube(&slot, &guard)?;
        let namespace = kube.namespace_or_default(namespace);

        let pod = self
            .guarded(&slot, operation, kube.api().describe_pod(&namespace, pod))
            .await?;

        Ok(PodDetailResponse {
            session_id: session_id.to_string(),
            pod,
        })
    }

    /// Cluster events, newest first.
    ///
    /// `all_namespaces` ignores `namespace`. `kind` and `name` narrow the
    /// events to one involved object.
    pub async fn list_events(
        &self,
        session_id: &str,
        namespace: Option<&str>,
        all_namespaces: bool,
        kind: Option<&str>,
        name: Option<&str>,
    ) -> Result<EventListResponse, SessionError> {
        let operation = Operation::ListEvents;
        let (slot, guard) = self.acquire(session_id, operation).await?;
        let kube = Self::kube(&slot, &guard)?;
        let namespace = (!all_namespaces).then(|| kube.namespace_or_default(namespace));
        let selector = involved_object_selector(kind, name);

        let events = self
            .guarded(
                &slot,
                operation,
                kube.api()
                    .list_events(namespace.as_deref(), selector.as_deref()),
            )
            .await?;

        Ok(EventListResponse {
            session_id: session_id.to_string(),
            namespace,
            events,
        })
    }

    /// Close a session, releasing its transport, kube context and credentials.
    ///
    /// Closing a session that is already closed purges its tombstone.
    pub async fn close(&self, session_id: &str) -> Result<(), SessionError> {
        let slot = self.slot(session_id)?;

        match slot.begin_close() {
            CloseStart::Owner => {
                let manager = self.clone();
                let owned = Arc::clone(&slot);
                let teardown = tokio::spawn(async move { manager.teardown(&owned).await });
                if let Err(e) = teardown.await {
                    error!("Teardown of session {} aborted: {}", session_id, e);
                    self.release_capacity(&slot);
                    slot.mark_closed();
                }
            }
            CloseStart::InProgress => {
                debug!("Session {} is already closing, waiting", session_id);
                slot.wait_closed().await;
            }
            CloseStart::AlreadyClosed => {
                if self.inner.sessions.remove_slot(&slot) {
                    debug!("Purged closed session {}", session_id);
                }
            }
        }
        Ok(())
    }

    async fn teardown(&self, slot: &SessionSlot) {
        slot.cancel();

        let resources = slot.resources();
        let mut guard = resources.lock().await;
        let shell = guard.shell.take();
        let kube = guard.kube.take();
        drop(guard);
        drop(kube);

        if let Some(shell) = shell {
            let grace = self.inner.config.connect_timeout;
            if tokio::time::timeout(grace, shell.close()).await.is_err() {
                warn!(
                    "Transport of session {} did not close within {:?}; dropping it",
                    slot.id(),
                    grace
                );
            }
            self.inner.live_connections.fetch_sub(1, Ordering::SeqCst);
        }

        self.inner.credentials.scrub(slot.id());
        slot.set_kube_handle(None);
        self.release_capacity(slot);
        slot.mark_closed();
        info!("Session {} closed", slot.id());
    }

    /// Mark an Active session Failed if its transport died without anyone noticing.
    fn check_transport(&self, slot: &SessionSlot) {
        let resources = slot.resources();
        let Ok(guard) = resources.try_lock() else {
            return;
        };
        let lost = guard.shell.as_ref().is_some_and(|shell| shell.is_closed());
        drop(guard);

        if lost
            && slot
                .transition(&[SessionState::Active], SessionState::Failed)
                .is_ok()
        {
            self.release_capacity(slot);
            warn!("Session {} lost its transport", slot.id());
        }
    }

    /// Whether an operation currently holds the session lock.
    fn is_busy(slot: &SessionSlot) -> bool {
        slot.resources().try_lock().is_err()
    }

    /// One reaper pass: close idle sessions and stalled handshakes, purge
    /// tombstones, flag dead transports.
    ///
    /// A session with an operation in flight is never idle. Returns how many
    /// sessions were closed.
    pub async fn sweep(&self) -> usize {
        if self.inner.sessions.is_empty() {
            return 0;
        }
        let now = Instant::now();
        let idle_timeout = self.inner.config.idle_timeout;
        let mut expired = Vec::new();

        for slot in self.inner.sessions.list() {
            match slot.state() {
                SessionState::Closed => {
                    if self.inner.sessions.remove_slot(&slot) {
                        debug!("Purged closed session {}", slot.id());
                    }
                }
                SessionState::Active | SessionState::Failed => {
                    if slot.idle_for(now) < idle_timeout {
                        self.check_transport(&slot);
                    } else if Self::is_busy(&slot) {
                        debug!("Session {} is busy, not reaping", slot.id());
                    } else {
                        info!(
                            "Closing session {} after {:?} idle",
                            slot.id(),
                            slot.idle_for(now)
                        );
                        expired.push(slot);
                    }
                }
                SessionState::Connecting => {
                    if slot.idle_for(now) > slot.connect_timeout() {
                        warn!(
                            "Session {} still connecting after {:?}, closing it",
                            slot.id(),
                            slot.idle_for(now)
                        );
                        expired.push(slot);
                    }
                }
                SessionState::Closing => {}
            }
        }

        let results = join_all(expired.iter().map(|slot| self.close(slot.id()))).await;
        results.iter().filter(|result| result.is_ok()).count()
    }

    /// Run [`sweep`](Self::sweep) every reap interval until [`shutdown`](Self::shutdown).
    pub fn spawn_reaper(&self) -> JoinHandle<()> {
        let manager = self.clone();
        tokio::spawn(async move {
            let period = manager.inner.config.reap_interval;
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!("Session reaper started (every {:?})", period);

            loop {
                tokio::select! {
                    _ = manager.inner.shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        let closed = manager.sweep().await;
                        if closed > 0 {
                            info!("Reaper closed {} idle session(s)", closed);
                        }
                    }
                }
            }
            debug!("Session reaper stopped");
        })
    }

    /// Stop the reaper and close every session.
    pub async fn shutdown(&self) {
        self.inner.shutdown.cancel();

        info!(
            "Shutting down, closing {} session(s)",
            self.inner.sessions.len()
        );
        let slots = self.inner.sessions.list();

        join_all(slots.iter().map(|slot| self.close(slot.id()))).await;
        for slot in &slots {
            self.inner.sessions.remove_slot(slot);
        }
    }
}
