//! Per-session record held by the registry.
//!
//! A slot owns everything one session needs: descriptive metadata, the
//! lifecycle state, the transport and kube context behind a fair async mutex,
//! and the cancellation token that `close` fires before tearing down.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex as AsyncMutex, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::mcp::cluster::KubeContext;
use crate::mcp::error::SessionError;
use crate::mcp::transport::RemoteShell;
use crate::mcp::types::{KubeContextHandle, SessionInfo, SessionState};

/// Descriptive data about a session, safe to hand back to callers.
#[derive(Debug, Clone)]
pub struct SlotMeta {
    pub name: Option<String>,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub auth_method: &'static str,
    pub created_at: DateTime<Utc>,
    pub connect_timeout: Duration,
}

/// Resources a session owns while it is open.
#[derive(Default)]
pub struct SlotResources {
    pub shell: Option<Box<dyn RemoteShell>>,
    pub kube: Option<KubeContext>,
}

/// How a `close` call relates to the session's teardown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseStart {
    /// This caller moved the session to Closing and must tear it down.
    Owner,
    /// Another caller is tearing it down.
    InProgress,
    /// Teardown already finished; only the tombstone is left.
    AlreadyClosed,
}

struct Activity {
    at: Instant,
    wall: DateTime<Utc>,
}

pub struct SessionSlot {
    id: String,
    meta: SlotMeta,
    state: watch::Sender<SessionState>,
    resources: Arc<AsyncMutex<SlotResources>>,
    cancel: CancellationToken,
    capacity_held: AtomicBool,
    activity: Mutex<Activity>,
    kube_handle: Mutex<Option<KubeContextHandle>>,
}

/// Lock a std mutex, recovering the data if a holder panicked.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl SessionSlot {
    /// New slot in the Connecting state, holding one unit of capacity.
    pub fn new(id: String, meta: SlotMeta) -> Self {
        let (state, _) = watch::channel(SessionState::Connecting);
        Self {
            id,
            activity: Mutex::new(Activity {
                at: Instant::now(),
                wall: meta.created_at,
            }),
            meta,
            state,
            resources: Arc::new(AsyncMutex::new(SlotResources::default())),
            cancel: CancellationToken::new(),
            capacity_held: AtomicBool::new(true),
            kube_handle: Mutex::new(None),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Move to `to` if the current state is one of `from`.
    ///
    /// Returns the state observed before the attempt.
    pub fn transition(
        &self,
        from: &[SessionState],
        to: SessionState,
    ) -> Result<SessionState, SessionState> {
        let mut observed = SessionState::Connecting;
        let changed = self.state.send_if_modified(|state| {
            observed = *state;
            if from.contains(state) {
                *state = to;
                true
            } else {
                false
            }
        });
        if changed { Ok(observed) } else { Err(observed) }
    }

    /// Claim the teardown, or learn that someone else has.
    pub fn begin_close(&self) -> CloseStart {
        match self.transition(
            &[
                SessionState::Connecting,
                SessionState::Active,
                SessionState::Failed,
            ],
            SessionState::Closing,
        ) {
            Ok(_) => CloseStart::Owner,
            Err(SessionState::Closed) => CloseStart::AlreadyClosed,
            Err(_) => CloseStart::InProgress,
        }
    }

    /// Final state after teardown. Wakes every waiting closer.
    pub fn mark_closed(&self) {
        self.state.send_replace(SessionState::Closed);
    }

    /// Wait until the session reaches Closed.
    pub async fn wait_closed(&self) {
        let mut rx = self.state.subscribe();
        // The sender lives in self, so the channel cannot close while we wait.
        let _ = rx.wait_for(|state| *state == SessionState::Closed).await;
    }

    /// Fail unless the session is Active.
    pub fn ensure_active(&self) -> Result<(), SessionError> {
        match self.state() {
            SessionState::Active => Ok(()),
            state => Err(SessionError::NotActive {
                session_id: self.id.clone(),
                state,
            }),
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        self.meta.connect_timeout
    }

    pub fn resources(&self) -> Arc<AsyncMutex<SlotResources>> {
        Arc::clone(&self.resources)
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Give back the capacity unit. Returns true only for the first caller.
    pub fn release_capacity(&self) -> bool {
        self.capacity_held.swap(false, Ordering::SeqCst)
    }

    #[cfg(test)]
    pub fn holds_capacity(&self) -> bool {
        self.capacity_held.load(Ordering::SeqCst)
    }

    /// Record activity now.
    pub fn touch(&self) {
        let mut activity = lock(&self.activity);
        activity.at = Instant::now();
        activity.wall = Utc::now();
    }

    /// Time since the last recorded activity.
    pub fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(lock(&self.activity).at)
    }

    pub fn set_kube_handle(&self, handle: Option<KubeContextHandle>) {
        *lock(&self.kube_handle) = handle;
    }

    pub fn kube_handle(&self) -> Option<KubeContextHandle> {
        lock(&self.kube_handle).clone()
    }

    /// Snapshot for callers. Carries no secrets.
    pub fn info(&self) -> SessionInfo {
        let last_activity = lock(&self.activity).wall;
        SessionInfo {
            session_id: self.id.clone(),
            name: self.meta.name.clone(),
            host: self.meta.host.clone(),
            port: self.meta.port,
            username: self.meta.username.clone(),
            auth_method: self.meta.auth_method.to_string(),
            state: self.state(),
            created_at: self.meta.created_at.to_rfc3339(),
            last_activity: last_activity.to_rfc3339(),
            connect_timeout_secs: self.meta.connect_timeout.as_secs(),
            kube_context: self.kube_handle(),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn sample_meta() -> SlotMeta {
        SlotMeta {
            name: Some("bastion".to_string()),
            host: "10.0.0.5".to_string(),
            port: 22,
            username: "dev".to_string(),
            auth_method: "key",
            created_at: Utc::now(),
            connect_timeout: Duration::from_secs(30),
        }
    }

    fn slot() -> SessionSlot {
        SessionSlot::new("s1".to_string(), sample_meta())
    }

    mod transitions {
        use super::*;

        #[test]
        fn test_starts_connecting() {
            let slot = slot();
            assert_eq!(slot.state(), SessionState::Connecting);
            assert!(slot.ensure_active().is_err());
        }

        #[test]
        fn test_guarded_transition() {
            let slot = slot();
            assert_eq!(
                slot.transition(&[SessionState::Connecting], SessionState::Active),
                Ok(SessionState::Connecting)
            );
            assert_eq!(
                slot.transition(&[SessionState::Connecting], SessionState::Failed),
                Err(SessionState::Active)
            );
            assert!(slot.ensure_active().is_ok());
        }

        #[test]
        fn test_begin_close_has_one_owner() {
            let slot = slot();
            slot.transition(&[SessionState::Connecting], SessionState::Active)
                .unwrap();

            assert_eq!(slot.begin_close(), CloseStart::Owner);
            assert_eq!(slot.begin_close(), CloseStart::InProgress);

            slot.mark_closed();
            assert_eq!(slot.begin_close(), CloseStart::AlreadyClosed);
        }

        #[test]
        fn test_failed_session_can_be_closed() {
            let slot = slot();
            slot.transition(&[SessionState::Connecting], SessionState::Failed)
                .unwrap();
            assert_eq!(slot.begin_close(), CloseStart::Owner);
        }

        #[tokio::test]
        async fn test_wait_closed_wakes_waiters() {
            let slot = Arc::new(slot());
            slot.begin_close();

            let waiter = {
                let slot = Arc::clone(&slot);
                tokio::spawn(async move { slot.wait_closed().await })
            };
            tokio::task::yield_now().await;
            slot.mark_closed();

            waiter.await.unwrap();
            assert_eq!(slot.state(), SessionState::Closed);
        }
    }

    mod bookkeeping {
        use super::*;

        #[test]
        fn test_capacity_released_once() {
            let slot = slot();
            assert!(slot.holds_capacity());
            assert!(slot.release_capacity());
            assert!(!slot.release_capacity());
            assert!(!slot.holds_capacity());
        }

        #[tokio::test(start_paused = true)]
        async fn test_touch_resets_idle_time() {
            let slot = slot();
            tokio::time::advance(Duration::from_secs(90)).await;
            assert!(slot.idle_for(Instant::now()) >= Duration::from_secs(90));

            slot.touch();
            assert_eq!(slot.idle_for(Instant::now()), Duration::ZERO);
        }

        #[test]
        fn test_info_snapshot() {
            let slot = slot();
            let info = slot.info();
            assert_eq!(info.session_id, "s1");
            assert_eq!(info.state, SessionState::Connecting);
            assert_eq!(info.connect_timeout_secs, 30);
            assert!(info.kube_context.is_none());
        }
    }
}
