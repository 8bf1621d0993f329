//! Registry trait definition.

use std::sync::Arc;

use super::slot::SessionSlot;

/// Registry of session slots keyed by session id.
///
/// Implementations must be thread-safe (`Send + Sync`); every tool call and the
/// idle reaper reach the registry concurrently.
pub trait SessionStorage: Send + Sync {
    fn insert(&self, slot: Arc<SessionSlot>);

    fn get(&self, session_id: &str) -> Option<Arc<SessionSlot>>;

    /// Remove the entry only if it is still this exact slot.
    fn remove_slot(&self, slot: &Arc<SessionSlot>) -> bool;

    /// All slots, in no particular order.
    fn list(&self) -> Vec<Arc<SessionSlot>>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
