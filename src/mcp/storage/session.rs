//! DashMap-based session registry.

use std::sync::Arc;

use dashmap::DashMap;

use super::slot::SessionSlot;
use super::traits::SessionStorage;

/// `DashMap` keyed by session id.
#[derive(Default)]
pub struct DashMapSessionStorage {
    sessions: DashMap<String, Arc<SessionSlot>>,
}

impl DashMapSessionStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStorage for DashMapSessionStorage {
    fn insert(&self, slot: Arc<SessionSlot>) {
        self.sessions.insert(slot.id().to_string(), slot);
    }

    fn get(&self, session_id: &str) -> Option<Arc<SessionSlot>> {
        self.sessions.get(session_id).map(|entry| Arc::clone(entry.value()))
    }

    fn remove_slot(&self, slot: &Arc<SessionSlot>) -> bool {
        self.sessions
            .remove_if(slot.id(), |_, stored| Arc::ptr_eq(stored, slot))
            .is_some()
    }

    fn list(&self) -> Vec<Arc<SessionSlot>> {
        self.sessions
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    fn len(&self) -> usize {
        self.sessions.len()
    }
}
