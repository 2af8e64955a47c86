use std::collections::HashSet;

use super::chat_types::{PresenceDelta, PresenceStatus};

/// Set of identities currently online.
#[derive(Debug, Default)]
pub struct PresenceTracker {
    online: HashSet<String>,
}

impl PresenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole set from a snapshot.
    pub fn replace(&mut self, identities: Vec<String>) {
        self.online = identities.into_iter().collect();
        log::debug!("Presence snapshot: {} online", self.online.len());
    }

    /// Apply a single online/offline change. Returns whether the set changed.
    pub fn apply_delta(&mut self, delta: &PresenceDelta) -> bool {
        match delta.status {
            PresenceStatus::Online => self.online.insert(delta.username.clone()),
            PresenceStatus::Offline => self.online.remove(&delta.username),
        }
    }

    pub fn is_online(&self, identity: &str) -> bool {
        self.online.contains(identity)
    }

    /// Online identities, sorted.
    pub fn online(&self) -> Vec<String> {
        let mut online: Vec<String> = self.online.iter().cloned().collect();
        online.sort();
        online
    }
}
