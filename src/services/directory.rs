//! Roster of known users, merged additively from periodic snapshots.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;

use super::chat_types::RosterUser;
use super::presence::PresenceTracker;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterEntry {
    pub identity: String,
    pub last_seen: Option<DateTime<Utc>>,
    /// Advances with every message sent to or received from this user
    pub last_message_at: Option<DateTime<Utc>>,
}

/// A roster entry decorated for display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterRow {
    pub identity: String,
    pub online: bool,
    pub last_message_at: Option<DateTime<Utc>>,
    pub unread: u32,
}

pub struct DirectoryCache {
    self_id: String,
    entries: HashMap<String, RosterEntry>,
}

impl DirectoryCache {
    pub fn new(self_id: &str) -> Self {
        Self {
            self_id: self_id.to_string(),
            entries: HashMap::new(),
        }
    }

    /// Merge a roster snapshot. Existing entries are kept as they are; only
    /// identities not seen before are added. Returns the number added.
    pub fn merge_snapshot(&mut self, users: Vec<RosterUser>) -> usize {
        let mut added = 0;
        for user in users {
            if user.username.trim().is_empty() || user.username == self.self_id {
                continue;
            }
            if self.entries.contains_key(&user.username) {
                continue;
            }
            let last_message_at = user
                .last_message_at
                .and_then(DateTime::<Utc>::from_timestamp_millis);
            self.entries.insert(
                user.username.clone(),
                RosterEntry {
                    identity: user.username,
                    last_seen: user.last_seen,
                    last_message_at,
                },
            );
            added += 1;
        }
        if added > 0 {
            log::info!("Directory: added {} users ({} total)", added, self.entries.len());
        }
        added
    }

    /// Advance an identity's recency marker. Never moves it backwards.
    pub fn touch(&mut self, identity: &str, at: DateTime<Utc>) {
        if identity == self.self_id || identity.trim().is_empty() {
            return;
        }
        let entry = self
            .entries
            .entry(identity.to_string())
            .or_insert_with(|| RosterEntry {
                identity: identity.to_string(),
                last_seen: None,
                last_message_at: None,
            });
        if entry.last_message_at.map_or(true, |prev| at > prev) {
            entry.last_message_at = Some(at);
        }
    }

    pub fn get(&self, identity: &str) -> Option<&RosterEntry> {
        self.entries.get(identity)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries ordered for display: most recent interaction first, then
    /// online before offline, then by identity.
    pub fn sorted(&self, presence: &PresenceTracker) -> Vec<&RosterEntry> {
        let mut entries: Vec<&RosterEntry> = self.entries.values().collect();
        entries.sort_by(|a, b| display_order(a, b, presence));
        entries
    }

    /// Sorted entries whose identity contains `query`, case-insensitively.
    pub fn search(&self, query: &str, presence: &PresenceTracker) -> Vec<&RosterEntry> {
        let needle = query.trim().to_lowercase();
        self.sorted(presence)
            .into_iter()
            .filter(|e| needle.is_empty() || e.identity.to_lowercase().contains(&needle))
            .collect()
    }
}

fn display_order(a: &RosterEntry, b: &RosterEntry, presence: &PresenceTracker) -> Ordering {
    let recency = |e: &RosterEntry| e.last_message_at.map_or(0, |t| t.timestamp_millis());
    recency(b)
        .cmp(&recency(a))
        .then_with(|| {
            presence
                .is_online(&b.identity)
                .cmp(&presence.is_online(&a.identity))
        })
        .then_with(|| a.identity.cmp(&b.identity))
}
