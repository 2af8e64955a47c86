//! Unread counters and transient notifications.
//!
//! Fed by every inbound message, not only those of the active conversation.

use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use super::chat_types::{ChatMessage, UnreadCount, SYSTEM_SENDER};

/// Attention marker shown while the display is hidden.
pub const ATTENTION_MARKER: &str = "(1) New Message";

/// Side effects the coordinator triggers but does not render.
#[cfg_attr(test, mockall::automock)]
pub trait NotificationSink: Send + Sync {
    fn play_sound(&self);

    /// Set (`Some`) or clear (`None`) the attention marker.
    fn set_attention(&self, marker: Option<String>);
}

/// Sink that only logs; used when no presentation layer is attached.
pub struct LogNotificationSink;

impl NotificationSink for LogNotificationSink {
    fn play_sound(&self) {
        log::debug!("Notification sound");
    }

    fn set_attention(&self, marker: Option<String>) {
        match marker {
            Some(m) => log::info!("Attention: {}", m),
            None => log::debug!("Attention cleared"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum NotificationKind {
    Message,
    MissedSummary,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: u64,
    pub sender: String,
    pub message: String,
    pub kind: NotificationKind,
    #[serde(skip)]
    pub expires_at: Instant,
}

pub struct UnreadCoordinator {
    self_id: String,
    sink: Arc<dyn NotificationSink>,
    unread: HashMap<String, u32>,
    queue: VecDeque<Notification>,
    next_id: u64,
    summary_shown: bool,
    visible: bool,
    attention: Option<String>,
    message_ttl: Duration,
    summary_ttl: Duration,
}

impl UnreadCoordinator {
    pub fn new(
        self_id: &str,
        sink: Arc<dyn NotificationSink>,
        message_ttl: Duration,
        summary_ttl: Duration,
    ) -> Self {
        Self {
            self_id: self_id.to_string(),
            sink,
            unread: HashMap::new(),
            queue: VecDeque::new(),
            next_id: 1,
            summary_shown: false,
            visible: true,
            attention: None,
            message_ttl,
            summary_ttl,
        }
    }

    /// Handle an inbound message for any conversation.
    pub fn on_inbound(&mut self, message: &ChatMessage, active: Option<&str>, now: Instant) {
        self.sink.play_sound();

        if message.sender == self.self_id {
            return;
        }

        if active != Some(message.sender.as_str()) {
            *self.unread.entry(message.sender.clone()).or_insert(0) += 1;
            if !self.visible && self.attention.is_none() {
                self.attention = Some(ATTENTION_MARKER.to_string());
                self.sink.set_attention(self.attention.clone());
            }
        }

        self.enqueue(
            &message.sender,
            &message.content,
            NotificationKind::Message,
            now + self.message_ttl,
        );
    }

    /// Selecting a user zeroes their counter and drops their notifications.
    /// Selecting the system identity only drops system notifications.
    pub fn select(&mut self, identity: &str) {
        if identity != SYSTEM_SENDER {
            self.unread.insert(identity.to_string(), 0);
        }
        self.queue.retain(|n| n.sender != identity);
    }

    /// Merge the aggregate unread fetch into the live counters.
    ///
    /// The fetch may land after live pushes or a selection, so each counter
    /// keeps the larger of its local and fetched values and the active
    /// counterpart stays at zero. The first time a positive total is seen a
    /// one-off summary notification is queued. Returns whether the counters
    /// changed.
    pub fn apply_unread_snapshot(
        &mut self,
        counts: Vec<UnreadCount>,
        active: Option<&str>,
        now: Instant,
    ) -> bool {
        let fresh: HashMap<String, u32> = counts
            .into_iter()
            .filter(|c| !c.sender.is_empty() && Some(c.sender.as_str()) != active)
            .map(|c| (c.sender, c.count))
            .collect();

        let total: u32 = fresh.values().sum();
        let mut with_unread: Vec<&String> = fresh
            .iter()
            .filter(|(_, count)| **count > 0)
            .map(|(sender, _)| sender)
            .collect();
        with_unread.sort();

        if total > 0 && !self.summary_shown {
            let (sender, text) = if with_unread.len() == 1 {
                let sender = with_unread[0].clone();
                let text = format!("You missed {} messages from {}.", total, sender);
                (sender, text)
            } else {
                (
                    SYSTEM_SENDER.to_string(),
                    format!("You missed {} messages.", total),
                )
            };
            self.enqueue(
                &sender,
                &text,
                NotificationKind::MissedSummary,
                now + self.summary_ttl,
            );
            self.summary_shown = true;
        }

        let mut changed = false;
        for (sender, count) in fresh {
            let local = self.unread.entry(sender).or_insert(0);
            if count > *local {
                *local = count;
                changed = true;
            }
        }
        changed
    }

    /// Track whether the display is visible. Becoming visible clears the
    /// attention marker.
    pub fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
        if visible && self.attention.take().is_some() {
            self.sink.set_attention(None);
        }
    }

    /// Drop expired notifications from the head of the queue. An entry
    /// never leaves before the ones queued ahead of it. Returns how many
    /// were removed.
    pub fn expire(&mut self, now: Instant) -> usize {
        let mut removed = 0;
        while self.queue.front().is_some_and(|n| n.expires_at <= now) {
            self.queue.pop_front();
            removed += 1;
        }
        removed
    }

    /// Deadline of the head of the queue.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.queue.front().map(|n| n.expires_at)
    }

    pub fn unread_for(&self, identity: &str) -> u32 {
        self.unread.get(identity).copied().unwrap_or(0)
    }

    pub fn total_unread(&self) -> u32 {
        self.unread.values().sum()
    }

    pub fn notifications(&self) -> impl Iterator<Item = &Notification> {
        self.queue.iter()
    }

    pub fn attention(&self) -> Option<&str> {
        self.attention.as_deref()
    }

    fn enqueue(&mut self, sender: &str, message: &str, kind: NotificationKind, expires_at: Instant) {
        let id = self.next_id;
        self.next_id += 1;
        self.queue.push_back(Notification {
            id,
            sender: sender.to_string(),
            message: message.to_string(),
            kind,
            expires_at,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::chat_types::WireMessage;
    use rstest::rstest;

    const MESSAGE_TTL: Duration = Duration::from_millis(4000);
    const SUMMARY_TTL: Duration = Duration::from_millis(5000);

    fn quiet_sink() -> Arc<dyn NotificationSink> {
        let mut sink = MockNotificationSink::new();
        sink.expect_play_sound().return_const(());
        sink.expect_set_attention().return_const(());
        Arc::new(sink)
    }

    fn coordinator() -> UnreadCoordinator {
        UnreadCoordinator::new("alice", quiet_sink(), MESSAGE_TTL, SUMMARY_TTL)
    }

    fn msg(from: &str, content: &str) -> ChatMessage {
        ChatMessage::from_push(WireMessage {
            sender: from.to_string(),
            receiver: "alice".to_string(),
            content: content.to_string(),
            ..Default::default()
        })
        .unwrap()
    }

    fn counts(pairs: &[(&str, u32)]) -> Vec<UnreadCount> {
        pairs
            .iter()
            .map(|(s, c)| UnreadCount {
                sender: s.to_string(),
                count: *c,
            })
            .collect()
    }

    #[test]
    fn test_inactive_sender_counts_unread() {
        let mut coord = coordinator();
        coord.on_inbound(&msg("carol", "hi"), Some("bob"), Instant::now());

        assert_eq!(coord.unread_for("carol"), 1);
        assert_eq!(coord.unread_for("bob"), 0);
        assert_eq!(coord.notifications().count(), 1);
    }

    #[test]
    fn test_active_sender_still_notifies_but_no_unread() {
        let mut coord = coordinator();
        coord.on_inbound(&msg("bob", "hi"), Some("bob"), Instant::now());

        assert_eq!(coord.unread_for("bob"), 0);
        let n: Vec<_> = coord.notifications().collect();
        assert_eq!(n.len(), 1);
        assert_eq!(n[0].sender, "bob");
        assert_eq!(n[0].message, "hi");
    }

    #[test]
    fn test_sound_plays_for_every_inbound_message() {
        let mut sink = MockNotificationSink::new();
        sink.expect_play_sound().times(3).return_const(());
        sink.expect_set_attention().never();
        let mut coord = UnreadCoordinator::new("alice", Arc::new(sink), MESSAGE_TTL, SUMMARY_TTL);

        let now = Instant::now();
        coord.on_inbound(&msg("bob", "1"), Some("bob"), now);
        coord.on_inbound(&msg("carol", "2"), Some("bob"), now);
        coord.on_inbound(&msg("alice", "echo"), Some("bob"), now);

        // the self-originated push is not counted or queued
        assert_eq!(coord.notifications().count(), 2);
        assert_eq!(coord.unread_for("alice"), 0);
    }

    #[test]
    fn test_hidden_display_sets_attention_once() {
        let mut sink = MockNotificationSink::new();
        sink.expect_play_sound().return_const(());
        sink.expect_set_attention()
            .withf(|m| m.as_deref() == Some(ATTENTION_MARKER))
            .times(1)
            .return_const(());
        sink.expect_set_attention()
            .withf(|m| m.is_none())
            .times(1)
            .return_const(());
        let mut coord = UnreadCoordinator::new("alice", Arc::new(sink), MESSAGE_TTL, SUMMARY_TTL);

        coord.set_visible(false);
        coord.on_inbound(&msg("carol", "1"), None, Instant::now());
        coord.on_inbound(&msg("carol", "2"), None, Instant::now());
        assert_eq!(coord.attention(), Some(ATTENTION_MARKER));

        coord.set_visible(true);
        assert!(coord.attention().is_none());
    }

    #[test]
    fn test_select_resets_counter_and_notifications() {
        let mut coord = coordinator();
        let now = Instant::now();
        coord.on_inbound(&msg("carol", "1"), None, now);
        coord.on_inbound(&msg("carol", "2"), None, now);
        coord.on_inbound(&msg("dave", "3"), None, now);

        coord.select("carol");
        assert_eq!(coord.unread_for("carol"), 0);
        assert_eq!(coord.unread_for("dave"), 1);
        let senders: Vec<_> = coord.notifications().map(|n| n.sender.as_str()).collect();
        assert_eq!(senders, vec!["dave"]);
    }

    #[test]
    fn test_select_system_only_clears_system_notifications() {
        let mut coord = coordinator();
        let now = Instant::now();
        coord.apply_unread_snapshot(counts(&[("bob", 2), ("carol", 1)]), None, now);
        coord.on_inbound(&msg("dave", "hey"), None, now);

        coord.select(SYSTEM_SENDER);
        assert_eq!(coord.unread_for("bob"), 2);
        assert_eq!(coord.unread_for("dave"), 1);
        let senders: Vec<_> = coord.notifications().map(|n| n.sender.as_str()).collect();
        assert_eq!(senders, vec!["dave"]);
    }

    #[rstest]
    #[case(&[("bob", 3)], "bob", "You missed 3 messages from bob.")]
    #[case(&[("bob", 3), ("carol", 2)], "System", "You missed 5 messages.")]
    #[case(&[("bob", 0), ("carol", 4)], "carol", "You missed 4 messages from carol.")]
    fn test_summary_attribution(
        #[case] pairs: &[(&str, u32)],
        #[case] sender: &str,
        #[case] text: &str,
    ) {
        let mut coord = coordinator();
        coord.apply_unread_snapshot(counts(pairs), None, Instant::now());

        let n: Vec<_> = coord.notifications().collect();
        assert_eq!(n.len(), 1);
        assert_eq!(n[0].sender, sender);
        assert_eq!(n[0].message, text);
        assert_eq!(n[0].kind, NotificationKind::MissedSummary);
    }

    #[test]
    fn test_summary_fires_once_per_session() {
        let mut coord = coordinator();
        let now = Instant::now();
        assert!(coord.apply_unread_snapshot(counts(&[("bob", 1)]), None, now));
        assert!(coord.apply_unread_snapshot(counts(&[("bob", 2)]), None, now));
        assert!(!coord.apply_unread_snapshot(counts(&[("bob", 2)]), None, now));

        assert_eq!(coord.notifications().count(), 1);
        assert_eq!(coord.unread_for("bob"), 2);
    }

    #[test]
    fn test_empty_snapshot_shows_nothing() {
        let mut coord = coordinator();
        coord.apply_unread_snapshot(Vec::new(), None, Instant::now());
        assert_eq!(coord.notifications().count(), 0);
        assert_eq!(coord.total_unread(), 0);
    }

    #[test]
    fn test_unread_snapshot_merges_with_live_counters() {
        let mut coord = coordinator();
        let now = Instant::now();
        coord.on_inbound(&msg("carol", "1"), None, now);
        coord.on_inbound(&msg("carol", "2"), None, now);
        coord.on_inbound(&msg("bob", "3"), Some("bob"), now);

        assert!(coord.apply_unread_snapshot(
            counts(&[("bob", 4), ("carol", 1), ("dave", 2)]),
            Some("bob"),
            now,
        ));
        assert_eq!(coord.unread_for("bob"), 0);
        assert_eq!(coord.unread_for("carol"), 2);
        assert_eq!(coord.unread_for("dave"), 2);

        // the active sender is left out of the summary too
        let summary = coord
            .notifications()
            .find(|n| n.kind == NotificationKind::MissedSummary)
            .unwrap();
        assert_eq!(summary.message, "You missed 3 messages.");
    }

    #[test]
    fn test_notifications_expire_in_order() {
        let mut coord = coordinator();
        let start = Instant::now();
        coord.on_inbound(&msg("carol", "a"), None, start);
        coord.apply_unread_snapshot(counts(&[("bob", 1)]), None, start);
        coord.on_inbound(&msg("dave", "b"), None, start + Duration::from_millis(200));

        assert_eq!(coord.next_deadline(), Some(start + MESSAGE_TTL));
        assert_eq!(coord.expire(start + MESSAGE_TTL), 1);

        // dave's deadline has passed but the summary ahead of it has not
        assert_eq!(coord.next_deadline(), Some(start + SUMMARY_TTL));
        assert_eq!(coord.expire(start + Duration::from_millis(4200)), 0);
        let left: Vec<_> = coord.notifications().map(|n| n.sender.as_str()).collect();
        assert_eq!(left, vec!["bob", "dave"]);

        assert_eq!(coord.expire(start + SUMMARY_TTL), 2);
        assert!(coord.next_deadline().is_none());
    }
}
