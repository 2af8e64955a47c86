//! Core chat orchestrator: ties together sync, presence, directory and
//! notifications. Single owner of all client state.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::time::Instant;

use super::chat_gateway::SharedGateway;
use super::chat_notifications::{Notification, NotificationSink, UnreadCoordinator};
use super::chat_sync::SyncEngine;
use super::chat_types::*;
use super::config::TimingSettings;
use super::directory::{DirectoryCache, RosterEntry, RosterRow};
use super::presence::PresenceTracker;
use crate::error::ParleyError;

/// Everything a presentation layer needs to render the client.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientSnapshot {
    pub self_id: String,
    pub connected: bool,
    pub active: Option<String>,
    pub messages: Vec<ChatMessage>,
    pub counterpart_typing: bool,
    pub roster: Vec<RosterRow>,
    pub online: Vec<String>,
    pub notifications: Vec<Notification>,
    pub total_unread: u32,
    pub attention: Option<String>,
}

pub struct ChatService {
    pub engine: SyncEngine,
    pub presence: PresenceTracker,
    pub directory: DirectoryCache,
    pub notifications: UnreadCoordinator,
}

impl ChatService {
    pub fn new(
        self_id: &str,
        gateway: SharedGateway,
        sink: Arc<dyn NotificationSink>,
        timing: &TimingSettings,
    ) -> Self {
        Self {
            engine: SyncEngine::new(self_id, gateway, timing.typing_idle()),
            presence: PresenceTracker::new(),
            directory: DirectoryCache::new(self_id),
            notifications: UnreadCoordinator::new(
                self_id,
                sink,
                timing.message_notification(),
                timing.aggregate_notification(),
            ),
        }
    }

    pub fn self_id(&self) -> &str {
        self.engine.self_id()
    }

    // ── Gateway events ─────────────────────────────────────────

    /// Dispatch one inbound event. Never fails; bad or stale events are
    /// logged and dropped.
    pub fn handle_event(&mut self, event: InboundEvent, now: Instant) {
        match event {
            InboundEvent::Connected => {
                log::info!("Channel up, announcing {}", self.self_id());
                self.engine.on_connect();
            }
            InboundEvent::Disconnected => {
                log::info!("Channel down");
                self.engine.on_disconnect();
            }
            InboundEvent::HistoryLoaded(payload) => {
                if !self.engine.apply_history(payload) {
                    let err = ParleyError::StaleResponse("history".to_string());
                    log::debug!("{}", err);
                }
            }
            InboundEvent::MessageAcknowledged(ack) => {
                let counterpart = ack.receiver.clone();
                if self.engine.apply_ack(ack) {
                    self.directory.touch(&counterpart, Utc::now());
                }
            }
            InboundEvent::MessageReceived(wire) => match ChatMessage::from_push(wire) {
                Ok(message) => self.receive(message, Utc::now(), now),
                Err(e) => log::warn!("Dropping pushed message: {}", e),
            },
            InboundEvent::TypingChanged(signal) => self.engine.apply_typing(&signal),
            InboundEvent::PresenceSnapshot(online) => self.presence.replace(online),
            InboundEvent::PresenceDelta(delta) => {
                if self.presence.apply_delta(&delta) {
                    log::debug!("{} is now {:?}", delta.username, delta.status);
                }
            }
        }
    }

    /// Fan a pushed message out to every component. Runs regardless of which
    /// conversation is active.
    fn receive(&mut self, message: ChatMessage, at: DateTime<Utc>, now: Instant) {
        let own = message.sender == self.self_id();
        if !own {
            self.engine.accept_push(&message);
        }

        // our own echo still counts as activity with the receiver
        let counterpart = if own {
            message.receiver.as_str()
        } else {
            message.counterpart()
        };
        self.directory.touch(counterpart, at);

        let active = self.engine.active_counterpart().map(str::to_string);
        self.notifications
            .on_inbound(&message, active.as_deref(), now);
    }

    // ── User actions ───────────────────────────────────────────

    /// Select a conversation. The synthetic system identity only dismisses
    /// system notifications.
    pub fn select_user(&mut self, identity: &str) {
        let identity = identity.trim();
        if identity.is_empty() || identity == self.self_id() {
            return;
        }
        if identity != SYSTEM_SENDER {
            self.engine.switch_conversation(identity);
        }
        self.notifications.select(identity);
    }

    pub fn send(&mut self, content: &str) -> Option<ChatMessage> {
        let now = Utc::now();
        let sent = self.engine.send(content, now)?;
        self.directory.touch(&sent.receiver, now);
        Some(sent)
    }

    pub fn report_typing(&mut self, now: Instant) {
        self.engine.report_typing(now);
    }

    pub fn set_visible(&mut self, visible: bool) {
        self.notifications.set_visible(visible);
    }

    // ── Fetch completions ──────────────────────────────────────

    pub fn apply_roster(&mut self, users: Vec<RosterUser>) {
        self.directory.merge_snapshot(users);
    }

    pub fn apply_unread(&mut self, counts: Vec<UnreadCount>, now: Instant) {
        let active = self.engine.active_counterpart();
        if self.notifications.apply_unread_snapshot(counts, active, now) {
            log::info!(
                "Unread counters refreshed ({} total)",
                self.notifications.total_unread()
            );
        }
    }

    // ── Timers ─────────────────────────────────────────────────

    pub fn on_timer(&mut self, now: Instant) {
        self.engine.on_timer(now);
        self.notifications.expire(now);
    }

    /// Earliest pending timer across the typing debounce and notifications.
    pub fn next_deadline(&self) -> Option<Instant> {
        match (self.engine.next_deadline(), self.notifications.next_deadline()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    // ── Views ──────────────────────────────────────────────────

    pub fn roster(&self) -> Vec<RosterRow> {
        self.rows(self.directory.sorted(&self.presence))
    }

    pub fn search_roster(&self, query: &str) -> Vec<RosterRow> {
        self.rows(self.directory.search(query, &self.presence))
    }

    fn rows(&self, entries: Vec<&RosterEntry>) -> Vec<RosterRow> {
        entries
            .into_iter()
            .map(|e| RosterRow {
                identity: e.identity.clone(),
                online: self.presence.is_online(&e.identity),
                last_message_at: e.last_message_at,
                unread: self.notifications.unread_for(&e.identity),
            })
            .collect()
    }

    pub fn snapshot(&self, query: Option<&str>) -> ClientSnapshot {
        let roster = match query {
            Some(q) => self.search_roster(q),
            None => self.roster(),
        };
        ClientSnapshot {
            self_id: self.self_id().to_string(),
            connected: self.engine.is_connected(),
            active: self.engine.active_counterpart().map(str::to_string),
            messages: self.engine.active_messages().to_vec(),
            counterpart_typing: self.engine.counterpart_typing(),
            roster,
            online: self.presence.online(),
            notifications: self.notifications.notifications().cloned().collect(),
            total_unread: self.notifications.total_unread(),
            attention: self.notifications.attention().map(str::to_string),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::chat_gateway::ChannelGateway;
    use crate::services::chat_notifications::MockNotificationSink;
    use std::time::Duration;
    use tokio::sync::mpsc::UnboundedReceiver;

    fn service() -> (ChatService, UnboundedReceiver<OutboundEvent>) {
        let (gateway, rx) = ChannelGateway::open();
        gateway.set_connected(true);
        let mut sink = MockNotificationSink::new();
        sink.expect_play_sound().return_const(());
        sink.expect_set_attention().return_const(());
        let service = ChatService::new(
            "alice",
            Arc::new(gateway),
            Arc::new(sink),
            &TimingSettings::default(),
        );
        (service, rx)
    }

    fn pushed(from: &str, to: &str, content: &str) -> InboundEvent {
        InboundEvent::MessageReceived(WireMessage {
            sender: from.to_string(),
            receiver: to.to_string(),
            content: content.to_string(),
            ..Default::default()
        })
    }

    #[test]
    fn test_connect_announces_presence() {
        let (mut service, mut rx) = service();
        service.handle_event(InboundEvent::Connected, Instant::now());
        assert_eq!(
            rx.try_recv().unwrap(),
            OutboundEvent::AnnouncePresence("alice".to_string())
        );
    }

    #[test]
    fn test_history_after_reconnect_reaches_new_conversation() {
        let (gateway, mut rx) = ChannelGateway::open();
        gateway.set_connected(true);
        let mut sink = MockNotificationSink::new();
        sink.expect_play_sound().return_const(());
        let mut service = ChatService::new(
            "alice",
            Arc::new(gateway.clone()),
            Arc::new(sink),
            &TimingSettings::default(),
        );
        let now = Instant::now();

        service.select_user("carol");
        gateway.set_connected(false);
        service.handle_event(InboundEvent::Disconnected, now);
        gateway.set_connected(true);
        service.handle_event(InboundEvent::Connected, now);
        service.select_user("bob");
        while rx.try_recv().is_ok() {}

        let history = serde_json::from_value(serde_json::json!([
            {"sender": "bob", "receiver": "alice", "content": "for bob"}
        ]))
        .unwrap();
        service.handle_event(InboundEvent::HistoryLoaded(history), now);

        assert_eq!(service.engine.active_counterpart(), Some("bob"));
        assert_eq!(service.engine.active_messages().len(), 1);
    }

    #[test]
    fn test_late_unread_fetch_keeps_active_sender_at_zero() {
        let (mut service, _rx) = service();
        let now = Instant::now();
        service.handle_event(pushed("dave", "alice", "1"), now);
        service.handle_event(pushed("dave", "alice", "2"), now);
        service.select_user("carol");

        service.apply_unread(
            vec![
                UnreadCount {
                    sender: "carol".to_string(),
                    count: 3,
                },
                UnreadCount {
                    sender: "dave".to_string(),
                    count: 1,
                },
            ],
            now,
        );

        assert_eq!(service.notifications.unread_for("carol"), 0);
        assert_eq!(service.notifications.unread_for("dave"), 2);
    }

    #[test]
    fn test_message_for_inactive_conversation() {
        let (mut service, _rx) = service();
        service.select_user("bob");
        service.handle_event(pushed("carol", "alice", "psst"), Instant::now());

        assert_eq!(service.notifications.unread_for("carol"), 1);
        assert_eq!(service.notifications.unread_for("bob"), 0);
        assert_eq!(service.notifications.notifications().count(), 1);
        assert!(service.engine.active_messages().is_empty());
        assert!(service.directory.get("carol").unwrap().last_message_at.is_some());
    }

    #[test]
    fn test_selecting_sender_resets_unread() {
        let (mut service, _rx) = service();
        let now = Instant::now();
        service.handle_event(pushed("carol", "alice", "1"), now);
        service.handle_event(pushed("carol", "alice", "2"), now);
        assert_eq!(service.notifications.unread_for("carol"), 2);

        service.select_user("carol");
        assert_eq!(service.notifications.unread_for("carol"), 0);
        assert_eq!(service.notifications.notifications().count(), 0);
        assert_eq!(service.engine.active_counterpart(), Some("carol"));
    }

    #[test]
    fn test_selecting_system_keeps_active_conversation() {
        let (mut service, _rx) = service();
        service.select_user("bob");
        service.apply_unread(
            vec![
                UnreadCount {
                    sender: "carol".to_string(),
                    count: 1,
                },
                UnreadCount {
                    sender: "dave".to_string(),
                    count: 1,
                },
            ],
            Instant::now(),
        );
        service.select_user(SYSTEM_SENDER);

        assert_eq!(service.engine.active_counterpart(), Some("bob"));
        assert_eq!(service.notifications.notifications().count(), 0);
        assert_eq!(service.notifications.total_unread(), 2);
    }

    #[test]
    fn test_selecting_self_is_ignored() {
        let (mut service, mut rx) = service();
        service.select_user(" alice ");
        assert!(service.engine.active_counterpart().is_none());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_own_echo_bumps_receiver_recency_only() {
        let (mut service, _rx) = service();
        service.select_user("bob");
        service.handle_event(pushed("alice", "bob", "mirror"), Instant::now());

        assert!(service.engine.active_messages().is_empty());
        assert_eq!(service.notifications.notifications().count(), 0);
        assert!(service.directory.get("bob").unwrap().last_message_at.is_some());
    }

    #[test]
    fn test_malformed_push_is_dropped() {
        let (mut service, _rx) = service();
        service.handle_event(pushed("", "alice", "who?"), Instant::now());
        assert_eq!(service.notifications.notifications().count(), 0);
        assert!(service.directory.is_empty());
    }

    #[test]
    fn test_send_bumps_recipient_and_sorts_first() {
        let (mut service, _rx) = service();
        service.apply_roster(vec![
            RosterUser {
                id: None,
                username: "bob".to_string(),
                is_online: false,
                last_seen: None,
                last_message_at: None,
            },
            RosterUser {
                id: None,
                username: "zed".to_string(),
                is_online: false,
                last_seen: None,
                last_message_at: None,
            },
        ]);
        service.handle_event(
            InboundEvent::PresenceSnapshot(vec!["bob".to_string()]),
            Instant::now(),
        );
        service.select_user("zed");
        service.send("hi zed").unwrap();

        let roster = service.roster();
        assert_eq!(roster[0].identity, "zed");
        assert_eq!(roster[1].identity, "bob");
        assert!(roster[1].online);
    }

    #[test]
    fn test_next_deadline_takes_earliest_timer() {
        let (mut service, _rx) = service();
        let start = Instant::now();
        service.handle_event(pushed("carol", "alice", "hey"), start);
        service.select_user("bob");
        service.report_typing(start);

        assert_eq!(service.next_deadline(), Some(start + Duration::from_millis(2000)));
        service.on_timer(start + Duration::from_millis(2000));
        assert_eq!(service.next_deadline(), Some(start + Duration::from_millis(4000)));

        service.on_timer(start + Duration::from_millis(4000));
        assert!(service.next_deadline().is_none());
        assert_eq!(service.notifications.notifications().count(), 0);
    }

    #[test]
    fn test_snapshot_serializes_camel_case() {
        let (mut service, _rx) = service();
        service.select_user("bob");
        service.send("hello");

        let json = serde_json::to_value(service.snapshot(None)).unwrap();
        assert_eq!(json["selfId"], "alice");
        assert_eq!(json["active"], "bob");
        assert_eq!(json["messages"][0]["status"], "sending");
        assert_eq!(json["counterpartTyping"], false);
    }
}
