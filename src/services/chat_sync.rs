//! Synchronization engine: reconciles optimistic sends with acknowledged
//! state and merges pushed events into the conversation store.

use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;

use super::chat_gateway::SharedGateway;
use super::chat_message_store::{ConversationStore, MessagePatch};
use super::chat_types::*;

/// Debounced "stopped typing" timer for the local user.
#[derive(Debug, Default)]
struct TypingDebounce {
    /// Counterpart the running timer will notify
    target: Option<String>,
    deadline: Option<Instant>,
}

pub struct SyncEngine {
    self_id: String,
    gateway: SharedGateway,
    store: ConversationStore,
    active: Option<String>,
    /// Counterparts with a history request on the wire, oldest first
    outstanding_history: VecDeque<String>,
    typing: TypingDebounce,
    typing_idle: Duration,
}

impl SyncEngine {
    pub fn new(self_id: &str, gateway: SharedGateway, typing_idle: Duration) -> Self {
        Self {
            self_id: self_id.to_string(),
            gateway,
            store: ConversationStore::new(),
            active: None,
            outstanding_history: VecDeque::new(),
            typing: TypingDebounce::default(),
            typing_idle,
        }
    }

    pub fn self_id(&self) -> &str {
        &self.self_id
    }

    pub fn active_counterpart(&self) -> Option<&str> {
        self.active.as_deref()
    }

    pub fn is_connected(&self) -> bool {
        self.gateway.is_connected()
    }

    pub fn store(&self) -> &ConversationStore {
        &self.store
    }

    /// Messages of the active conversation.
    pub fn active_messages(&self) -> &[ChatMessage] {
        match self.active {
            Some(ref counterpart) => self.store.messages(counterpart),
            None => &[],
        }
    }

    /// Whether the active counterpart is currently typing.
    pub fn counterpart_typing(&self) -> bool {
        self.active
            .as_deref()
            .is_some_and(|c| self.store.is_typing(c))
    }

    // ── Lifecycle ──────────────────────────────────────────────

    /// Announce our identity on the channel. Called on every (re)connect.
    pub fn announce_presence(&self) {
        if let Err(e) = self
            .gateway
            .emit(OutboundEvent::AnnouncePresence(self.self_id.clone()))
        {
            log::warn!("Presence announcement dropped: {}", e);
        }
    }

    /// Channel (re)established: announce ourselves and refetch the active
    /// conversation, whose pushes and history reply may have been missed.
    pub fn on_connect(&mut self) {
        self.announce_presence();
        if let Some(counterpart) = self.active.clone() {
            self.request_history(&counterpart);
        }
    }

    /// Replies to requests sent before a disconnect never arrive.
    pub fn on_disconnect(&mut self) {
        if !self.outstanding_history.is_empty() {
            log::debug!(
                "Forgetting {} unanswered history requests",
                self.outstanding_history.len()
            );
        }
        self.outstanding_history.clear();
    }

    // ── Conversation switching ─────────────────────────────────

    /// Make `counterpart` the active conversation and request its history.
    pub fn switch_conversation(&mut self, counterpart: &str) {
        if let Some(previous) = self.active.take() {
            self.store.set_typing(&previous, false);
        }

        self.store.replace(counterpart, Vec::new());
        self.store.set_typing(counterpart, false);
        self.active = Some(counterpart.to_string());
        self.request_history(counterpart);
    }

    fn request_history(&mut self, counterpart: &str) {
        let request = OutboundEvent::RequestHistory(HistoryRequest {
            user1: self.self_id.clone(),
            user2: counterpart.to_string(),
        });
        match self.gateway.emit(request) {
            Ok(()) => {
                self.outstanding_history.push_back(counterpart.to_string());
                log::debug!("Requested history with {}", counterpart);
            }
            Err(e) => log::warn!("History request for {} dropped: {}", counterpart, e),
        }
    }

    /// Apply a history response. Returns whether it was applied; responses
    /// for a counterpart that is no longer active are discarded.
    ///
    /// An untagged response is attributed through its messages; only an
    /// empty one falls back to the oldest outstanding request.
    pub fn apply_history(&mut self, payload: HistoryPayload) -> bool {
        let (tag, wire_messages) = payload.into_parts();

        let mut messages: Vec<ChatMessage> = wire_messages
            .into_iter()
            .filter_map(|wire| match ChatMessage::from_history(wire, &self.self_id) {
                Ok(msg) => Some(msg),
                Err(e) => {
                    log::warn!("Dropping history entry: {}", e);
                    None
                }
            })
            .collect();

        let named = tag.or_else(|| messages.first().map(|m| m.counterpart().to_string()));
        let target = match named {
            Some(counterpart) => {
                if let Some(pos) = self
                    .outstanding_history
                    .iter()
                    .position(|c| *c == counterpart)
                {
                    self.outstanding_history.remove(pos);
                }
                Some(counterpart)
            }
            None => self.outstanding_history.pop_front(),
        };

        let Some(target) = target else {
            log::warn!("Discarding unsolicited history response");
            return false;
        };

        if self.active.as_deref() != Some(target.as_str()) {
            log::debug!("Discarding stale history response for {}", target);
            return false;
        }

        // unacknowledged sends survive a refetch
        messages.extend(
            self.store
                .messages(&target)
                .iter()
                .filter(|m| m.is_pending())
                .cloned(),
        );

        log::debug!("Loaded {} messages with {}", messages.len(), target);
        self.store.replace(&target, messages);
        true
    }

    // ── Sending ────────────────────────────────────────────────

    /// Optimistically append and emit a message to the active counterpart.
    ///
    /// Blank content, no active conversation, or a disconnected gateway make
    /// this a no-op. Returns the appended message.
    pub fn send(&mut self, content: &str, now: DateTime<Utc>) -> Option<ChatMessage> {
        if content.trim().is_empty() {
            return None;
        }
        let counterpart = self.active.clone()?;
        if !self.gateway.is_connected() {
            log::debug!("Send to {} skipped: channel unavailable", counterpart);
            return None;
        }

        let message = ChatMessage::outgoing(&self.self_id, &counterpart, content, now);
        self.store.append(&counterpart, message.clone());

        let payload = SendMessagePayload {
            to: counterpart.clone(),
            from: self.self_id.clone(),
            message: content.to_string(),
            client_temp_key: message.client_temp_key.clone(),
        };
        if let Err(e) = self.gateway.emit(OutboundEvent::SendMessage(payload)) {
            log::warn!("Message to {} left pending: {}", counterpart, e);
        }

        self.typing = TypingDebounce::default();
        self.emit_typing(&counterpart, false);

        Some(message)
    }

    // ── Typing ─────────────────────────────────────────────────

    /// Signal that the local user is typing. Emits "started" once per burst and
    /// (re)arms the idle timer.
    pub fn report_typing(&mut self, now: Instant) {
        let Some(counterpart) = self.active.clone() else {
            return;
        };
        if !self.gateway.is_connected() {
            return;
        }

        let armed_for = self.typing.target.as_deref();
        if armed_for != Some(counterpart.as_str()) {
            if let Some(previous) = self.typing.target.take() {
                self.emit_typing(&previous, false);
            }
            self.emit_typing(&counterpart, true);
            self.typing.target = Some(counterpart);
        }
        self.typing.deadline = Some(now + self.typing_idle);
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.typing.deadline
    }

    /// Fire the typing timer if it has elapsed.
    pub fn on_timer(&mut self, now: Instant) {
        if self.typing.deadline.is_some_and(|d| d <= now) {
            let debounce = std::mem::take(&mut self.typing);
            if let Some(target) = debounce.target {
                self.emit_typing(&target, false);
            }
        }
    }

    fn emit_typing(&self, to: &str, is_typing: bool) {
        let signal = TypingSignal {
            to: to.to_string(),
            from: self.self_id.clone(),
            is_typing,
        };
        if let Err(e) = self.gateway.emit(OutboundEvent::SetTyping(signal)) {
            log::debug!("Typing signal dropped: {}", e);
        }
    }

    // ── Inbound ────────────────────────────────────────────────

    /// Reconcile a send acknowledgment with its optimistic message.
    ///
    /// Matches by echoed temp key when present, otherwise the oldest pending
    /// message with equal content. Returns whether a message was updated.
    pub fn apply_ack(&mut self, ack: WireMessage) -> bool {
        if ack.receiver.trim().is_empty() {
            log::warn!("Dropping acknowledgment without receiver");
            return false;
        }
        let counterpart = ack.receiver.clone();

        let patch = MessagePatch {
            server_id: ack.server_id.clone(),
            created_at: ack.created_at,
            status: Some(ack.status.unwrap_or(MessageStatus::Sent)),
        };

        let key_known = ack.client_temp_key.as_deref().is_some_and(|key| {
            self.store
                .messages(&counterpart)
                .iter()
                .any(|m| m.client_temp_key.as_deref() == Some(key))
        });

        let matched = if key_known {
            let key = ack.client_temp_key.clone();
            self.store.update_in_place(
                &counterpart,
                |m| m.is_pending() && m.client_temp_key == key,
                &patch,
            )
        } else {
            let content = ack.content.clone();
            self.store.update_in_place(
                &counterpart,
                |m| m.is_pending() && m.direction == Direction::Sent && m.content == content,
                &patch,
            )
        };

        if matched {
            log::debug!(
                "Reconciled message to {} as {:?}",
                counterpart,
                ack.server_id
            );
        } else {
            log::debug!(
                "No pending message to {} for acknowledgment {:?}; ignoring",
                counterpart,
                ack.server_id
            );
        }
        matched
    }

    /// Offer a pushed message to the active conversation. Returns whether it
    /// was appended (only when its sender is the active counterpart).
    pub fn accept_push(&mut self, message: &ChatMessage) -> bool {
        if self.active.as_deref() != Some(message.sender.as_str()) {
            return false;
        }
        if message.server_id.is_some()
            && self
                .store
                .messages(&message.sender)
                .iter()
                .any(|m| m.server_id == message.server_id)
        {
            log::debug!("Ignoring duplicate push {:?}", message.server_id);
            return false;
        }
        self.store.append(&message.sender, message.clone());
        self.store.set_typing(&message.sender, false);
        true
    }

    /// Only the active counterpart's typing state is displayed.
    pub fn apply_typing(&mut self, signal: &TypingSignal) {
        if self.active.as_deref() == Some(signal.from.as_str()) {
            self.store.set_typing(&signal.from, signal.is_typing);
        }
    }
}
