use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ParleyError, Result};

/// Synthetic sender used for client-generated notifications.
pub const SYSTEM_SENDER: &str = "System";

// ── Message model ──────────────────────────────────────────────

/// Delivery status of a message. Ordered; a message's status only moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum MessageStatus {
    /// Optimistically appended, awaiting acknowledgment
    #[serde(rename = "sending", alias = "pending")]
    Pending,
    /// Confirmed by the remote store
    #[serde(rename = "sent", alias = "confirmed")]
    Sent,
    #[serde(rename = "delivered")]
    Delivered,
    #[serde(rename = "read")]
    Read,
}

impl MessageStatus {
    /// Merge an incoming status without ever regressing.
    pub fn advance(self, incoming: MessageStatus) -> MessageStatus {
        self.max(incoming)
    }
}

/// Whether the local user sent or received a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Sent,
    Received,
}

/// Message as it travels over the channel. Every field is optional on the
/// wire; `ChatMessage` conversions enforce what is required.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireMessage {
    #[serde(
        rename = "_id",
        alias = "serverId",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub server_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_temp_key: Option<String>,
    #[serde(default)]
    pub sender: String,
    #[serde(default)]
    pub receiver: String,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub direction: Option<Direction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<MessageStatus>,
}

impl WireMessage {
    /// Reject payloads missing the fields every message must carry.
    pub fn validate(&self) -> Result<()> {
        if self.sender.trim().is_empty() {
            return Err(ParleyError::MalformedEvent(
                "message without sender".to_string(),
            ));
        }
        if self.content.trim().is_empty() {
            return Err(ParleyError::MalformedEvent(format!(
                "message from {} without content",
                self.sender
            )));
        }
        Ok(())
    }
}

/// A message held by the conversation store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    /// Assigned by the remote store; absent while pending
    pub server_id: Option<String>,
    /// Locally generated, used only to match acknowledgments
    pub client_temp_key: Option<String>,
    pub sender: String,
    pub receiver: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub direction: Direction,
    pub status: MessageStatus,
}

impl ChatMessage {
    /// Build an optimistic outgoing message.
    pub fn outgoing(sender: &str, receiver: &str, content: &str, now: DateTime<Utc>) -> Self {
        Self {
            server_id: None,
            client_temp_key: Some(uuid::Uuid::new_v4().to_string()),
            sender: sender.to_string(),
            receiver: receiver.to_string(),
            content: content.to_string(),
            created_at: now,
            direction: Direction::Sent,
            status: MessageStatus::Pending,
        }
    }

    /// Convert a history record. Direction comes from comparing the recorded
    /// sender with the local user; a missing status means `Read`.
    pub fn from_history(wire: WireMessage, self_id: &str) -> Result<Self> {
        wire.validate()?;
        let direction = if wire.sender == self_id {
            Direction::Sent
        } else {
            Direction::Received
        };
        Ok(Self {
            server_id: wire.server_id,
            client_temp_key: wire.client_temp_key,
            created_at: wire.created_at.unwrap_or_else(Utc::now),
            direction,
            status: wire.status.unwrap_or(MessageStatus::Read),
            sender: wire.sender,
            receiver: wire.receiver,
            content: wire.content,
        })
    }

    /// Convert a pushed message from the counterpart.
    pub fn from_push(wire: WireMessage) -> Result<Self> {
        wire.validate()?;
        Ok(Self {
            server_id: wire.server_id,
            client_temp_key: None,
            created_at: wire.created_at.unwrap_or_else(Utc::now),
            direction: Direction::Received,
            status: MessageStatus::Delivered,
            sender: wire.sender,
            receiver: wire.receiver,
            content: wire.content,
        })
    }

    pub fn is_pending(&self) -> bool {
        self.status == MessageStatus::Pending
    }

    /// The other participant of the conversation this message belongs to.
    pub fn counterpart(&self) -> &str {
        match self.direction {
            Direction::Sent => &self.receiver,
            Direction::Received => &self.sender,
        }
    }
}

// ── Directory records ──────────────────────────────────────────

/// One user from the roster snapshot endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterUser {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(alias = "identity")]
    pub username: String,
    #[serde(default, alias = "online")]
    pub is_online: bool,
    #[serde(default)]
    pub last_seen: Option<DateTime<Utc>>,
    /// Milliseconds since the epoch
    #[serde(default)]
    pub last_message_at: Option<i64>,
}

/// Aggregate unread count for one sender.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnreadCount {
    #[serde(rename = "_id", alias = "senderIdentity")]
    pub sender: String,
    pub count: u32,
}

// ── Channel payloads ───────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceStatus {
    Online,
    Offline,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceDelta {
    #[serde(alias = "identity")]
    pub username: String,
    pub status: PresenceStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingSignal {
    pub to: String,
    pub from: String,
    pub is_typing: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRequest {
    pub user1: String,
    pub user2: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessagePayload {
    pub to: String,
    pub from: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_temp_key: Option<String>,
}

/// History response; servers may or may not tag it with the counterpart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HistoryPayload {
    Tagged {
        counterpart: String,
        messages: Vec<WireMessage>,
    },
    Bare(Vec<WireMessage>),
}

impl HistoryPayload {
    pub fn into_parts(self) -> (Option<String>, Vec<WireMessage>) {
        match self {
            HistoryPayload::Tagged {
                counterpart,
                messages,
            } => (Some(counterpart), messages),
            HistoryPayload::Bare(messages) => (None, messages),
        }
    }
}

// ── Typed events ───────────────────────────────────────────────

/// Events pushed by the gateway, including its connection lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum InboundEvent {
    #[serde(rename = "connect")]
    Connected,
    #[serde(rename = "disconnect")]
    Disconnected,
    #[serde(rename = "chatHistoryLoaded")]
    HistoryLoaded(HistoryPayload),
    #[serde(rename = "messageSent")]
    MessageAcknowledged(WireMessage),
    #[serde(rename = "receiveMessage")]
    MessageReceived(WireMessage),
    #[serde(rename = "userTyping")]
    TypingChanged(TypingSignal),
    #[serde(rename = "onlineUsersList")]
    PresenceSnapshot(Vec<String>),
    #[serde(rename = "userStatusChange")]
    PresenceDelta(PresenceDelta),
}

/// Events the client emits through the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum OutboundEvent {
    #[serde(rename = "loadChatHistory")]
    RequestHistory(HistoryRequest),
    #[serde(rename = "sendMessage")]
    SendMessage(SendMessagePayload),
    #[serde(rename = "typing")]
    SetTyping(TypingSignal),
    #[serde(rename = "join")]
    AnnouncePresence(String),
}

/// Decode one inbound frame. Anything that does not parse is `MalformedEvent`.
pub fn decode_inbound(frame: &str) -> Result<InboundEvent> {
    serde_json::from_str(frame).map_err(|e| ParleyError::MalformedEvent(e.to_string()))
}

pub fn encode_outbound(event: &OutboundEvent) -> Result<String> {
    Ok(serde_json::to_string(event)?)
}
