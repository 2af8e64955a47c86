use std::collections::HashMap;

use super::chat_types::{ChatMessage, MessageStatus};

/// A conversation with one counterpart.
#[derive(Debug, Clone, Default)]
pub struct Conversation {
    /// Insertion order is arrival/send order, not timestamp order
    pub messages: Vec<ChatMessage>,
    pub typing: bool,
}

/// Fields an in-place update may set. `None` leaves the field untouched.
#[derive(Debug, Clone, Default)]
pub struct MessagePatch {
    pub server_id: Option<String>,
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
    pub status: Option<MessageStatus>,
}

impl MessagePatch {
    fn apply(&self, msg: &mut ChatMessage) {
        if let Some(ref id) = self.server_id {
            msg.server_id = Some(id.clone());
        }
        if let Some(at) = self.created_at {
            msg.created_at = at;
        }
        if let Some(status) = self.status {
            msg.status = msg.status.advance(status);
        }
    }
}

/// Per-counterpart message sequences. Exclusive owner of message objects.
#[derive(Debug, Default)]
pub struct ConversationStore {
    conversations: HashMap<String, Conversation>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace a conversation's messages wholesale.
    pub fn replace(&mut self, counterpart: &str, messages: Vec<ChatMessage>) {
        let conv = self.entry(counterpart);
        conv.messages = messages;
    }

    pub fn append(&mut self, counterpart: &str, message: ChatMessage) {
        self.entry(counterpart).messages.push(message);
    }

    /// Patch the first message matching `predicate`, keeping its position.
    /// Returns whether a message matched.
    pub fn update_in_place<P>(&mut self, counterpart: &str, predicate: P, patch: &MessagePatch) -> bool
    where
        P: Fn(&ChatMessage) -> bool,
    {
        let Some(conv) = self.conversations.get_mut(counterpart) else {
            return false;
        };
        match conv.messages.iter_mut().find(|m| predicate(m)) {
            Some(msg) => {
                patch.apply(msg);
                true
            }
            None => false,
        }
    }

    pub fn set_typing(&mut self, counterpart: &str, typing: bool) {
        self.entry(counterpart).typing = typing;
    }

    pub fn messages(&self, counterpart: &str) -> &[ChatMessage] {
        self.conversations
            .get(counterpart)
            .map(|c| c.messages.as_slice())
            .unwrap_or(&[])
    }

    pub fn is_typing(&self, counterpart: &str) -> bool {
        self.conversations
            .get(counterpart)
            .is_some_and(|c| c.typing)
    }

    pub fn conversation_count(&self) -> usize {
        self.conversations.len()
    }

    fn entry(&mut self, counterpart: &str) -> &mut Conversation {
        self.conversations
            .entry(counterpart.to_string())
            .or_default()
    }
}
