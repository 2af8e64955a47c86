use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::services::chat_service::{ChatService, ClientSnapshot};

// ── User actions ──────────────────────────────────────────────

/// An action taken by the local user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum UserCommand {
    SelectUser { identity: String },
    Send { content: String },
    Typing,
    SetVisible { visible: bool },
}

impl UserCommand {
    pub fn apply(self, chat: &mut ChatService, now: Instant) {
        match self {
            UserCommand::SelectUser { identity } => chat.select_user(&identity),
            UserCommand::Send { content } => {
                if chat.send(&content).is_none() {
                    log::debug!("Send ignored");
                }
            }
            UserCommand::Typing => chat.report_typing(now),
            UserCommand::SetVisible { visible } => chat.set_visible(visible),
        }
    }
}

// ── Views ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "view", rename_all = "camelCase")]
pub enum ViewRequest {
    /// Full client state; `query` filters the roster
    Snapshot {
        #[serde(default)]
        query: Option<String>,
    },
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "view", content = "data", rename_all = "camelCase")]
pub enum ViewResponse {
    Snapshot(ClientSnapshot),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_commands() {
        let cmd: UserCommand =
            serde_json::from_str(r#"{"action":"selectUser","identity":"bob"}"#).unwrap();
        assert_eq!(
            cmd,
            UserCommand::SelectUser {
                identity: "bob".to_string()
            }
        );

        let cmd: UserCommand = serde_json::from_str(r#"{"action":"typing"}"#).unwrap();
        assert_eq!(cmd, UserCommand::Typing);

        let cmd: UserCommand =
            serde_json::from_str(r#"{"action":"setVisible","visible":false}"#).unwrap();
        assert_eq!(cmd, UserCommand::SetVisible { visible: false });
    }

    #[test]
    fn test_decode_view_without_query() {
        let view: ViewRequest = serde_json::from_str(r#"{"view":"snapshot"}"#).unwrap();
        assert_eq!(view, ViewRequest::Snapshot { query: None });
    }

    #[test]
    fn test_event_frame_is_not_a_command() {
        assert!(serde_json::from_str::<UserCommand>(r#"{"event":"connect"}"#).is_err());
    }
}
