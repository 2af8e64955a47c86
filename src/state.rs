use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::commands::UserCommand;
use crate::error::{ParleyError, Result};
use crate::services::chat_service::{ChatService, ClientSnapshot};
use crate::services::chat_types::InboundEvent;
use crate::services::directory_api::DirectoryApi;
use crate::services::session::{run_session, EventSender, SessionEvent};

/// Owned handle to a running session. Opening spawns the event loop; closing
/// stops it and returns the final client state.
pub struct SessionHandle {
    events: EventSender,
    task: Option<JoinHandle<ChatService>>,
}

impl SessionHandle {
    pub fn open(chat: ChatService, api: Arc<dyn DirectoryApi>, roster_refresh: Duration) -> Self {
        let (events, rx) = mpsc::unbounded_channel();
        let weak = events.downgrade();
        let task = tokio::spawn(run_session(chat, api, weak, rx, roster_refresh));
        Self {
            events,
            task: Some(task),
        }
    }

    pub fn post_inbound(&self, event: InboundEvent) -> Result<()> {
        self.post(SessionEvent::Inbound(event))
    }

    pub fn command(&self, command: UserCommand) -> Result<()> {
        self.post(SessionEvent::Command(command))
    }

    /// Current client state, after every event posted so far was processed.
    pub async fn snapshot(&self, query: Option<String>) -> Result<ClientSnapshot> {
        let (reply, rx) = oneshot::channel();
        self.post(SessionEvent::Snapshot { query, reply })?;
        rx.await.map_err(|_| ParleyError::ChannelUnavailable)
    }

    /// Stop the loop. Returns `None` if it was already gone or panicked.
    pub async fn close(mut self) -> Option<ChatService> {
        let _ = self.events.send(SessionEvent::Shutdown);
        let task = self.task.take()?;
        match task.await {
            Ok(chat) => Some(chat),
            Err(e) => {
                log::error!("Session task failed: {}", e);
                None
            }
        }
    }

    fn post(&self, event: SessionEvent) -> Result<()> {
        self.events
            .send(event)
            .map_err(|_| ParleyError::ChannelUnavailable)
    }
}
