//! Session event loop.
//!
//! One task owns the `ChatService` and processes events one at a time: gateway
//! pushes, user commands, fetch completions and timer expiries. Network fetches
//! run in their own tasks and report back through the same queue.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;

use super::chat_service::{ChatService, ClientSnapshot};
use super::chat_types::{InboundEvent, RosterUser, UnreadCount};
use super::directory_api::DirectoryApi;
use crate::commands::UserCommand;
use crate::error::Result;

pub enum SessionEvent {
    Inbound(InboundEvent),
    Command(UserCommand),
    RosterFetched(Result<Vec<RosterUser>>),
    UnreadFetched(Result<Vec<UnreadCount>>),
    Snapshot {
        query: Option<String>,
        reply: oneshot::Sender<ClientSnapshot>,
    },
    Shutdown,
}

pub type EventSender = mpsc::UnboundedSender<SessionEvent>;

/// Drive `chat` until `Shutdown` arrives or every sender is dropped, then hand
/// the final state back. The loop only holds `weak_tx`, so dropping the last
/// external sender closes the queue.
pub async fn run_session(
    mut chat: ChatService,
    api: Arc<dyn DirectoryApi>,
    weak_tx: mpsc::WeakUnboundedSender<SessionEvent>,
    mut events: mpsc::UnboundedReceiver<SessionEvent>,
    roster_refresh: Duration,
) -> ChatService {
    let self_id = chat.self_id().to_string();

    if let Some(tx) = weak_tx.upgrade() {
        spawn_fetch(&tx, {
            let api = api.clone();
            async move { SessionEvent::UnreadFetched(api.fetch_unread(&self_id).await) }
        });
    }

    let mut roster_tick = tokio::time::interval(roster_refresh);
    roster_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    log::info!("Session started for {}", chat.self_id());

    loop {
        let deadline = chat.next_deadline();
        tokio::select! {
            event = events.recv() => match event {
                None | Some(SessionEvent::Shutdown) => break,
                Some(event) => handle(&mut chat, event, Instant::now()),
            },
            _ = wait_until(deadline) => chat.on_timer(Instant::now()),
            _ = roster_tick.tick() => {
                if let Some(tx) = weak_tx.upgrade() {
                    let api = api.clone();
                    spawn_fetch(&tx, async move {
                        SessionEvent::RosterFetched(api.fetch_roster().await)
                    });
                }
            }
        }
    }

    log::info!("Session for {} closed", chat.self_id());
    chat
}

fn handle(chat: &mut ChatService, event: SessionEvent, now: Instant) {
    match event {
        SessionEvent::Inbound(inbound) => chat.handle_event(inbound, now),
        SessionEvent::Command(command) => command.apply(chat, now),
        SessionEvent::RosterFetched(Ok(users)) => chat.apply_roster(users),
        SessionEvent::RosterFetched(Err(e)) => log::warn!("Roster refresh failed: {}", e),
        SessionEvent::UnreadFetched(Ok(counts)) => chat.apply_unread(counts, now),
        SessionEvent::UnreadFetched(Err(e)) => log::warn!("Unread fetch failed: {}", e),
        SessionEvent::Snapshot { query, reply } => {
            let _ = reply.send(chat.snapshot(query.as_deref()));
        }
        SessionEvent::Shutdown => {}
    }
}

fn spawn_fetch<F>(tx: &EventSender, fetch: F)
where
    F: Future<Output = SessionEvent> + Send + 'static,
{
    let tx = tx.clone();
    tokio::spawn(async move {
        let _ = tx.send(fetch.await);
    });
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}
