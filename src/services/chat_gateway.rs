//! Connection gateway contract.
//!
//! The transport itself (socket setup, reconnect backoff) lives outside this
//! crate. The engine only needs to know whether the channel is up and to hand
//! it typed outbound events.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

use super::chat_types::OutboundEvent;
use crate::error::{ParleyError, Result};

#[cfg_attr(test, mockall::automock)]
pub trait Gateway: Send + Sync {
    fn is_connected(&self) -> bool;

    /// Queue an event for delivery. Never blocks.
    fn emit(&self, event: OutboundEvent) -> Result<()>;
}

pub type SharedGateway = Arc<dyn Gateway>;

/// In-process gateway backed by an unbounded channel.
///
/// Whoever drives the real transport owns the receiving half and flips the
/// connected flag as the underlying channel comes and goes.
#[derive(Clone)]
pub struct ChannelGateway {
    tx: mpsc::UnboundedSender<OutboundEvent>,
    connected: Arc<AtomicBool>,
}

impl ChannelGateway {
    /// Open a gateway in the disconnected state.
    pub fn open() -> (Self, mpsc::UnboundedReceiver<OutboundEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                tx,
                connected: Arc::new(AtomicBool::new(false)),
            },
            rx,
        )
    }

    pub fn set_connected(&self, connected: bool) {
        let was = self.connected.swap(connected, Ordering::SeqCst);
        if was != connected {
            log::info!(
                "Gateway {}",
                if connected { "connected" } else { "disconnected" }
            );
        }
    }

    /// Mark the channel closed. Further emits fail with `ChannelUnavailable`.
    pub fn close(&self) {
        self.set_connected(false);
    }
}

impl Gateway for ChannelGateway {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn emit(&self, event: OutboundEvent) -> Result<()> {
        if !self.is_connected() {
            return Err(ParleyError::ChannelUnavailable);
        }
        self.tx
            .send(event)
            .map_err(|_| ParleyError::ChannelUnavailable)
    }
}
