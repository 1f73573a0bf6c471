//! Push-based event source shared by every suspension in the process.
//!
//! Subscribing is the `on` half of the listener contract and dropping the
//! returned [`Listener`] is the `off` half, so a listener cannot outlive the
//! scope that registered it.

use shared::protocol::InboundEvent;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::warn;

use crate::error::FlowError;

const DEFAULT_CAPACITY: usize = 1024;

#[derive(Clone)]
pub struct EventHub {
    sender: broadcast::Sender<InboundEvent>,
}

impl EventHub {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Delivers `event` to every live listener and returns how many saw it.
    pub fn emit(&self, event: InboundEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    pub fn subscribe(&self) -> Listener {
        Listener {
            receiver: self.sender.subscribe(),
        }
    }

    pub fn listener_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventHub")
            .field("listener_count", &self.listener_count())
            .finish()
    }
}

pub struct Listener {
    receiver: broadcast::Receiver<InboundEvent>,
}

impl Listener {
    /// Next event emitted after this listener was registered.
    ///
    /// Lagging is logged and skipped; events that were overwritten are simply
    /// not seen, which is the same outcome as arriving before registration.
    pub async fn next(&mut self) -> Result<InboundEvent, FlowError> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Ok(event),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "event listener lagged, events were dropped");
                }
                Err(RecvError::Closed) => return Err(FlowError::SourceClosed),
            }
        }
    }
}
