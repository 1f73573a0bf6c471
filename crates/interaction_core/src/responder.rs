//! Outbound collaborators: the platform responder, the side channel used by
//! retry sub-flows, and the renderers/publishers the wizard delegates to.

use async_trait::async_trait;
use dashmap::DashSet;
use shared::{
    domain::{EventId, SentMessage, Target, UserId},
    draft::{Draft, PublishedRef},
    protocol::{InboundEvent, OutboundMessage},
};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ResponderError {
    #[error("event {0} was already acknowledged")]
    AlreadyAcknowledged(EventId),
    #[error("responder unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait Responder: Send + Sync {
    async fn send(&self, target: Target, payload: OutboundMessage) -> anyhow::Result<SentMessage>;
    async fn edit_existing(
        &self,
        message: &SentMessage,
        payload: OutboundMessage,
    ) -> anyhow::Result<()>;
    /// Acknowledges `event`. A second acknowledgement of the same event must
    /// fail with [`ResponderError::AlreadyAcknowledged`].
    async fn acknowledge(&self, event: &InboundEvent) -> anyhow::Result<()>;
    /// Private reply to `event`; counts as its acknowledgement.
    async fn reply_ephemeral(
        &self,
        event: &InboundEvent,
        payload: OutboundMessage,
    ) -> anyhow::Result<()>;
    /// The message sent in reply to `event`, if there is one yet.
    async fn fetch_reply(&self, event: EventId) -> anyhow::Result<Option<SentMessage>>;
}

/// Bookkeeping for [`Responder::acknowledge`] implementations.
#[derive(Debug, Default)]
pub struct AckLedger {
    acknowledged: DashSet<EventId>,
}

impl AckLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark(&self, event: EventId) -> Result<(), ResponderError> {
        if self.acknowledged.insert(event) {
            Ok(())
        } else {
            Err(ResponderError::AlreadyAcknowledged(event))
        }
    }

    pub fn is_acknowledged(&self, event: EventId) -> bool {
        self.acknowledged.contains(&event)
    }
}

#[derive(Debug, Error)]
pub enum DeliveryError {
    /// The user cannot be reached (closed DMs, blocked bot). Recoverable.
    #[error("delivery blocked: {0}")]
    Blocked(String),
    #[error(transparent)]
    Failed(#[from] anyhow::Error),
}

#[async_trait]
pub trait SideChannel: Send + Sync {
    async fn send_to_side_channel(
        &self,
        owner: UserId,
        payload: OutboundMessage,
    ) -> Result<SentMessage, DeliveryError>;
}

/// Renders drafts for the preview step.
pub trait DraftFormatter: Send + Sync {
    fn preview(&self, draft: &Draft) -> OutboundMessage;
    /// How a third party will see the published draft.
    fn public_view(&self, draft: &Draft) -> OutboundMessage;
}

/// Owns the published rendering of a draft.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, draft: &Draft) -> anyhow::Result<PublishedRef>;
    async fn update(&self, published: &PublishedRef, draft: &Draft) -> anyhow::Result<()>;
}
