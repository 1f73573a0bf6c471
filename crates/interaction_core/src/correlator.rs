//! One-shot suspension on top of the shared [`EventHub`].
//!
//! A waiter is registered for exactly one `await_event` call. It resolves
//! with the first event that belongs to its subject, satisfies its predicate
//! and (when an owner is set) comes from the owner; or with
//! [`Suspension::TimedOut`] once its deadline passes. Either way the listener
//! and registry entry are gone before the caller's continuation runs.
//!
//! Events from anyone other than the owner are intercepted: they get a short
//! ephemeral notice and the waiter keeps waiting against the same deadline.

use std::{sync::Arc, time::Duration};

use dashmap::DashMap;
use shared::{
    domain::{ChannelId, EventId, SentMessage, Subject, UserId},
    protocol::{EventPayload, InboundEvent, OutboundMessage},
};
use tokio::time::{timeout_at, Instant};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    error::FlowError,
    events::{EventHub, Listener},
    responder::Responder,
};

pub const DEFAULT_REJECTION_NOTICE: &str = "These controls belong to someone else.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WaiterId(Uuid);

impl WaiterId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for WaiterId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Outcome of a suspension point. A timeout is a designed outcome, not an error.
#[derive(Debug, Clone, PartialEq)]
pub enum Suspension {
    Resumed(InboundEvent),
    TimedOut,
}

impl Suspension {
    pub fn into_event(self) -> Option<InboundEvent> {
        match self {
            Suspension::Resumed(event) => Some(event),
            Suspension::TimedOut => None,
        }
    }

    pub fn is_timed_out(&self) -> bool {
        matches!(self, Suspension::TimedOut)
    }
}

#[derive(Debug, Clone, Default)]
pub struct AwaitOptions {
    /// Absolute deadline; `None` waits until an event matches.
    pub deadline: Option<Instant>,
    pub subject: Option<Subject>,
    /// Resolve the subject lazily from the reply sent to this event.
    pub reply_to: Option<EventId>,
    /// Only this user may resolve the waiter.
    pub owner: Option<UserId>,
}

impl AwaitOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn within(self, timeout: Duration) -> Self {
        self.until(Instant::now() + timeout)
    }

    pub fn until(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn deadline(mut self, deadline: Option<Instant>) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn on(mut self, subject: Subject) -> Self {
        self.subject = Some(subject);
        self
    }

    pub fn replying_to(mut self, event: EventId) -> Self {
        self.reply_to = Some(event);
        self
    }

    pub fn owned_by(mut self, owner: UserId) -> Self {
        self.owner = Some(owner);
        self
    }
}

#[derive(Debug)]
struct WaiterMeta {
    subject: Subject,
    deadline: Option<Instant>,
}

/// Removes the registry entry on every exit path, including cancellation of
/// the awaiting future.
struct WaiterGuard {
    id: WaiterId,
    registry: Arc<DashMap<WaiterId, WaiterMeta>>,
}

impl Drop for WaiterGuard {
    fn drop(&mut self) {
        self.registry.remove(&self.id);
    }
}

#[derive(Clone)]
pub struct Correlator {
    hub: EventHub,
    responder: Arc<dyn Responder>,
    waiters: Arc<DashMap<WaiterId, WaiterMeta>>,
    rejection_notice: Arc<str>,
}

impl Correlator {
    pub fn new(hub: EventHub, responder: Arc<dyn Responder>) -> Self {
        Self {
            hub,
            responder,
            waiters: Arc::new(DashMap::new()),
            rejection_notice: Arc::from(DEFAULT_REJECTION_NOTICE),
        }
    }

    pub fn with_rejection_notice(mut self, notice: impl Into<String>) -> Self {
        self.rejection_notice = Arc::from(notice.into());
        self
    }

    pub fn hub(&self) -> &EventHub {
        &self.hub
    }

    pub fn responder(&self) -> &Arc<dyn Responder> {
        &self.responder
    }

    /// Number of suspensions currently registered.
    pub fn active_waiters(&self) -> usize {
        self.waiters.len()
    }

    /// Earliest deadline among registered waiters, if any has one.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.waiters
            .iter()
            .filter_map(|entry| entry.value().deadline)
            .min()
    }

    pub async fn await_event<P>(
        &self,
        predicate: P,
        options: AwaitOptions,
    ) -> Result<Suspension, FlowError>
    where
        P: Fn(&InboundEvent) -> bool + Send + Sync,
    {
        let subject = self.resolve_subject(&options).await?;

        let id = WaiterId::new();
        let mut listener = self.hub.subscribe();
        self.waiters.insert(
            id,
            WaiterMeta {
                subject,
                deadline: options.deadline,
            },
        );
        let guard = WaiterGuard {
            id,
            registry: self.waiters.clone(),
        };
        debug!(waiter_id = %id, ?subject, has_deadline = options.deadline.is_some(), "waiter registered");

        let matched = self.first_match(&mut listener, &subject, options.owner, &predicate);
        let outcome = match options.deadline {
            Some(deadline) => match timeout_at(deadline, matched).await {
                Ok(event) => Suspension::Resumed(event?),
                Err(_) => Suspension::TimedOut,
            },
            None => Suspension::Resumed(matched.await?),
        };

        drop(listener);
        drop(guard);
        debug!(waiter_id = %id, timed_out = outcome.is_timed_out(), "waiter resolved");
        Ok(outcome)
    }

    /// Waits for a button press or menu selection on `message` whose id is in `custom_ids`.
    pub async fn await_component(
        &self,
        message: &SentMessage,
        owner: UserId,
        custom_ids: &[&str],
        deadline: Option<Instant>,
    ) -> Result<Suspension, FlowError> {
        let custom_ids: Vec<String> = custom_ids.iter().map(|id| id.to_string()).collect();
        self.await_event(
            move |event| {
                matches!(
                    event.payload,
                    EventPayload::Button { .. } | EventPayload::Select { .. }
                ) && event
                    .custom_id()
                    .is_some_and(|id| custom_ids.iter().any(|wanted| wanted == id))
            },
            AwaitOptions::new()
                .on(message.subject())
                .owned_by(owner)
                .deadline(deadline),
        )
        .await
    }

    /// Waits for the form identified by `form_id` on `message` to be submitted.
    pub async fn await_submission(
        &self,
        message: &SentMessage,
        owner: UserId,
        form_id: &str,
        deadline: Option<Instant>,
    ) -> Result<Suspension, FlowError> {
        let form_id = form_id.to_string();
        self.await_event(
            move |event| {
                matches!(&event.payload, EventPayload::Submission { custom_id, .. } if *custom_id == form_id)
            },
            AwaitOptions::new()
                .on(message.subject())
                .owned_by(owner)
                .deadline(deadline),
        )
        .await
    }

    /// Waits for `owner` to post a message in `channel`. Other authors are
    /// ignored rather than rejected: in a side channel they are the bot itself.
    pub async fn await_follow_up_message(
        &self,
        channel: ChannelId,
        owner: UserId,
        deadline: Option<Instant>,
    ) -> Result<Suspension, FlowError> {
        self.await_event(
            move |event| {
                event.user_id == owner && matches!(event.payload, EventPayload::Message { .. })
            },
            AwaitOptions::new()
                .on(Subject::Channel(channel))
                .deadline(deadline),
        )
        .await
    }

    async fn resolve_subject(&self, options: &AwaitOptions) -> Result<Subject, FlowError> {
        if let Some(subject) = options.subject {
            return Ok(subject);
        }

        let Some(event) = options.reply_to else {
            return Err(FlowError::precondition(
                "suspension has neither a subject nor an event to resolve one from",
            ));
        };

        match self
            .responder
            .fetch_reply(event)
            .await
            .map_err(FlowError::Responder)?
        {
            Some(sent) => Ok(sent.subject()),
            None => Err(FlowError::precondition(format!(
                "no reply has been sent for event {event}; send a message before awaiting on it"
            ))),
        }
    }

    async fn first_match<P>(
        &self,
        listener: &mut Listener,
        subject: &Subject,
        owner: Option<UserId>,
        predicate: &P,
    ) -> Result<InboundEvent, FlowError>
    where
        P: Fn(&InboundEvent) -> bool + Send + Sync,
    {
        loop {
            let event = listener.next().await?;
            if !event.belongs_to(subject) || !predicate(&event) {
                continue;
            }

            if let Some(owner) = owner {
                if event.user_id != owner {
                    self.reject_foreign(&event).await;
                    continue;
                }
            }

            return Ok(event);
        }
    }

    async fn reject_foreign(&self, event: &InboundEvent) {
        debug!(event_id = %event.id, user_id = %event.user_id, "intercepted event from non-owner");
        let notice = OutboundMessage::ephemeral(self.rejection_notice.to_string());
        if let Err(err) = self.responder.reply_ephemeral(event, notice).await {
            warn!(event_id = %event.id, error = %err, "failed to send rejection notice");
        }
    }
}

#[cfg(test)]
#[path = "tests/correlator_tests.rs"]
mod tests;
