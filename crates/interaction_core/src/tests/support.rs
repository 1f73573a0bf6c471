//! Recording fakes for the outbound collaborators plus event builders.

use std::{
    collections::{BTreeMap, HashMap, VecDeque},
    sync::{
        atomic::{AtomicI64, AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use shared::{
    domain::{ChannelId, EventId, MessageId, SentMessage, Target, UserId},
    draft::{Draft, PublishedRef},
    protocol::{EventPayload, InboundEvent, OutboundMessage},
};

use crate::{
    correlator::Correlator,
    events::EventHub,
    responder::{AckLedger, DeliveryError, DraftFormatter, Publisher, Responder, SideChannel},
};

pub const OWNER: UserId = UserId(100);
pub const STRANGER: UserId = UserId(200);
pub const CHANNEL: ChannelId = ChannelId(10);
pub const DM_CHANNEL: ChannelId = ChannelId(77);

static NEXT_EVENT_ID: AtomicI64 = AtomicI64::new(1);

pub fn next_event_id() -> EventId {
    EventId(NEXT_EVENT_ID.fetch_add(1, Ordering::Relaxed))
}

pub fn button(user: UserId, message: &SentMessage, custom_id: &str) -> InboundEvent {
    InboundEvent::new(
        next_event_id(),
        user,
        message.channel_id,
        Some(message.message_id),
        EventPayload::Button {
            custom_id: custom_id.to_string(),
        },
    )
}

pub fn select(user: UserId, message: &SentMessage, custom_id: &str, value: &str) -> InboundEvent {
    InboundEvent::new(
        next_event_id(),
        user,
        message.channel_id,
        Some(message.message_id),
        EventPayload::Select {
            custom_id: custom_id.to_string(),
            values: vec![value.to_string()],
        },
    )
}

pub fn submission(
    user: UserId,
    message: &SentMessage,
    custom_id: &str,
    fields: &[(&str, &str)],
) -> InboundEvent {
    InboundEvent::new(
        next_event_id(),
        user,
        message.channel_id,
        Some(message.message_id),
        EventPayload::Submission {
            custom_id: custom_id.to_string(),
            fields: fields
                .iter()
                .map(|(key, value)| (key.to_string(), value.to_string()))
                .collect::<BTreeMap<_, _>>(),
        },
    )
}

pub fn channel_message(user: UserId, channel: ChannelId, content: &str) -> InboundEvent {
    InboundEvent::new(
        next_event_id(),
        user,
        channel,
        None,
        EventPayload::Message {
            content: content.to_string(),
            attachments: Vec::new(),
        },
    )
}

pub fn with_attachments(mut event: InboundEvent, urls: &[&str]) -> InboundEvent {
    if let EventPayload::Message { attachments, .. } = &mut event.payload {
        *attachments = urls.iter().map(|url| url.to_string()).collect();
    }
    event
}

/// Lets spawned flows run until `condition` holds. Time does not advance
/// while this spins, so deadlines cannot fire underneath it.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..10_000 {
        if condition() {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("condition not reached");
}

/// Real-clock variant of [`wait_until`] for flows that also wait on SQLite.
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    for _ in 0..1_000 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached within 5s");
}

pub async fn settle() {
    for _ in 0..100 {
        tokio::task::yield_now().await;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Send {
        target: Target,
        payload: OutboundMessage,
        message: SentMessage,
    },
    Edit {
        message: SentMessage,
        payload: OutboundMessage,
    },
    Ack(EventId),
    Ephemeral {
        event: EventId,
        payload: OutboundMessage,
    },
}

#[derive(Default)]
pub struct RecordingResponder {
    next_message_id: AtomicI64,
    calls: Mutex<Vec<Call>>,
    replies: Mutex<HashMap<EventId, SentMessage>>,
    ledger: AckLedger,
}

impl RecordingResponder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            next_message_id: AtomicI64::new(1000),
            ..Self::default()
        })
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().expect("calls").clone()
    }

    pub fn sent(&self) -> Vec<(SentMessage, OutboundMessage)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Send {
                    message, payload, ..
                } => Some((message, payload)),
                _ => None,
            })
            .collect()
    }

    pub fn send_count(&self) -> usize {
        self.sent().len()
    }

    /// Most recent message whose payload carries a component with `custom_id`.
    pub fn last_with_component(&self, custom_id: &str) -> Option<SentMessage> {
        self.sent()
            .into_iter()
            .rev()
            .find(|(_, payload)| payload.has_component(custom_id))
            .map(|(message, _)| message)
    }

    pub fn edits_of(&self, message: &SentMessage) -> Vec<OutboundMessage> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Edit {
                    message: edited,
                    payload,
                } if edited == *message => Some(payload),
                _ => None,
            })
            .collect()
    }

    pub fn ephemerals(&self) -> Vec<OutboundMessage> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Ephemeral { payload, .. } => Some(payload),
                _ => None,
            })
            .collect()
    }

    pub fn ack_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, Call::Ack(_)))
            .count()
    }

    fn record(&self, call: Call) {
        self.calls.lock().expect("calls").push(call);
    }
}

#[async_trait]
impl Responder for RecordingResponder {
    async fn send(&self, target: Target, payload: OutboundMessage) -> Result<SentMessage> {
        let channel_id = match target {
            Target::Channel(channel_id) => channel_id,
            Target::Reply(_) => CHANNEL,
        };
        let message = SentMessage {
            message_id: MessageId(self.next_message_id.fetch_add(1, Ordering::Relaxed)),
            channel_id,
        };
        if let Target::Reply(event) = target {
            self.replies.lock().expect("replies").insert(event, message);
        }
        self.record(Call::Send {
            target,
            payload,
            message,
        });
        Ok(message)
    }

    async fn edit_existing(&self, message: &SentMessage, payload: OutboundMessage) -> Result<()> {
        self.record(Call::Edit {
            message: *message,
            payload,
        });
        Ok(())
    }

    async fn acknowledge(&self, event: &InboundEvent) -> Result<()> {
        self.ledger.mark(event.id)?;
        self.record(Call::Ack(event.id));
        Ok(())
    }

    async fn reply_ephemeral(&self, event: &InboundEvent, payload: OutboundMessage) -> Result<()> {
        self.ledger.mark(event.id)?;
        self.record(Call::Ephemeral {
            event: event.id,
            payload,
        });
        Ok(())
    }

    async fn fetch_reply(&self, event: EventId) -> Result<Option<SentMessage>> {
        Ok(self.replies.lock().expect("replies").get(&event).copied())
    }
}

pub enum DeliveryScript {
    Deliver,
    Block,
}

/// Side channel that follows a script, then delivers once the script runs out.
pub struct ScriptedSideChannel {
    script: Mutex<VecDeque<DeliveryScript>>,
    attempts: AtomicUsize,
    next_message_id: AtomicI64,
}

impl ScriptedSideChannel {
    pub fn new(script: Vec<DeliveryScript>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            attempts: AtomicUsize::new(0),
            next_message_id: AtomicI64::new(5000),
        })
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SideChannel for ScriptedSideChannel {
    async fn send_to_side_channel(
        &self,
        _owner: UserId,
        _payload: OutboundMessage,
    ) -> Result<SentMessage, DeliveryError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let next = self
            .script
            .lock()
            .expect("script")
            .pop_front()
            .unwrap_or(DeliveryScript::Deliver);
        match next {
            DeliveryScript::Block => Err(DeliveryError::Blocked("direct messages closed".into())),
            DeliveryScript::Deliver => Ok(SentMessage {
                message_id: MessageId(self.next_message_id.fetch_add(1, Ordering::Relaxed)),
                channel_id: DM_CHANNEL,
            }),
        }
    }
}

#[derive(Default)]
pub struct RecordingPublisher {
    pub published: AtomicUsize,
    pub updated: AtomicUsize,
    pub fail_updates: bool,
}

impl RecordingPublisher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing_updates() -> Arc<Self> {
        Arc::new(Self {
            fail_updates: true,
            ..Self::default()
        })
    }
}

#[async_trait]
impl Publisher for RecordingPublisher {
    async fn publish(&self, _draft: &Draft) -> Result<PublishedRef> {
        self.published.fetch_add(1, Ordering::SeqCst);
        Ok(PublishedRef {
            channel_id: ChannelId(900),
            message_id: MessageId(901),
        })
    }

    async fn update(&self, _published: &PublishedRef, _draft: &Draft) -> Result<()> {
        self.updated.fetch_add(1, Ordering::SeqCst);
        if self.fail_updates {
            return Err(anyhow!("published message was deleted"));
        }
        Ok(())
    }
}

pub struct PlainFormatter;

impl DraftFormatter for PlainFormatter {
    fn preview(&self, draft: &Draft) -> OutboundMessage {
        let lines: Vec<String> = draft
            .fields
            .iter()
            .map(|(key, value)| format!("{key}: {}", value.display()))
            .collect();
        OutboundMessage::text(format!("preview\n{}", lines.join("\n")))
    }

    fn public_view(&self, draft: &Draft) -> OutboundMessage {
        OutboundMessage::ephemeral(format!("public view of {}", draft.key.flow))
    }
}

pub fn correlator_with(responder: Arc<RecordingResponder>) -> (EventHub, Correlator) {
    let hub = EventHub::new();
    let correlator = Correlator::new(hub.clone(), responder);
    (hub, correlator)
}
