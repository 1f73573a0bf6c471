use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{ChannelId, EventId, MessageId, Subject, UserId};

/// An inbound response event delivered by the platform gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundEvent {
    pub id: EventId,
    pub user_id: UserId,
    pub channel_id: ChannelId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<MessageId>,
    pub payload: EventPayload,
    pub received_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum EventPayload {
    Button {
        custom_id: String,
    },
    Select {
        custom_id: String,
        values: Vec<String>,
    },
    Submission {
        custom_id: String,
        fields: BTreeMap<String, String>,
    },
    Message {
        content: String,
        #[serde(default)]
        attachments: Vec<String>,
    },
}

impl InboundEvent {
    pub fn new(
        id: EventId,
        user_id: UserId,
        channel_id: ChannelId,
        message_id: Option<MessageId>,
        payload: EventPayload,
    ) -> Self {
        Self {
            id,
            user_id,
            channel_id,
            message_id,
            payload,
            received_at: Utc::now(),
        }
    }

    pub fn belongs_to(&self, subject: &Subject) -> bool {
        match (subject, &self.payload) {
            (Subject::Channel(channel_id), EventPayload::Message { .. }) => {
                self.channel_id == *channel_id
            }
            // Replies in a channel are not interactions on the message itself.
            (Subject::Message(_), EventPayload::Message { .. }) => false,
            (Subject::Message(message_id), _) => self.message_id == Some(*message_id),
            (Subject::Channel(_), _) => false,
        }
    }

    /// The component or form id for interactive payloads.
    pub fn custom_id(&self) -> Option<&str> {
        match &self.payload {
            EventPayload::Button { custom_id }
            | EventPayload::Select { custom_id, .. }
            | EventPayload::Submission { custom_id, .. } => Some(custom_id),
            EventPayload::Message { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ButtonStyle {
    Primary,
    Secondary,
    Success,
    Danger,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Button {
    pub custom_id: String,
    pub label: String,
    pub style: ButtonStyle,
    #[serde(default)]
    pub disabled: bool,
}

impl Button {
    pub fn new(custom_id: impl Into<String>, label: impl Into<String>, style: ButtonStyle) -> Self {
        Self {
            custom_id: custom_id.into(),
            label: label.into(),
            style,
            disabled: false,
        }
    }

    pub fn disabled(mut self, disabled: bool) -> Self {
        self.disabled = disabled;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectOption {
    pub value: String,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectMenu {
    pub custom_id: String,
    pub placeholder: String,
    pub options: Vec<SelectOption>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormInput {
    pub key: String,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current: Option<String>,
    #[serde(default)]
    pub multiline: bool,
}

/// Entry point for a submission form; platforms render this as a modal trigger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Form {
    pub custom_id: String,
    pub title: String,
    pub inputs: Vec<FormInput>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum Component {
    Button(Button),
    Select(SelectMenu),
    Form(Form),
}

impl Component {
    pub fn custom_id(&self) -> &str {
        match self {
            Component::Button(button) => &button.custom_id,
            Component::Select(menu) => &menu.custom_id,
            Component::Form(form) => &form.custom_id,
        }
    }
}

/// A renderable outbound payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub components: Vec<Component>,
    #[serde(default)]
    pub ephemeral: bool,
}

impl OutboundMessage {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Self::default()
        }
    }

    pub fn ephemeral(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            components: Vec::new(),
            ephemeral: true,
        }
    }

    pub fn with_component(mut self, component: Component) -> Self {
        self.components.push(component);
        self
    }

    pub fn with_button(self, button: Button) -> Self {
        self.with_component(Component::Button(button))
    }

    /// Drops every component whose id matches `predicate`.
    pub fn without_components(mut self, predicate: impl Fn(&str) -> bool) -> Self {
        self.components.retain(|component| !predicate(component.custom_id()));
        self
    }

    pub fn has_component(&self, custom_id: &str) -> bool {
        self.components
            .iter()
            .any(|component| component.custom_id() == custom_id)
    }
}
