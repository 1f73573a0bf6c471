use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{ChannelId, MessageId, UserId};

/// Identifies one draft: the owning user plus the flow that edits it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DraftKey {
    pub owner: UserId,
    pub flow: String,
}

impl DraftKey {
    pub fn new(owner: UserId, flow: impl Into<String>) -> Self {
        Self {
            owner,
            flow: flow.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    Text(String),
    Integer(i64),
    Flag(bool),
    List(Vec<String>),
    /// The user explicitly continued without providing this field.
    Skipped,
}

impl FieldValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            FieldValue::Integer(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_flag(&self) -> Option<bool> {
        match self {
            FieldValue::Flag(value) => Some(*value),
            _ => None,
        }
    }

    /// Form-friendly rendering used to prefill inputs while editing.
    pub fn display(&self) -> String {
        match self {
            FieldValue::Text(value) => value.clone(),
            FieldValue::Integer(value) => value.to_string(),
            FieldValue::Flag(true) => "yes".to_string(),
            FieldValue::Flag(false) => "no".to_string(),
            FieldValue::List(values) => values.join("\n"),
            FieldValue::Skipped => String::new(),
        }
    }
}

/// Where a published draft currently lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedRef {
    pub channel_id: ChannelId,
    pub message_id: MessageId,
}

/// Canonical persisted draft.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Draft {
    pub key: DraftKey,
    /// Stage the draft is waiting in; `None` is the terminal no-status value.
    pub status: Option<String>,
    pub fields: BTreeMap<String, FieldValue>,
    pub published: Option<PublishedRef>,
    pub updated_at: DateTime<Utc>,
}

impl Draft {
    pub fn field(&self, key: &str) -> Option<&FieldValue> {
        self.fields.get(key)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatusUpdate {
    #[default]
    Keep,
    Set(String),
    Clear,
}

/// Typed partial update applied by [`DraftStore::upsert`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DraftUpdate {
    pub fields: BTreeMap<String, FieldValue>,
    pub status: StatusUpdate,
    pub published: Option<PublishedRef>,
}

impl DraftUpdate {
    pub fn field(mut self, key: impl Into<String>, value: FieldValue) -> Self {
        self.fields.insert(key.into(), value);
        self
    }

    pub fn status(mut self, status: StatusUpdate) -> Self {
        self.status = status;
        self
    }

    pub fn published(mut self, published: PublishedRef) -> Self {
        self.published = Some(published);
        self
    }

    /// Applies this update to `draft` in place.
    pub fn apply_to(&self, draft: &mut Draft) {
        for (key, value) in &self.fields {
            draft.fields.insert(key.clone(), value.clone());
        }
        match &self.status {
            StatusUpdate::Keep => {}
            StatusUpdate::Set(status) => draft.status = Some(status.clone()),
            StatusUpdate::Clear => draft.status = None,
        }
        if let Some(published) = self.published {
            draft.published = Some(published);
        }
    }
}

/// Persistence contract for drafts. Implementations must return the full
/// canonical entity after every write.
#[async_trait]
pub trait DraftStore: Send + Sync {
    async fn get(&self, key: &DraftKey) -> anyhow::Result<Option<Draft>>;
    async fn upsert(&self, key: &DraftKey, update: DraftUpdate) -> anyhow::Result<Draft>;
}
