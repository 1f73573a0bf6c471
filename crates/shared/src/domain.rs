use serde::{Deserialize, Serialize};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub i64);

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_newtype!(UserId);
id_newtype!(ChannelId);
id_newtype!(MessageId);
id_newtype!(EventId);

/// What a suspension is scoped to.
///
/// Component presses and form submissions belong to the message that carried
/// the controls; free-form follow-up messages belong to the channel they were
/// posted in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Subject {
    Message(MessageId),
    Channel(ChannelId),
}

/// Handle to a message the bot has sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SentMessage {
    pub message_id: MessageId,
    pub channel_id: ChannelId,
}

impl SentMessage {
    pub fn subject(&self) -> Subject {
        Subject::Message(self.message_id)
    }
}

/// Where an outbound payload goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Target {
    Channel(ChannelId),
    Reply(EventId),
}
