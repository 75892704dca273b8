use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Deref;

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self::new(value)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self::new(value)
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> Self {
                value.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                self.as_str()
            }
        }

        impl Deref for $name {
            type Target = str;

            fn deref(&self) -> &Self::Target {
                self.as_str()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

id_newtype!(MessageId);
id_newtype!(SenderId);
id_newtype!(GroupId);

/// Reply destination and isolation boundary: the group id for group chats,
/// the sender id otherwise. All per-conversation state is keyed by this.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationKey(String);

impl ConversationKey {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConversationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    pub message_id: MessageId,
    pub sender_id: SenderId,
    pub group_id: Option<GroupId>,
    pub is_group: bool,
    pub text: String,
    pub received_at: DateTime<Utc>,
}

impl InboundMessage {
    pub fn conversation_key(&self) -> ConversationKey {
        match &self.group_id {
            Some(group_id) => ConversationKey::new(group_id.as_str()),
            None => ConversationKey::new(self.sender_id.as_str()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub text: String,
    #[serde(default)]
    pub reply_to: Option<MessageId>,
}

impl OutboundMessage {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            reply_to: None,
        }
    }
}

/// Connection lifecycle notices. Consumed for logging and status only; the
/// bridge state machine does not depend on them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransportEvent {
    Ready,
    Disconnected { reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inbound(group_id: Option<&str>) -> InboundMessage {
        InboundMessage {
            message_id: MessageId::new("m1"),
            sender_id: SenderId::new("alice"),
            group_id: group_id.map(GroupId::new),
            is_group: group_id.is_some(),
            text: "hello".to_string(),
            received_at: Utc::now(),
        }
    }

    #[test]
    fn conversation_key_uses_group_id_for_group_chats() {
        assert_eq!(inbound(Some("team")).conversation_key().as_str(), "team");
        assert_eq!(inbound(None).conversation_key().as_str(), "alice");
    }
}
