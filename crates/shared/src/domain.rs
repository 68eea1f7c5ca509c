use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

id_newtype!(UserId);
id_newtype!(CorrelationId);

impl CorrelationId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

/// Millisecond epoch timestamp. Orders messages and is the fallback dedup key.
pub type TimestampMs = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelayKind {
    Direct,
    Public,
    Group,
}

impl RelayKind {
    pub fn path_segment(self) -> &'static str {
        match self {
            RelayKind::Direct => "direct",
            RelayKind::Public => "public",
            RelayKind::Group => "group",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    Sent,
    Delivered,
    Read,
    Failed,
}

impl MessageStatus {
    fn rank(self) -> u8 {
        match self {
            MessageStatus::Failed => 0,
            MessageStatus::Sent => 1,
            MessageStatus::Delivered => 2,
            MessageStatus::Read => 3,
        }
    }

    /// Returns whichever of the two statuses is further along the delivery path.
    pub fn promote(self, other: MessageStatus) -> MessageStatus {
        if other.rank() > self.rank() {
            other
        } else {
            self
        }
    }
}

/// The `(self, counterpart)` pair one message store is built for.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConversationContext {
    pub self_id: UserId,
    pub counterpart_id: UserId,
}

impl ConversationContext {
    pub fn new(self_id: UserId, counterpart_id: UserId) -> Self {
        Self {
            self_id,
            counterpart_id,
        }
    }

    /// True when a message between `sender` and `recipient` belongs to this pair,
    /// in either direction.
    pub fn involves(&self, sender: &UserId, recipient: &UserId) -> bool {
        (sender == &self.self_id && recipient == &self.counterpart_id)
            || (sender == &self.counterpart_id && recipient == &self.self_id)
    }
}

impl fmt::Display for ConversationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}<->{}", self.self_id, self.counterpart_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub content: String,
    pub sender_id: UserId,
    pub recipient_id: UserId,
    pub timestamp: TimestampMs,
    pub status: MessageStatus,
    pub is_self: bool,
    pub correlation_id: Option<CorrelationId>,
}

impl Message {
    /// Key sent back to the relay in `messageReceived` acknowledgements.
    pub fn ack_key(&self) -> String {
        match &self.correlation_id {
            Some(id) => id.0.clone(),
            None => self.timestamp.to_string(),
        }
    }
}

/// Producer-side clock used when a message is authored locally.
pub fn local_clock_ms() -> TimestampMs {
    chrono::Utc::now().timestamp_millis()
}
