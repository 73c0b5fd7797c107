//! Strongly-typed ID types for messaging entities.
//!
//! Users, conversations, side-chats and attachment tokens use ULIDs, so they
//! are unique without coordination and totally ordered. Messages instead use
//! a store-assigned sequence number: its order is the acceptance order of
//! the store and is the authoritative ordering key for message listings.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ulid::Ulid;

/// Error returned when parsing an ID from a string fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseIdError {
    /// The type of ID that failed to parse.
    pub id_type: &'static str,
    /// The reason for the parse failure.
    pub reason: String,
}

impl fmt::Display for ParseIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to parse {}: {}", self.id_type, self.reason)
    }
}

impl std::error::Error for ParseIdError {}

/// Macro to generate a strongly-typed ID wrapper around ULID.
macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident, $prefix:expr) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(Ulid);

        impl $name {
            /// Creates a new ID with a randomly generated ULID.
            #[must_use]
            pub fn new() -> Self {
                Self(Ulid::new())
            }

            /// Creates an ID from a ULID.
            #[must_use]
            pub const fn from_ulid(ulid: Ulid) -> Self {
                Self(ulid)
            }

            /// Returns the underlying ULID.
            #[must_use]
            pub const fn as_ulid(&self) -> Ulid {
                self.0
            }

            /// Returns the prefix used for display formatting.
            #[must_use]
            pub const fn prefix() -> &'static str {
                $prefix
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}_{}", $prefix, self.0)
            }
        }

        impl FromStr for $name {
            type Err = ParseIdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let ulid_str = s.strip_prefix(concat!($prefix, "_")).unwrap_or(s);

                Ulid::from_str(ulid_str)
                    .map(Self)
                    .map_err(|e| ParseIdError {
                        id_type: stringify!($name),
                        reason: e.to_string(),
                    })
            }
        }

        impl From<Ulid> for $name {
            fn from(ulid: Ulid) -> Self {
                Self(ulid)
            }
        }
    };
}

define_id!(
    /// Unique identifier for a user known to the identity directory.
    UserId,
    "usr"
);

define_id!(
    /// Unique identifier for a two-party conversation.
    ConversationId,
    "conv"
);

define_id!(
    /// Unique identifier for a side-chat scoped to a conversation.
    SideChatId,
    "side"
);

define_id!(
    /// Opaque reference to a stored attachment blob.
    AttachmentToken,
    "att"
);

/// Identifier of a message, assigned by the store at acceptance time.
///
/// Values are positive and strictly increasing within one store, and are
/// never reused, so sorting by `MessageId` yields acceptance order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct MessageId(i64);

impl MessageId {
    /// Wraps a raw sequence value.
    #[must_use]
    pub const fn from_raw(seq: i64) -> Self {
        Self(seq)
    }

    /// Returns the raw sequence value.
    #[must_use]
    pub const fn as_raw(&self) -> i64 {
        self.0
    }

    /// Returns the prefix used for display formatting.
    #[must_use]
    pub const fn prefix() -> &'static str {
        "msg"
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", Self::prefix(), self.0)
    }
}

impl FromStr for MessageId {
    type Err = ParseIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s
            .strip_prefix(Self::prefix())
            .and_then(|rest| rest.strip_prefix('_'))
            .unwrap_or(s);
        let seq: i64 = raw.parse().map_err(|e: std::num::ParseIntError| ParseIdError {
            id_type: "MessageId",
            reason: e.to_string(),
        })?;
        if seq <= 0 {
            return Err(ParseIdError {
                id_type: "MessageId",
                reason: "sequence must be positive".to_string(),
            });
        }
        Ok(Self(seq))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversation_id_display_format() {
        let id = ConversationId::new();
        assert!(id.to_string().starts_with("conv_"));
    }

    #[test]
    fn side_chat_id_display_format() {
        let id = SideChatId::new();
        assert!(id.to_string().starts_with("side_"));
    }

    #[test]
    fn parse_with_prefix() {
        let id = UserId::new();
        let parsed: UserId = id.to_string().parse().expect("should parse");
        assert_eq!(id, parsed);
    }

    #[test]
    fn parse_without_prefix() {
        let ulid = Ulid::new();
        let id: ConversationId = ulid.to_string().parse().expect("should parse");
        assert_eq!(id.as_ulid(), ulid);
    }

    #[test]
    fn parse_invalid_ulid() {
        let err = "not_a_ulid".parse::<SideChatId>().unwrap_err();
        assert_eq!(err.id_type, "SideChatId");
    }

    #[test]
    fn user_ids_sort_like_their_display_form() {
        let mut ids: Vec<UserId> = (0..16).map(|_| UserId::new()).collect();
        ids.sort();
        let mut displayed: Vec<String> = ids.iter().map(ToString::to_string).collect();
        let before = displayed.clone();
        displayed.sort();
        assert_eq!(before, displayed);
    }

    #[test]
    fn message_id_round_trips_display() {
        let id = MessageId::from_raw(42);
        assert_eq!(id.to_string(), "msg_42");
        assert_eq!("msg_42".parse::<MessageId>().unwrap(), id);
        assert_eq!("42".parse::<MessageId>().unwrap(), id);
    }

    #[test]
    fn message_id_rejects_non_positive() {
        assert!("msg_0".parse::<MessageId>().is_err());
        assert!("msg_-3".parse::<MessageId>().is_err());
        assert!("msg_x".parse::<MessageId>().is_err());
    }

    #[test]
    fn message_ids_order_by_sequence() {
        assert!(MessageId::from_raw(2) < MessageId::from_raw(10));
    }

    #[test]
    fn id_serde_is_transparent() {
        let id = MessageId::from_raw(9);
        assert_eq!(serde_json::to_string(&id).unwrap(), "9");
        let conv = ConversationId::new();
        let json = serde_json::to_string(&conv).expect("serialize");
        let parsed: ConversationId = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(conv, parsed);
    }
}
