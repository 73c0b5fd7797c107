//! PostgreSQL repositories for threadline.
//!
//! This module provides data access for:
//! - Conversations (one live row per participant pair)
//! - Messages and side-chats
//! - Users, as the identity directory
//! - Stored notifications

pub mod conversation;
pub mod message;
pub mod notification;
pub mod side_chat;
pub mod user;

pub use conversation::PgConversationDirectory;
pub use message::PgMessageLog;
pub use notification::PgNotificationStore;
pub use side_chat::PgSideChatRegistry;
pub use user::PgIdentityLookup;

use std::str::FromStr;
use threadline_core::ParseIdError;

/// Parses an ID column, surfacing bad data as a decode error.
fn decode_id<T>(column: &str, value: &str) -> Result<T, sqlx::Error>
where
    T: FromStr<Err = ParseIdError>,
{
    T::from_str(value).map_err(|e| {
        sqlx::Error::Decode(Box::new(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("invalid {column} '{value}': {e}"),
        )))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use threadline_core::{ConversationId, UserId};

    #[test]
    fn decodes_prefixed_ids() {
        let id = ConversationId::new();
        let decoded: ConversationId = decode_id("id", &id.to_string()).expect("decode");
        assert_eq!(decoded, id);
    }

    #[test]
    fn bad_ids_are_decode_errors() {
        let err = decode_id::<UserId>("sender_id", "garbage").unwrap_err();
        assert!(matches!(err, sqlx::Error::Decode(_)));
        assert!(err.to_string().contains("sender_id"));
    }
}
