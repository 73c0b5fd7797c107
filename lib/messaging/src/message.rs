//! Messages and the ordered log that stores them.

use crate::error::MessagingError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use threadline_core::{AttachmentToken, ConversationId, MessageId, SideChatId, UserId};

/// Content a deleted message is redacted to.
pub const DELETED_PLACEHOLDER: &str = "[Message deleted]";

/// Where a message lives: a conversation's main thread or one side-chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum MessageScope {
    /// Main thread of a conversation.
    Conversation(ConversationId),
    /// A side-chat of a conversation.
    SideChat(SideChatId),
}

/// Stored reference to an attachment blob.
///
/// The triple is produced by the attachment resolver and kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    /// Opaque storage token.
    pub token: AttachmentToken,
    /// Name shown to users.
    pub display_name: String,
    /// Media (MIME) type.
    pub media_type: String,
}

/// A message as accepted by the log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Store-assigned identifier; defines order.
    pub id: MessageId,
    /// Owning conversation.
    pub conversation_id: ConversationId,
    /// Owning side-chat, if the message is not on the main thread.
    pub side_chat_id: Option<SideChatId>,
    /// Author.
    pub sender: UserId,
    /// Current content (placeholder once deleted).
    pub content: String,
    /// When the store accepted the message.
    pub sent_at: DateTime<Utc>,
    /// Set by the first edit and never cleared.
    pub is_edited: bool,
    /// Set by delete and never cleared.
    pub is_deleted: bool,
    /// Optional attachment reference.
    pub attachment: Option<Attachment>,
}

impl Message {
    /// Replaces the content and marks the message edited.
    ///
    /// A deleted message accepts edits too; `is_deleted` stays set.
    pub fn apply_edit(&mut self, content: impl Into<String>) {
        self.content = content.into();
        self.is_edited = true;
    }

    /// Redacts the message. Idempotent.
    pub fn apply_delete(&mut self) {
        self.is_deleted = true;
        self.content = DELETED_PLACEHOLDER.to_string();
    }
}

/// Input for a send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    /// Author.
    pub sender: UserId,
    /// Text content.
    pub content: String,
    /// Already-resolved attachment reference.
    pub attachment: Option<Attachment>,
}

impl NewMessage {
    /// Creates a text-only message.
    #[must_use]
    pub fn text(sender: UserId, content: impl Into<String>) -> Self {
        Self {
            sender,
            content: content.into(),
            attachment: None,
        }
    }
}

/// Append-and-mutate ordered message store.
///
/// Listings are ordered by [`MessageId`], i.e. acceptance order, and include
/// soft-deleted messages so the surrounding context stays intact.
#[async_trait]
pub trait MessageLog: Send + Sync {
    /// Appends a message to `scope`.
    ///
    /// The insert and the parent conversation's `last_activity_at` update
    /// happen atomically. A missing conversation, or a missing or hidden
    /// side-chat, fails with NotFound and writes nothing.
    async fn send(&self, scope: MessageScope, message: NewMessage)
    -> Result<Message, MessagingError>;

    /// Gets a message by ID.
    async fn find_by_id(&self, id: MessageId) -> Result<Message, MessagingError>;

    /// Replaces content and sets `is_edited`.
    async fn edit(&self, id: MessageId, content: String) -> Result<Message, MessagingError>;

    /// Soft-deletes a message, keeping its position.
    async fn delete(&self, id: MessageId) -> Result<Message, MessagingError>;

    /// Lists main-thread messages of a conversation in send order.
    async fn list_for_conversation(
        &self,
        id: ConversationId,
    ) -> Result<Vec<Message>, MessagingError>;

    /// Lists messages of a side-chat in send order, even if it is hidden.
    async fn list_for_side_chat(&self, id: SideChatId) -> Result<Vec<Message>, MessagingError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Message {
        Message {
            id: MessageId::from_raw(1),
            conversation_id: ConversationId::new(),
            side_chat_id: None,
            sender: UserId::new(),
            content: "hello".to_string(),
            sent_at: Utc::now(),
            is_edited: false,
            is_deleted: false,
            attachment: None,
        }
    }

    #[test]
    fn edit_is_sticky() {
        let mut msg = sample();
        msg.apply_edit("hello there");
        msg.apply_edit("hello again");
        assert!(msg.is_edited);
        assert_eq!(msg.content, "hello again");
    }

    #[test]
    fn delete_redacts_and_keeps_edit_flag() {
        let mut msg = sample();
        msg.apply_edit("typo");
        msg.apply_delete();
        assert!(msg.is_deleted);
        assert!(msg.is_edited);
        assert_eq!(msg.content, DELETED_PLACEHOLDER);

        msg.apply_delete();
        assert_eq!(msg.content, DELETED_PLACEHOLDER);
    }

    #[test]
    fn message_serde_roundtrip() {
        let mut msg = sample();
        msg.attachment = Some(Attachment {
            token: AttachmentToken::new(),
            display_name: "notes.pdf".to_string(),
            media_type: "application/pdf".to_string(),
        });
        let json = serde_json::to_string(&msg).expect("serialize");
        let parsed: Message = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(msg, parsed);
    }
}
