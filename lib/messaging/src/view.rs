//! Caller-facing views that join stored records with participant names.

use crate::boundary::Participant;
use crate::message::{Attachment, Message};
use crate::side_chat::SideChatSummary;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use threadline_core::{ConversationId, MessageId, SideChatId, UserId};

/// Preview shown for a conversation with no visible messages.
pub const NO_MESSAGES_PREVIEW: &str = "No messages yet";

/// Conversation as seen from one participant's inbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationSummary {
    /// Conversation ID.
    pub id: ConversationId,
    /// The other participant.
    pub other_user_id: UserId,
    /// The other participant's display name.
    pub other_display_name: String,
    /// Avatar initial of the other participant.
    pub avatar: String,
    /// Content of the latest visible main-thread message, or a placeholder.
    pub last_message: String,
    /// Time of that message, or the creation time.
    pub last_message_at: DateTime<Utc>,
    /// Ordering key for the inbox.
    pub last_activity_at: DateTime<Utc>,
    /// When the conversation was created.
    pub created_at: DateTime<Utc>,
}

/// Message joined with its sender's display data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageView {
    pub id: MessageId,
    pub conversation_id: ConversationId,
    pub side_chat_id: Option<SideChatId>,
    pub sender_id: UserId,
    pub sender_name: String,
    pub avatar: String,
    pub content: String,
    pub sent_at: DateTime<Utc>,
    pub is_edited: bool,
    pub is_deleted: bool,
    pub attachment: Option<Attachment>,
}

impl MessageView {
    /// Joins a message with its resolved sender.
    #[must_use]
    pub fn new(message: Message, sender: &Participant) -> Self {
        Self {
            id: message.id,
            conversation_id: message.conversation_id,
            side_chat_id: message.side_chat_id,
            sender_id: message.sender,
            sender_name: sender.display_name.clone(),
            avatar: sender.avatar(),
            content: message.content,
            sent_at: message.sent_at,
            is_edited: message.is_edited,
            is_deleted: message.is_deleted,
            attachment: message.attachment,
        }
    }
}

/// Side-chat joined with its creator's name and live message count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SideChatView {
    pub id: SideChatId,
    pub conversation_id: ConversationId,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub created_by: UserId,
    pub created_by_name: String,
    pub message_count: u64,
}

impl SideChatView {
    /// Joins a side-chat summary with its resolved creator.
    #[must_use]
    pub fn new(summary: SideChatSummary, creator: &Participant) -> Self {
        let side_chat = summary.side_chat;
        Self {
            id: side_chat.id,
            conversation_id: side_chat.conversation_id,
            title: side_chat.title,
            created_at: side_chat.created_at,
            created_by: side_chat.created_by,
            created_by_name: creator.display_name.clone(),
            message_count: summary.message_count,
        }
    }
}
