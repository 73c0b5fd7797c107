//! Side-chats: titled sub-threads of a conversation.

use crate::error::MessagingError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use threadline_core::{ConversationId, SideChatId, UserId};

/// A side-chat scoped to one conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SideChat {
    /// Unique side-chat identifier.
    pub id: SideChatId,
    /// Owning conversation.
    pub conversation_id: ConversationId,
    /// Title given at creation.
    pub title: String,
    /// Participant who opened it.
    pub created_by: UserId,
    /// When it was created.
    pub created_at: DateTime<Utc>,
    /// Hidden from listings once set. Messages are kept.
    pub is_deleted: bool,
}

impl SideChat {
    /// Creates a new side-chat, stamped now.
    #[must_use]
    pub fn new(
        conversation_id: ConversationId,
        title: impl Into<String>,
        created_by: UserId,
    ) -> Self {
        Self {
            id: SideChatId::new(),
            conversation_id,
            title: title.into(),
            created_by,
            created_at: Utc::now(),
            is_deleted: false,
        }
    }
}

/// A side-chat annotated with its live message count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SideChatSummary {
    /// The side-chat.
    pub side_chat: SideChat,
    /// Count of messages in it that are not soft-deleted.
    pub message_count: u64,
}

/// Owner of side-chat creation, listing and soft-deletion.
#[async_trait]
pub trait SideChatRegistry: Send + Sync {
    /// Creates a side-chat on a live conversation.
    async fn create(
        &self,
        conversation_id: ConversationId,
        title: String,
        creator: UserId,
    ) -> Result<SideChat, MessagingError>;

    /// Gets a side-chat by ID, including soft-deleted ones.
    async fn find_by_id(&self, id: SideChatId) -> Result<SideChat, MessagingError>;

    /// Lists visible side-chats, newest first, with live message counts.
    async fn list_side_chats(
        &self,
        conversation_id: ConversationId,
    ) -> Result<Vec<SideChatSummary>, MessagingError>;

    /// Hides a side-chat. Its messages stay reachable through its scope.
    async fn delete(&self, id: SideChatId) -> Result<(), MessagingError>;

    /// Recounts the non-deleted messages of a side-chat.
    async fn message_count(&self, id: SideChatId) -> Result<u64, MessagingError>;
}
