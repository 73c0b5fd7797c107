//! Message log backed by the `messages` table.

use super::decode_id;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use threadline_core::{ConversationId, MessageId, SideChatId};
use threadline_messaging::{
    Attachment, DELETED_PLACEHOLDER, Message, MessageLog, MessageScope, MessagingError, NewMessage,
};
use tracing::{debug, instrument};

/// Row type for message queries.
#[derive(FromRow)]
struct MessageRow {
    id: i64,
    conversation_id: String,
    side_chat_id: Option<String>,
    sender_id: String,
    content: String,
    sent_at: DateTime<Utc>,
    is_edited: bool,
    is_deleted: bool,
    attachment_token: Option<String>,
    attachment_name: Option<String>,
    attachment_media_type: Option<String>,
}

impl MessageRow {
    fn try_into_message(self) -> Result<Message, sqlx::Error> {
        let side_chat_id = self
            .side_chat_id
            .as_deref()
            .map(|s| decode_id("side_chat_id", s))
            .transpose()?;

        let attachment = match (
            self.attachment_token,
            self.attachment_name,
            self.attachment_media_type,
        ) {
            (Some(token), Some(display_name), Some(media_type)) => Some(Attachment {
                token: decode_id("attachment_token", &token)?,
                display_name,
                media_type,
            }),
            _ => None,
        };

        Ok(Message {
            id: MessageId::from_raw(self.id),
            conversation_id: decode_id("conversation_id", &self.conversation_id)?,
            side_chat_id,
            sender: decode_id("sender_id", &self.sender_id)?,
            content: self.content,
            sent_at: self.sent_at,
            is_edited: self.is_edited,
            is_deleted: self.is_deleted,
            attachment,
        })
    }
}

fn into_messages(rows: Vec<MessageRow>) -> Result<Vec<Message>, MessagingError> {
    rows.into_iter()
        .map(|r| r.try_into_message().map_err(MessagingError::storage))
        .collect()
}

/// Resolves the conversation of a visible side-chat from its
/// `(conversation_id, is_deleted)` row.
fn side_chat_parent(
    id: SideChatId,
    row: Option<(String, bool)>,
) -> Result<ConversationId, MessagingError> {
    match row {
        Some((conversation_id, false)) => {
            decode_id("conversation_id", &conversation_id).map_err(MessagingError::storage)
        }
        _ => Err(MessagingError::SideChatNotFound { id }),
    }
}

/// Message log over PostgreSQL.
///
/// A send bumps the parent conversation's `last_activity_at` first, which
/// row-locks the conversation, then share-locks a side-chat target and
/// inserts; all of it commits together. Conversation delete locks in the
/// same order. The identity column therefore follows acceptance order
/// within a conversation.
pub struct PgMessageLog {
    pool: PgPool,
}

impl PgMessageLog {
    /// Creates a new repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn update_content(
        &self,
        id: MessageId,
        query: &'static str,
        content: &str,
    ) -> Result<Message, MessagingError> {
        let row: Option<MessageRow> = sqlx::query_as(query)
            .bind(id.as_raw())
            .bind(content)
            .fetch_optional(&self.pool)
            .await
            .map_err(MessagingError::storage)?;

        match row {
            Some(r) => r.try_into_message().map_err(MessagingError::storage),
            None => Err(MessagingError::MessageNotFound { id }),
        }
    }
}

#[async_trait]
impl MessageLog for PgMessageLog {
    #[instrument(skip(self, message), fields(sender = %message.sender))]
    async fn send(
        &self,
        scope: MessageScope,
        message: NewMessage,
    ) -> Result<Message, MessagingError> {
        let mut tx = self.pool.begin().await.map_err(MessagingError::storage)?;

        // Lock order matches conversation delete: conversation row first,
        // then the side-chat row.
        let (conversation_id, side_chat_id) = match scope {
            MessageScope::Conversation(id) => (id, None),
            MessageScope::SideChat(id) => {
                let row: Option<(String, bool)> = sqlx::query_as(
                    "SELECT conversation_id, is_deleted FROM side_chats WHERE id = $1",
                )
                .bind(id.to_string())
                .fetch_optional(&mut *tx)
                .await
                .map_err(MessagingError::storage)?;
                (side_chat_parent(id, row)?, Some(id))
            }
        };

        let bumped: Option<(DateTime<Utc>,)> = sqlx::query_as(
            r#"
            UPDATE conversations
            SET last_activity_at = GREATEST(last_activity_at, $2)
            WHERE id = $1 AND deleted_at IS NULL
            RETURNING last_activity_at
            "#,
        )
        .bind(conversation_id.to_string())
        .bind(Utc::now())
        .fetch_optional(&mut *tx)
        .await
        .map_err(MessagingError::storage)?;

        let Some((sent_at,)) = bumped else {
            return Err(match side_chat_id {
                Some(id) => MessagingError::SideChatNotFound { id },
                None => MessagingError::ConversationNotFound {
                    id: conversation_id,
                },
            });
        };

        if let Some(id) = side_chat_id {
            let row: Option<(String, bool)> = sqlx::query_as(
                "SELECT conversation_id, is_deleted FROM side_chats WHERE id = $1 FOR SHARE",
            )
            .bind(id.to_string())
            .fetch_optional(&mut *tx)
            .await
            .map_err(MessagingError::storage)?;
            if side_chat_parent(id, row)? != conversation_id {
                return Err(MessagingError::SideChatNotFound { id });
            }
        }

        let attachment = message.attachment.as_ref();
        let row: MessageRow = sqlx::query_as(
            r#"
            INSERT INTO messages
                (conversation_id, side_chat_id, sender_id, content, sent_at,
                 attachment_token, attachment_name, attachment_media_type)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id, conversation_id, side_chat_id, sender_id, content, sent_at,
                      is_edited, is_deleted, attachment_token, attachment_name,
                      attachment_media_type
            "#,
        )
        .bind(conversation_id.to_string())
        .bind(side_chat_id.map(|id: SideChatId| id.to_string()))
        .bind(message.sender.to_string())
        .bind(&message.content)
        .bind(sent_at)
        .bind(attachment.map(|a| a.token.to_string()))
        .bind(attachment.map(|a| a.display_name.clone()))
        .bind(attachment.map(|a| a.media_type.clone()))
        .fetch_one(&mut *tx)
        .await
        .map_err(MessagingError::storage)?;

        tx.commit().await.map_err(MessagingError::storage)?;

        let stored = row.try_into_message().map_err(MessagingError::storage)?;
        debug!(message_id = %stored.id, "accepted message");
        Ok(stored)
    }

    async fn find_by_id(&self, id: MessageId) -> Result<Message, MessagingError> {
        let row: Option<MessageRow> = sqlx::query_as(
            r#"
            SELECT id, conversation_id, side_chat_id, sender_id, content, sent_at,
                   is_edited, is_deleted, attachment_token, attachment_name,
                   attachment_media_type
            FROM messages
            WHERE id = $1
            "#,
        )
        .bind(id.as_raw())
        .fetch_optional(&self.pool)
        .await
        .map_err(MessagingError::storage)?;

        match row {
            Some(r) => r.try_into_message().map_err(MessagingError::storage),
            None => Err(MessagingError::MessageNotFound { id }),
        }
    }

    #[instrument(skip(self, content))]
    async fn edit(&self, id: MessageId, content: String) -> Result<Message, MessagingError> {
        self.update_content(
            id,
            r#"
            UPDATE messages SET content = $2, is_edited = TRUE
            WHERE id = $1
            RETURNING id, conversation_id, side_chat_id, sender_id, content, sent_at,
                      is_edited, is_deleted, attachment_token, attachment_name,
                      attachment_media_type
            "#,
            &content,
        )
        .await
    }

    #[instrument(skip(self))]
    async fn delete(&self, id: MessageId) -> Result<Message, MessagingError> {
        self.update_content(
            id,
            r#"
            UPDATE messages SET content = $2, is_deleted = TRUE
            WHERE id = $1
            RETURNING id, conversation_id, side_chat_id, sender_id, content, sent_at,
                      is_edited, is_deleted, attachment_token, attachment_name,
                      attachment_media_type
            "#,
            DELETED_PLACEHOLDER,
        )
        .await
    }

    async fn list_for_conversation(
        &self,
        id: ConversationId,
    ) -> Result<Vec<Message>, MessagingError> {
        let (live,): (bool,) = sqlx::query_as(
            "SELECT EXISTS (SELECT 1 FROM conversations WHERE id = $1 AND deleted_at IS NULL)",
        )
        .bind(id.to_string())
        .fetch_one(&self.pool)
        .await
        .map_err(MessagingError::storage)?;

        if !live {
            return Err(MessagingError::ConversationNotFound { id });
        }

        let rows: Vec<MessageRow> = sqlx::query_as(
            r#"
            SELECT id, conversation_id, side_chat_id, sender_id, content, sent_at,
                   is_edited, is_deleted, attachment_token, attachment_name,
                   attachment_media_type
            FROM messages
            WHERE conversation_id = $1 AND side_chat_id IS NULL
            ORDER BY id ASC
            "#,
        )
        .bind(id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(MessagingError::storage)?;

        into_messages(rows)
    }

    async fn list_for_side_chat(&self, id: SideChatId) -> Result<Vec<Message>, MessagingError> {
        let (exists,): (bool,) =
            sqlx::query_as("SELECT EXISTS (SELECT 1 FROM side_chats WHERE id = $1)")
                .bind(id.to_string())
                .fetch_one(&self.pool)
                .await
                .map_err(MessagingError::storage)?;

        if !exists {
            return Err(MessagingError::SideChatNotFound { id });
        }

        let rows: Vec<MessageRow> = sqlx::query_as(
            r#"
            SELECT id, conversation_id, side_chat_id, sender_id, content, sent_at,
                   is_edited, is_deleted, attachment_token, attachment_name,
                   attachment_media_type
            FROM messages
            WHERE side_chat_id = $1
            ORDER BY id ASC
            "#,
        )
        .bind(id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(MessagingError::storage)?;

        into_messages(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{PgConversationDirectory, PgIdentityLookup, PgSideChatRegistry};
    use std::sync::Arc;
    use threadline_core::UserId;
    use threadline_messaging::{ConversationDirectory, Participant, SideChatRegistry};

    #[test]
    fn visible_side_chat_resolves_its_conversation() {
        let side_chat = SideChatId::new();
        let conversation = ConversationId::new();
        let parent = side_chat_parent(side_chat, Some((conversation.to_string(), false)))
            .expect("parent");
        assert_eq!(parent, conversation);
    }

    #[test]
    fn hidden_or_missing_side_chat_is_not_found() {
        let side_chat = SideChatId::new();
        let hidden = Some((ConversationId::new().to_string(), true));
        for row in [hidden, None] {
            assert_eq!(
                side_chat_parent(side_chat, row),
                Err(MessagingError::SideChatNotFound { id: side_chat })
            );
        }
    }

    #[test]
    fn corrupt_parent_is_a_storage_error() {
        let err = side_chat_parent(SideChatId::new(), Some(("junk".to_string(), false)))
            .unwrap_err();
        assert!(matches!(err, MessagingError::Storage { .. }));
    }

    #[tokio::test]
    #[ignore = "needs PostgreSQL at THREADLINE_TEST_DATABASE_URL"]
    async fn side_chat_sends_racing_conversation_delete_end_in_not_found() {
        let url = std::env::var("THREADLINE_TEST_DATABASE_URL").expect("database url");
        let pool = PgPool::connect(&url).await.expect("connect");
        sqlx::migrate!("./migrations").run(&pool).await.expect("migrate");

        let identities = PgIdentityLookup::new(pool.clone());
        let alice = Participant::new(UserId::new(), "alice");
        let bob = Participant::new(UserId::new(), "bob");
        identities.upsert(&alice).await.expect("alice");
        identities.upsert(&bob).await.expect("bob");

        let directory = Arc::new(PgConversationDirectory::new(pool.clone()));
        let side_chats = PgSideChatRegistry::new(pool.clone());
        let log = Arc::new(PgMessageLog::new(pool));

        let conversation = directory
            .get_or_create(alice.id, bob.id)
            .await
            .expect("conversation");
        let side_chat = side_chats
            .create(conversation.id, "plans".to_string(), alice.id)
            .await
            .expect("side-chat");

        let mut sends = Vec::new();
        for n in 0..16 {
            let log = log.clone();
            let sender = alice.id;
            sends.push(tokio::spawn(async move {
                log.send(
                    MessageScope::SideChat(side_chat.id),
                    NewMessage::text(sender, format!("note {n}")),
                )
                .await
            }));
        }
        let delete = {
            let directory = directory.clone();
            tokio::spawn(async move { directory.delete(conversation.id).await })
        };

        delete.await.expect("join").expect("delete");
        for send in sends {
            match send.await.expect("join") {
                Ok(_) => {}
                Err(err) => assert!(err.is_not_found(), "unexpected send failure: {err}"),
            }
        }
        assert!(log.list_for_conversation(conversation.id).await.is_err());
    }
}
