//! Side-chat registry backed by the `side_chats` table.

use super::decode_id;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use threadline_core::{ConversationId, SideChatId, UserId};
use threadline_messaging::{MessagingError, SideChat, SideChatRegistry, SideChatSummary};
use tracing::{debug, instrument};

/// Row type for side-chat queries.
#[derive(FromRow)]
struct SideChatRow {
    id: String,
    conversation_id: String,
    title: String,
    created_by: String,
    created_at: DateTime<Utc>,
    is_deleted: bool,
}

impl SideChatRow {
    fn try_into_side_chat(self) -> Result<SideChat, sqlx::Error> {
        Ok(SideChat {
            id: decode_id("id", &self.id)?,
            conversation_id: decode_id("conversation_id", &self.conversation_id)?,
            title: self.title,
            created_by: decode_id("created_by", &self.created_by)?,
            created_at: self.created_at,
            is_deleted: self.is_deleted,
        })
    }
}

/// Row type for listings that carry a live message count.
#[derive(FromRow)]
struct SideChatCountRow {
    #[sqlx(flatten)]
    side_chat: SideChatRow,
    message_count: i64,
}

/// Side-chat registry over PostgreSQL.
pub struct PgSideChatRegistry {
    pool: PgPool,
}

impl PgSideChatRegistry {
    /// Creates a new repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn conversation_is_live(&self, id: ConversationId) -> Result<bool, MessagingError> {
        let (live,): (bool,) = sqlx::query_as(
            "SELECT EXISTS (SELECT 1 FROM conversations WHERE id = $1 AND deleted_at IS NULL)",
        )
        .bind(id.to_string())
        .fetch_one(&self.pool)
        .await
        .map_err(MessagingError::storage)?;
        Ok(live)
    }
}

#[async_trait]
impl SideChatRegistry for PgSideChatRegistry {
    #[instrument(skip(self, title))]
    async fn create(
        &self,
        conversation_id: ConversationId,
        title: String,
        creator: UserId,
    ) -> Result<SideChat, MessagingError> {
        let mut tx = self.pool.begin().await.map_err(MessagingError::storage)?;

        // Shares the lock a conversation delete takes exclusively.
        let live: Option<(String,)> = sqlx::query_as(
            "SELECT id FROM conversations WHERE id = $1 AND deleted_at IS NULL FOR SHARE",
        )
        .bind(conversation_id.to_string())
        .fetch_optional(&mut *tx)
        .await
        .map_err(MessagingError::storage)?;

        if live.is_none() {
            return Err(MessagingError::ConversationNotFound {
                id: conversation_id,
            });
        }

        let side_chat = SideChat::new(conversation_id, title, creator);
        sqlx::query(
            r#"
            INSERT INTO side_chats (id, conversation_id, title, created_by, created_at, is_deleted)
            VALUES ($1, $2, $3, $4, $5, FALSE)
            "#,
        )
        .bind(side_chat.id.to_string())
        .bind(conversation_id.to_string())
        .bind(&side_chat.title)
        .bind(creator.to_string())
        .bind(side_chat.created_at)
        .execute(&mut *tx)
        .await
        .map_err(MessagingError::storage)?;

        tx.commit().await.map_err(MessagingError::storage)?;
        debug!(side_chat_id = %side_chat.id, "created side-chat");
        Ok(side_chat)
    }

    async fn find_by_id(&self, id: SideChatId) -> Result<SideChat, MessagingError> {
        let row: Option<SideChatRow> = sqlx::query_as(
            r#"
            SELECT id, conversation_id, title, created_by, created_at, is_deleted
            FROM side_chats
            WHERE id = $1
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(MessagingError::storage)?;

        match row {
            Some(r) => r.try_into_side_chat().map_err(MessagingError::storage),
            None => Err(MessagingError::SideChatNotFound { id }),
        }
    }

    async fn list_side_chats(
        &self,
        conversation_id: ConversationId,
    ) -> Result<Vec<SideChatSummary>, MessagingError> {
        if !self.conversation_is_live(conversation_id).await? {
            return Err(MessagingError::ConversationNotFound {
                id: conversation_id,
            });
        }

        let rows: Vec<SideChatCountRow> = sqlx::query_as(
            r#"
            SELECT s.id, s.conversation_id, s.title, s.created_by, s.created_at, s.is_deleted,
                   COUNT(m.id) FILTER (WHERE NOT m.is_deleted) AS message_count
            FROM side_chats s
            LEFT JOIN messages m ON m.side_chat_id = s.id
            WHERE s.conversation_id = $1 AND NOT s.is_deleted
            GROUP BY s.id
            ORDER BY s.created_at DESC, s.id DESC
            "#,
        )
        .bind(conversation_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(MessagingError::storage)?;

        rows.into_iter()
            .map(|r| -> Result<SideChatSummary, MessagingError> {
                Ok(SideChatSummary {
                    side_chat: r
                        .side_chat
                        .try_into_side_chat()
                        .map_err(MessagingError::storage)?,
                    message_count: u64::try_from(r.message_count).unwrap_or_default(),
                })
            })
            .collect()
    }

    #[instrument(skip(self))]
    async fn delete(&self, id: SideChatId) -> Result<(), MessagingError> {
        let result = sqlx::query("UPDATE side_chats SET is_deleted = TRUE WHERE id = $1")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(MessagingError::storage)?;

        if result.rows_affected() == 0 {
            return Err(MessagingError::SideChatNotFound { id });
        }
        debug!(side_chat_id = %id, "hid side-chat");
        Ok(())
    }

    async fn message_count(&self, id: SideChatId) -> Result<u64, MessagingError> {
        let count: Option<(i64,)> = sqlx::query_as(
            r#"
            SELECT (
                SELECT COUNT(*) FROM messages m
                WHERE m.side_chat_id = s.id AND NOT m.is_deleted
            )
            FROM side_chats s
            WHERE s.id = $1
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(MessagingError::storage)?;

        match count {
            Some((n,)) => Ok(u64::try_from(n).unwrap_or_default()),
            None => Err(MessagingError::SideChatNotFound { id }),
        }
    }
}
