//! Conversation directory backed by the `conversations` table.

use super::decode_id;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use threadline_core::{ConversationId, UserId};
use threadline_messaging::{Conversation, ConversationDirectory, MessagingError, ParticipantPair};
use tracing::{debug, instrument};

/// Insert attempts before giving up on a pair whose live row keeps changing.
const CREATE_ATTEMPTS: usize = 3;

/// Row type for conversation queries.
#[derive(FromRow)]
struct ConversationRow {
    id: String,
    participant_low: String,
    participant_high: String,
    created_at: DateTime<Utc>,
    last_activity_at: DateTime<Utc>,
}

impl ConversationRow {
    fn try_into_conversation(self) -> Result<Conversation, sqlx::Error> {
        let low: UserId = decode_id("participant_low", &self.participant_low)?;
        let high: UserId = decode_id("participant_high", &self.participant_high)?;
        Ok(Conversation {
            id: decode_id("id", &self.id)?,
            participants: ParticipantPair::new(low, high),
            created_at: self.created_at,
            last_activity_at: self.last_activity_at,
        })
    }
}

/// Conversation directory over PostgreSQL.
///
/// Pair uniqueness is enforced by a partial unique index over live rows;
/// deleted conversations keep their row with `deleted_at` set.
pub struct PgConversationDirectory {
    pool: PgPool,
}

impl PgConversationDirectory {
    /// Creates a new repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn find_live_pair(
        &self,
        pair: ParticipantPair,
    ) -> Result<Option<Conversation>, sqlx::Error> {
        let row: Option<ConversationRow> = sqlx::query_as(
            r#"
            SELECT id, participant_low, participant_high, created_at, last_activity_at
            FROM conversations
            WHERE participant_low = $1 AND participant_high = $2 AND deleted_at IS NULL
            "#,
        )
        .bind(pair.low().to_string())
        .bind(pair.high().to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(ConversationRow::try_into_conversation).transpose()
    }
}

#[async_trait]
impl ConversationDirectory for PgConversationDirectory {
    #[instrument(skip(self))]
    async fn get_or_create(&self, a: UserId, b: UserId) -> Result<Conversation, MessagingError> {
        let pair = ParticipantPair::new(a, b);

        for _ in 0..CREATE_ATTEMPTS {
            if let Some(existing) = self
                .find_live_pair(pair)
                .await
                .map_err(MessagingError::storage)?
            {
                return Ok(existing);
            }

            let candidate = Conversation::new(pair);
            // A concurrent creator wins the index; we then read its row.
            let inserted: Option<ConversationRow> = sqlx::query_as(
                r#"
                INSERT INTO conversations
                    (id, participant_low, participant_high, created_at, last_activity_at)
                VALUES ($1, $2, $3, $4, $5)
                ON CONFLICT (participant_low, participant_high) WHERE deleted_at IS NULL
                DO NOTHING
                RETURNING id, participant_low, participant_high, created_at, last_activity_at
                "#,
            )
            .bind(candidate.id.to_string())
            .bind(pair.low().to_string())
            .bind(pair.high().to_string())
            .bind(candidate.created_at)
            .bind(candidate.last_activity_at)
            .fetch_optional(&self.pool)
            .await
            .map_err(MessagingError::storage)?;

            if let Some(row) = inserted {
                debug!(conversation_id = %candidate.id, "created conversation");
                return row.try_into_conversation().map_err(MessagingError::storage);
            }
        }

        Err(MessagingError::storage(format!(
            "conversation for {} and {} could not be settled",
            pair.low(),
            pair.high()
        )))
    }

    async fn find_by_id(&self, id: ConversationId) -> Result<Conversation, MessagingError> {
        let row: Option<ConversationRow> = sqlx::query_as(
            r#"
            SELECT id, participant_low, participant_high, created_at, last_activity_at
            FROM conversations
            WHERE id = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(MessagingError::storage)?;

        match row {
            Some(r) => r.try_into_conversation().map_err(MessagingError::storage),
            None => Err(MessagingError::ConversationNotFound { id }),
        }
    }

    async fn list_for_user(&self, user: UserId) -> Result<Vec<Conversation>, MessagingError> {
        let rows: Vec<ConversationRow> = sqlx::query_as(
            r#"
            SELECT id, participant_low, participant_high, created_at, last_activity_at
            FROM conversations
            WHERE deleted_at IS NULL AND (participant_low = $1 OR participant_high = $1)
            ORDER BY last_activity_at DESC, id DESC
            "#,
        )
        .bind(user.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(MessagingError::storage)?;

        rows.into_iter()
            .map(|r| r.try_into_conversation().map_err(MessagingError::storage))
            .collect()
    }

    #[instrument(skip(self))]
    async fn delete(&self, id: ConversationId) -> Result<(), MessagingError> {
        let mut tx = self.pool.begin().await.map_err(MessagingError::storage)?;

        // Row lock orders this delete against concurrent sends.
        let state: Option<(Option<DateTime<Utc>>,)> =
            sqlx::query_as("SELECT deleted_at FROM conversations WHERE id = $1 FOR UPDATE")
                .bind(id.to_string())
                .fetch_optional(&mut *tx)
                .await
                .map_err(MessagingError::storage)?;

        match state {
            None => return Err(MessagingError::ConversationNotFound { id }),
            Some((Some(_),)) => return Ok(()),
            Some((None,)) => {}
        }

        sqlx::query("DELETE FROM messages WHERE conversation_id = $1")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(MessagingError::storage)?;

        sqlx::query("DELETE FROM side_chats WHERE conversation_id = $1")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(MessagingError::storage)?;

        sqlx::query("UPDATE conversations SET deleted_at = now() WHERE id = $1")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(MessagingError::storage)?;

        tx.commit().await.map_err(MessagingError::storage)?;
        debug!(conversation_id = %id, "deleted conversation");
        Ok(())
    }
}
