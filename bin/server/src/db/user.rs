//! Identity directory backed by the `users` table.

use super::decode_id;
use async_trait::async_trait;
use sqlx::{FromRow, PgPool};
use threadline_core::UserId;
use threadline_messaging::{IdentityError, IdentityLookup, Participant};
use tracing::instrument;

/// Row type for user queries.
#[derive(FromRow)]
struct UserRow {
    id: String,
    display_name: String,
}

impl UserRow {
    fn try_into_participant(self) -> Result<Participant, sqlx::Error> {
        Ok(Participant::new(
            decode_id("id", &self.id)?,
            self.display_name,
        ))
    }
}

/// Read access to users, plus upserts for startup seeding.
pub struct PgIdentityLookup {
    pool: PgPool,
}

impl PgIdentityLookup {
    /// Creates a new repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Inserts a user or refreshes its display name.
    pub async fn upsert(&self, participant: &Participant) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO users (id, display_name)
            VALUES ($1, $2)
            ON CONFLICT (id) DO UPDATE SET display_name = EXCLUDED.display_name
            "#,
        )
        .bind(participant.id.to_string())
        .bind(&participant.display_name)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl IdentityLookup for PgIdentityLookup {
    #[instrument(skip(self))]
    async fn resolve(&self, id: UserId) -> Result<Option<Participant>, IdentityError> {
        let row: Option<UserRow> =
            sqlx::query_as("SELECT id, display_name FROM users WHERE id = $1")
                .bind(id.to_string())
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| IdentityError::LookupFailed {
                    reason: e.to_string(),
                })?;

        row.map(UserRow::try_into_participant)
            .transpose()
            .map_err(|e| IdentityError::LookupFailed {
                reason: e.to_string(),
            })
    }
}
