//! Notification sink writing to the `notifications` table.

use async_trait::async_trait;
use sqlx::PgPool;
use threadline_messaging::{Notification, NotificationEmitter, NotificationKind, NotifyError};
use tracing::instrument;

fn kind_str(kind: NotificationKind) -> &'static str {
    match kind {
        NotificationKind::NewMessage => "new_message",
    }
}

/// Stores notifications for later pickup by the recipient's client.
pub struct PgNotificationStore {
    pool: PgPool,
}

impl PgNotificationStore {
    /// Creates a new repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NotificationEmitter for PgNotificationStore {
    #[instrument(skip(self, notification), fields(recipient = %notification.recipient))]
    async fn notify(
        &self,
        notification: Notification,
    ) -> threadline_core::Result<(), NotifyError> {
        sqlx::query(
            r#"
            INSERT INTO notifications (recipient_id, kind, subject_id, summary)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(notification.recipient.to_string())
        .bind(kind_str(notification.kind))
        .bind(&notification.subject_id)
        .bind(&notification.summary)
        .execute(&self.pool)
        .await
        .map_err(|e| NotifyError::DeliveryFailed {
            reason: e.to_string(),
        })?;
        Ok(())
    }
}
