//! NATS notification transport.

use async_trait::async_trait;
use threadline_messaging::{Notification, NotificationEmitter, NotifyError};
use tracing::{debug, instrument};

/// Publishes notifications as JSON to `<prefix>.<recipient>`.
#[derive(Clone)]
pub struct NatsNotifier {
    client: async_nats::Client,
    subject_prefix: String,
}

impl NatsNotifier {
    /// Connects to the NATS server at `url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established.
    pub async fn connect(
        url: &str,
        subject_prefix: impl Into<String>,
    ) -> threadline_core::Result<Self, NotifyError> {
        let client = async_nats::connect(url)
            .await
            .map_err(|e| NotifyError::DeliveryFailed {
                reason: format!("connect to {url}: {e}"),
            })?;
        Ok(Self {
            client,
            subject_prefix: subject_prefix.into(),
        })
    }
}

/// Subject a recipient's notifications are published on.
pub fn subject_for(prefix: &str, notification: &Notification) -> String {
    format!("{prefix}.{}", notification.recipient)
}

#[async_trait]
impl NotificationEmitter for NatsNotifier {
    #[instrument(skip(self, notification), fields(recipient = %notification.recipient))]
    async fn notify(
        &self,
        notification: Notification,
    ) -> threadline_core::Result<(), NotifyError> {
        let payload =
            serde_json::to_vec(&notification).map_err(|e| NotifyError::EncodingFailed {
                reason: e.to_string(),
            })?;
        let subject = subject_for(&self.subject_prefix, &notification);

        self.client
            .publish(subject.clone(), payload.into())
            .await
            .map_err(|e| NotifyError::DeliveryFailed {
                reason: e.to_string(),
            })?;
        debug!(%subject, "published notification");
        Ok(())
    }
}
