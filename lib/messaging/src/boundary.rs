//! Contracts for the external collaborators of the messaging core.
//!
//! - **IdentityLookup**: resolves user IDs to display records (read-only)
//! - **AttachmentResolver**: turns an uploaded blob into a stored reference
//! - **NotificationEmitter**: one-way, best-effort sink for new-message notices

use crate::error::{AttachmentError, IdentityError, NotifyError};
use crate::message::Attachment;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use threadline_core::{AttachmentToken, UserId};

/// A participant as known to the identity directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    /// User identifier.
    pub id: UserId,
    /// Name shown to other users.
    pub display_name: String,
}

impl Participant {
    /// Creates a participant record.
    #[must_use]
    pub fn new(id: UserId, display_name: impl Into<String>) -> Self {
        Self {
            id,
            display_name: display_name.into(),
        }
    }

    /// Single uppercased initial used as an avatar label.
    #[must_use]
    pub fn avatar(&self) -> String {
        avatar_initial(&self.display_name)
    }
}

/// First character of `name`, uppercased; `?` for an empty name.
#[must_use]
pub fn avatar_initial(name: &str) -> String {
    match name.trim().chars().next() {
        Some(c) => c.to_uppercase().collect(),
        None => "?".to_string(),
    }
}

/// Read-only access to the account directory.
#[async_trait]
pub trait IdentityLookup: Send + Sync {
    /// Resolves a user, returning `None` when no such user exists.
    async fn resolve(&self, id: UserId) -> Result<Option<Participant>, IdentityError>;
}

/// An uploaded blob awaiting storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentUpload {
    /// Original file name.
    pub file_name: String,
    /// Declared media type.
    pub media_type: String,
    /// Raw bytes.
    pub data: Vec<u8>,
}

/// Stores blobs and hands back references the core keeps on messages.
#[async_trait]
pub trait AttachmentResolver: Send + Sync {
    /// Stores `upload` and returns its reference triple.
    async fn store(
        &self,
        upload: AttachmentUpload,
    ) -> threadline_core::Result<Attachment, AttachmentError>;

    /// Removes a blob no message refers to. Unknown tokens are ignored.
    async fn discard(&self, token: AttachmentToken)
    -> threadline_core::Result<(), AttachmentError>;
}

/// Kind of notification emitted by the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotificationKind {
    /// A message was sent to the recipient.
    NewMessage,
}

/// A notification for one recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    /// Who should be told.
    pub recipient: UserId,
    /// What happened.
    pub kind: NotificationKind,
    /// Conversation or side-chat ID, in display form.
    pub subject_id: String,
    /// Short human-readable summary.
    pub summary: String,
}

/// One-way notification sink.
///
/// Delivery is best-effort: callers log failures and carry on.
#[async_trait]
pub trait NotificationEmitter: Send + Sync {
    /// Emits a notification.
    async fn notify(&self, notification: Notification)
    -> threadline_core::Result<(), NotifyError>;
}
