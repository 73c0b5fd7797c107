//! Error types for the messaging crate.
//!
//! The boundary taxonomy is deliberately small:
//! - `MessagingError`: every store and service operation; NotFound variants
//!   cover any missing or invisible Conversation/SideChat/Message/User
//! - `AttachmentError`: blob storage behind the attachment resolver
//! - `NotifyError`: best-effort notification delivery, never surfaced
//! - `IdentityError`: identity directory failures other than "no such user"

use threadline_core::{ConversationId, MessageId, SideChatId, UserId};
use std::fmt;

/// Errors from messaging operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessagingError {
    /// Conversation does not exist, was deleted, or is not visible to the caller.
    ConversationNotFound { id: ConversationId },
    /// Side-chat does not exist (or is hidden for the attempted operation).
    SideChatNotFound { id: SideChatId },
    /// Message does not exist.
    MessageNotFound { id: MessageId },
    /// User is unknown to the identity directory.
    UserNotFound { id: UserId },
    /// Attachment is larger than the resolver accepts.
    AttachmentTooLarge { size: usize, limit: usize },
    /// Attachment could not be stored.
    Attachment { reason: String },
    /// Storage operation failed.
    Storage { reason: String },
}

impl MessagingError {
    /// Returns true for the NotFound family of errors.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::ConversationNotFound { .. }
                | Self::SideChatNotFound { .. }
                | Self::MessageNotFound { .. }
                | Self::UserNotFound { .. }
        )
    }

    /// Wraps a storage failure.
    pub fn storage(reason: impl fmt::Display) -> Self {
        Self::Storage {
            reason: reason.to_string(),
        }
    }
}

impl fmt::Display for MessagingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConversationNotFound { id } => write!(f, "conversation not found: {id}"),
            Self::SideChatNotFound { id } => write!(f, "side-chat not found: {id}"),
            Self::MessageNotFound { id } => write!(f, "message not found: {id}"),
            Self::UserNotFound { id } => write!(f, "user not found: {id}"),
            Self::AttachmentTooLarge { size, limit } => {
                write!(f, "attachment of {size} bytes exceeds limit of {limit} bytes")
            }
            Self::Attachment { reason } => write!(f, "attachment failed: {reason}"),
            Self::Storage { reason } => write!(f, "messaging storage failed: {reason}"),
        }
    }
}

impl std::error::Error for MessagingError {}

/// Errors from attachment blob storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttachmentError {
    /// Blob exceeds the configured size limit.
    TooLarge { size: usize, limit: usize },
    /// Writing the blob failed.
    WriteFailed { reason: String },
    /// Removing a stored blob failed.
    RemoveFailed { reason: String },
}

impl fmt::Display for AttachmentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooLarge { size, limit } => {
                write!(f, "attachment of {size} bytes exceeds limit of {limit} bytes")
            }
            Self::WriteFailed { reason } => write!(f, "attachment write failed: {reason}"),
            Self::RemoveFailed { reason } => write!(f, "attachment removal failed: {reason}"),
        }
    }
}

impl std::error::Error for AttachmentError {}

/// Errors from notification delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotifyError {
    /// The transport rejected or could not deliver the notification.
    DeliveryFailed { reason: String },
    /// The notification could not be encoded.
    EncodingFailed { reason: String },
}

impl fmt::Display for NotifyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DeliveryFailed { reason } => write!(f, "notification delivery failed: {reason}"),
            Self::EncodingFailed { reason } => {
                write!(f, "notification encoding failed: {reason}")
            }
        }
    }
}

impl std::error::Error for NotifyError {}

/// Errors from the identity directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityError {
    /// Lookup could not be performed.
    LookupFailed { reason: String },
}

impl fmt::Display for IdentityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LookupFailed { reason } => write!(f, "identity lookup failed: {reason}"),
        }
    }
}

impl std::error::Error for IdentityError {}

impl From<IdentityError> for MessagingError {
    fn from(err: IdentityError) -> Self {
        Self::storage(err)
    }
}
