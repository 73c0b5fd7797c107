//! HTTP error mapping for the API routes.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;
use threadline_messaging::MessagingError;

/// Errors returned by API handlers.
#[derive(Debug)]
pub enum ApiError {
    /// A path or body reference could not be parsed.
    InvalidId { kind: &'static str, value: String },
    /// Attachment data was not valid base64.
    InvalidAttachment { reason: String },
    /// Error from the messaging service.
    Messaging(MessagingError),
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidId { kind, value } => write!(f, "invalid {kind} id '{value}'"),
            Self::InvalidAttachment { reason } => write!(f, "invalid attachment: {reason}"),
            Self::Messaging(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for ApiError {}

impl From<MessagingError> for ApiError {
    fn from(e: MessagingError) -> Self {
        Self::Messaging(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            // An unparseable reference cannot name an existing record.
            Self::InvalidId { kind, .. } => (StatusCode::NOT_FOUND, format!("{kind} not found")),
            Self::InvalidAttachment { .. } => (StatusCode::BAD_REQUEST, self.to_string()),
            Self::Messaging(e) => match e {
                MessagingError::ConversationNotFound { .. } => {
                    (StatusCode::NOT_FOUND, "Conversation not found".to_string())
                }
                MessagingError::SideChatNotFound { .. } => {
                    (StatusCode::NOT_FOUND, "Side-chat not found".to_string())
                }
                MessagingError::MessageNotFound { .. } => {
                    (StatusCode::NOT_FOUND, "Message not found".to_string())
                }
                MessagingError::UserNotFound { .. } => {
                    (StatusCode::NOT_FOUND, "User not found".to_string())
                }
                MessagingError::AttachmentTooLarge { .. } => {
                    (StatusCode::PAYLOAD_TOO_LARGE, e.to_string())
                }
                MessagingError::Attachment { reason } => {
                    tracing::error!("Attachment error: {}", reason);
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "Attachment could not be stored".to_string(),
                    )
                }
                MessagingError::Storage { reason } => {
                    tracing::error!("Storage error: {}", reason);
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "Internal server error".to_string(),
                    )
                }
            },
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use threadline_core::{ConversationId, MessageId};

    #[test]
    fn not_found_maps_to_404() {
        let err = ApiError::from(MessagingError::ConversationNotFound {
            id: ConversationId::new(),
        });
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);

        let err = ApiError::from(MessagingError::MessageNotFound {
            id: MessageId::from_raw(3),
        });
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn malformed_id_maps_to_404() {
        let err = ApiError::InvalidId {
            kind: "conversation",
            value: "nope".to_string(),
        };
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn oversized_attachment_maps_to_413() {
        let err = ApiError::from(MessagingError::AttachmentTooLarge {
            size: 2048,
            limit: 1024,
        });
        assert_eq!(err.into_response().status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[test]
    fn storage_failure_maps_to_500() {
        let err = ApiError::from(MessagingError::storage("connection reset"));
        assert_eq!(
            err.into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
