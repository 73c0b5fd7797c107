//! Messaging core for threadline.
//!
//! This crate provides:
//!
//! - **Conversation Directory**: one conversation per unordered pair of users
//! - **Message Log**: ordered messages with edit and soft-delete
//! - **Side-Chat Registry**: titled sub-threads with live message counts
//! - **Messaging Service**: the inbound operations, attachment glue and
//!   new-message notifications
//! - **In-memory backends** for local runs and tests

pub mod boundary;
pub mod conversation;
pub mod error;
pub mod memory;
pub mod message;
pub mod service;
pub mod side_chat;
pub mod view;

pub use boundary::{
    AttachmentResolver, AttachmentUpload, IdentityLookup, Notification, NotificationEmitter,
    NotificationKind, Participant, avatar_initial,
};
pub use conversation::{Conversation, ConversationDirectory, ParticipantPair};
pub use error::{AttachmentError, IdentityError, MessagingError, NotifyError};
pub use message::{
    Attachment, DELETED_PLACEHOLDER, Message, MessageLog, MessageScope, NewMessage,
};
pub use service::{Backends, MessagingService, SendRequest};
pub use side_chat::{SideChat, SideChatRegistry, SideChatSummary};
pub use view::{ConversationSummary, MessageView, NO_MESSAGES_PREVIEW, SideChatView};
