//! Core domain types and utilities for threadline.
//!
//! This crate provides the identifier types and the error-handling
//! foundation shared by the messaging library and the server.

pub mod error;
pub mod id;

pub use error::Result;
pub use id::{AttachmentToken, ConversationId, MessageId, ParseIdError, SideChatId, UserId};
