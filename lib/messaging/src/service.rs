//! Messaging service: the inbound operations over the stores and boundaries.
//!
//! The service resolves participants, enforces that senders and side-chat
//! creators take part in the conversation, stores attachments before the
//! message that references them (discarding them again if the send is
//! refused), and fans out one best-effort notification per successful send.

use crate::boundary::{
    AttachmentResolver, AttachmentUpload, IdentityLookup, Notification, NotificationEmitter,
    NotificationKind, Participant,
};
use crate::conversation::{Conversation, ConversationDirectory};
use crate::error::{AttachmentError, MessagingError};
use crate::message::{Message, MessageLog, MessageScope, NewMessage};
use crate::side_chat::{SideChatRegistry, SideChatSummary};
use crate::view::{ConversationSummary, MessageView, NO_MESSAGES_PREVIEW, SideChatView};
use std::collections::HashMap;
use std::sync::Arc;
use threadline_core::{ConversationId, MessageId, SideChatId, UserId};
use tracing::{debug, instrument, warn};

/// Display name used when a sender is no longer in the directory.
const UNKNOWN_USER: &str = "Unknown user";

/// Store and boundary implementations the service runs on.
#[derive(Clone)]
pub struct Backends {
    pub directory: Arc<dyn ConversationDirectory>,
    pub messages: Arc<dyn MessageLog>,
    pub side_chats: Arc<dyn SideChatRegistry>,
    pub identities: Arc<dyn IdentityLookup>,
    pub attachments: Arc<dyn AttachmentResolver>,
    pub notifier: Arc<dyn NotificationEmitter>,
}

/// A send request for either scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendRequest {
    /// Author; must be a participant.
    pub sender: UserId,
    /// Text content. May be empty when an attachment is present.
    pub content: String,
    /// Blob to store and attach.
    pub attachment: Option<AttachmentUpload>,
}

impl SendRequest {
    /// Creates a text-only request.
    #[must_use]
    pub fn text(sender: UserId, content: impl Into<String>) -> Self {
        Self {
            sender,
            content: content.into(),
            attachment: None,
        }
    }

    /// Adds an attachment.
    #[must_use]
    pub fn with_attachment(mut self, upload: AttachmentUpload) -> Self {
        self.attachment = Some(upload);
        self
    }
}

/// Orchestrates conversations, side-chats and messages.
#[derive(Clone)]
pub struct MessagingService {
    backends: Backends,
}

impl MessagingService {
    /// Creates a service over the given backends.
    #[must_use]
    pub fn new(backends: Backends) -> Self {
        Self { backends }
    }

    /// Returns the conversation for two users, creating it on first use.
    #[instrument(skip(self))]
    pub async fn start_conversation(
        &self,
        user_a: UserId,
        user_b: UserId,
    ) -> Result<Conversation, MessagingError> {
        self.require_user(user_a).await?;
        self.require_user(user_b).await?;
        self.backends.directory.get_or_create(user_a, user_b).await
    }

    /// Lists a user's conversations, most recent activity first.
    #[instrument(skip(self))]
    pub async fn list_conversations(
        &self,
        user: UserId,
    ) -> Result<Vec<ConversationSummary>, MessagingError> {
        self.require_user(user).await?;
        let conversations = self.backends.directory.list_for_user(user).await?;

        let mut names = NameCache::default();
        let mut summaries = Vec::with_capacity(conversations.len());
        for conversation in conversations {
            let messages = match self
                .backends
                .messages
                .list_for_conversation(conversation.id)
                .await
            {
                Ok(messages) => messages,
                // Deleted between the two reads.
                Err(e) if e.is_not_found() => continue,
                Err(e) => return Err(e),
            };

            let other_id = conversation.other_participant(user).unwrap_or(user);
            let other = names.get(self, other_id).await?;
            let latest = messages.iter().rev().find(|m| !m.is_deleted);
            let (last_message, last_message_at) = match latest {
                Some(m) => (m.content.clone(), m.sent_at),
                None => (NO_MESSAGES_PREVIEW.to_string(), conversation.created_at),
            };

            summaries.push(ConversationSummary {
                id: conversation.id,
                other_user_id: other.id,
                avatar: other.avatar(),
                other_display_name: other.display_name,
                last_message,
                last_message_at,
                last_activity_at: conversation.last_activity_at,
                created_at: conversation.created_at,
            });
        }
        Ok(summaries)
    }

    /// Lists the main-thread messages of a conversation.
    pub async fn list_messages(
        &self,
        conversation_id: ConversationId,
    ) -> Result<Vec<MessageView>, MessagingError> {
        let messages = self
            .backends
            .messages
            .list_for_conversation(conversation_id)
            .await?;
        self.views(messages).await
    }

    /// Sends a message on a conversation's main thread.
    pub async fn send_message(
        &self,
        conversation_id: ConversationId,
        request: SendRequest,
    ) -> Result<MessageView, MessagingError> {
        self.send_in_scope(MessageScope::Conversation(conversation_id), request)
            .await
    }

    /// Sends a message into a side-chat.
    pub async fn send_side_chat_message(
        &self,
        side_chat_id: SideChatId,
        request: SendRequest,
    ) -> Result<MessageView, MessagingError> {
        self.send_in_scope(MessageScope::SideChat(side_chat_id), request)
            .await
    }

    /// Edits a message's content.
    #[instrument(skip(self, content))]
    pub async fn edit_message(
        &self,
        id: MessageId,
        content: String,
    ) -> Result<MessageView, MessagingError> {
        let message = self.backends.messages.edit(id, content).await?;
        self.view(message).await
    }

    /// Soft-deletes a message.
    #[instrument(skip(self))]
    pub async fn delete_message(&self, id: MessageId) -> Result<MessageView, MessagingError> {
        let message = self.backends.messages.delete(id).await?;
        self.view(message).await
    }

    /// Lists the visible side-chats of a conversation, newest first.
    pub async fn list_side_chats(
        &self,
        conversation_id: ConversationId,
    ) -> Result<Vec<SideChatView>, MessagingError> {
        let summaries = self
            .backends
            .side_chats
            .list_side_chats(conversation_id)
            .await?;

        let mut names = NameCache::default();
        let mut views = Vec::with_capacity(summaries.len());
        for summary in summaries {
            let creator = names.get(self, summary.side_chat.created_by).await?;
            views.push(SideChatView::new(summary, &creator));
        }
        Ok(views)
    }

    /// Opens a side-chat on a conversation the creator takes part in.
    #[instrument(skip(self, title))]
    pub async fn create_side_chat(
        &self,
        conversation_id: ConversationId,
        title: String,
        creator: UserId,
    ) -> Result<SideChatView, MessagingError> {
        let participant = self.require_user(creator).await?;
        let conversation = self.backends.directory.find_by_id(conversation_id).await?;
        if !conversation.has_participant(creator) {
            return Err(MessagingError::ConversationNotFound {
                id: conversation_id,
            });
        }

        let side_chat = self
            .backends
            .side_chats
            .create(conversation_id, title, creator)
            .await?;
        debug!(side_chat_id = %side_chat.id, "side-chat opened");
        Ok(SideChatView::new(
            SideChatSummary {
                side_chat,
                message_count: 0,
            },
            &participant,
        ))
    }

    /// Lists a side-chat's messages, including after it was hidden.
    pub async fn list_side_chat_messages(
        &self,
        side_chat_id: SideChatId,
    ) -> Result<Vec<MessageView>, MessagingError> {
        let messages = self
            .backends
            .messages
            .list_for_side_chat(side_chat_id)
            .await?;
        self.views(messages).await
    }

    /// Hides a side-chat.
    #[instrument(skip(self))]
    pub async fn delete_side_chat(&self, side_chat_id: SideChatId) -> Result<(), MessagingError> {
        self.backends.side_chats.delete(side_chat_id).await
    }

    /// Deletes a conversation with everything in it.
    #[instrument(skip(self))]
    pub async fn delete_conversation(
        &self,
        conversation_id: ConversationId,
    ) -> Result<(), MessagingError> {
        self.backends.directory.delete(conversation_id).await
    }

    #[instrument(skip(self, request), fields(sender = %request.sender))]
    async fn send_in_scope(
        &self,
        scope: MessageScope,
        request: SendRequest,
    ) -> Result<MessageView, MessagingError> {
        let sender = self.require_user(request.sender).await?;

        let conversation_id = match scope {
            MessageScope::Conversation(id) => id,
            MessageScope::SideChat(id) => {
                let side_chat = self.backends.side_chats.find_by_id(id).await?;
                if side_chat.is_deleted {
                    return Err(MessagingError::SideChatNotFound { id });
                }
                side_chat.conversation_id
            }
        };
        let conversation = self.backends.directory.find_by_id(conversation_id).await?;
        if !conversation.has_participant(sender.id) {
            return Err(MessagingError::ConversationNotFound {
                id: conversation_id,
            });
        }

        let attachment = match request.attachment {
            Some(upload) => Some(self.backends.attachments.store(upload).await.map_err(
                |report| match report.current_context() {
                    AttachmentError::TooLarge { size, limit } => {
                        MessagingError::AttachmentTooLarge {
                            size: *size,
                            limit: *limit,
                        }
                    }
                    _ => {
                        warn!(error = %report, "failed to store attachment");
                        MessagingError::Attachment {
                            reason: report.to_string(),
                        }
                    }
                },
            )?),
            None => None,
        };
        let stored_token = attachment.as_ref().map(|a| a.token);

        let content = match &attachment {
            Some(a) if request.content.trim().is_empty() => format!("📎 {}", a.display_name),
            _ => request.content,
        };
        let has_attachment = attachment.is_some();

        let sent = self
            .backends
            .messages
            .send(
                scope,
                NewMessage {
                    sender: sender.id,
                    content,
                    attachment,
                },
            )
            .await;
        let message = match sent {
            Ok(message) => message,
            Err(err) => {
                // Nothing refers to the blob once the send is refused.
                if let Some(token) = stored_token {
                    if let Err(report) = self.backends.attachments.discard(token).await {
                        warn!(error = %report, %token, "orphaned attachment not removed");
                    }
                }
                return Err(err);
            }
        };

        if let Some(recipient) = conversation.other_participant(sender.id) {
            let subject_id = match scope {
                MessageScope::Conversation(id) => id.to_string(),
                MessageScope::SideChat(id) => id.to_string(),
            };
            let what = if has_attachment { "a file" } else { "a message" };
            let notification = Notification {
                recipient,
                kind: NotificationKind::NewMessage,
                subject_id,
                summary: format!("{} sent you {what}", sender.display_name),
            };
            if let Err(report) = self.backends.notifier.notify(notification).await {
                warn!(error = %report, %recipient, "new-message notification not delivered");
            }
        }

        Ok(MessageView::new(message, &sender))
    }

    async fn require_user(&self, id: UserId) -> Result<Participant, MessagingError> {
        self.backends
            .identities
            .resolve(id)
            .await?
            .ok_or(MessagingError::UserNotFound { id })
    }

    async fn display(&self, id: UserId) -> Result<Participant, MessagingError> {
        Ok(self
            .backends
            .identities
            .resolve(id)
            .await?
            .unwrap_or_else(|| Participant::new(id, UNKNOWN_USER)))
    }

    async fn view(&self, message: Message) -> Result<MessageView, MessagingError> {
        let sender = self.display(message.sender).await?;
        Ok(MessageView::new(message, &sender))
    }

    async fn views(&self, messages: Vec<Message>) -> Result<Vec<MessageView>, MessagingError> {
        let mut names = NameCache::default();
        let mut views = Vec::with_capacity(messages.len());
        for message in messages {
            let sender = names.get(self, message.sender).await?;
            views.push(MessageView::new(message, &sender));
        }
        Ok(views)
    }
}

/// Per-call memo of identity lookups.
#[derive(Default)]
struct NameCache {
    resolved: HashMap<UserId, Participant>,
}

impl NameCache {
    async fn get(
        &mut self,
        service: &MessagingService,
        id: UserId,
    ) -> Result<Participant, MessagingError> {
        if let Some(participant) = self.resolved.get(&id) {
            return Ok(participant.clone());
        }
        let participant = service.display(id).await?;
        self.resolved.insert(id, participant.clone());
        Ok(participant)
    }
}
