//! In-memory backends.
//!
//! [`MemoryStore`] keeps every conversation, side-chat and message as an
//! owned record in one arena, indexed by ID, behind a single async mutex.
//! Each contract operation takes the lock once, which makes pair lookup and
//! insert, message insert plus `last_activity_at`, and cascade deletes
//! atomic. The other types back the external boundaries for local runs and
//! tests.

use crate::boundary::{
    AttachmentResolver, AttachmentUpload, IdentityLookup, Notification, NotificationEmitter,
    Participant,
};
use crate::conversation::{Conversation, ConversationDirectory, ParticipantPair};
use crate::error::{AttachmentError, IdentityError, MessagingError, NotifyError};
use crate::message::{Attachment, Message, MessageLog, MessageScope, NewMessage};
use crate::side_chat::{SideChat, SideChatRegistry, SideChatSummary};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use threadline_core::{AttachmentToken, ConversationId, MessageId, SideChatId, UserId};
use tokio::sync::Mutex;
use tracing::{debug, instrument};

#[derive(Default)]
struct Arena {
    conversations: HashMap<ConversationId, Conversation>,
    by_pair: HashMap<ParticipantPair, ConversationId>,
    /// Conversations that existed and were deleted; makes delete idempotent.
    removed: HashSet<ConversationId>,
    side_chats: HashMap<SideChatId, SideChat>,
    /// Side-chat IDs per conversation, in creation order.
    side_chat_order: HashMap<ConversationId, Vec<SideChatId>>,
    messages: BTreeMap<MessageId, Message>,
    /// Message IDs per scope, in acceptance order.
    scopes: HashMap<MessageScope, Vec<MessageId>>,
    last_message_seq: i64,
}

impl Arena {
    fn live_conversation(&self, id: ConversationId) -> Result<&Conversation, MessagingError> {
        self.conversations
            .get(&id)
            .ok_or(MessagingError::ConversationNotFound { id })
    }

    fn side_chat(&self, id: SideChatId) -> Result<&SideChat, MessagingError> {
        self.side_chats
            .get(&id)
            .ok_or(MessagingError::SideChatNotFound { id })
    }

    fn message_mut(&mut self, id: MessageId) -> Result<&mut Message, MessagingError> {
        self.messages
            .get_mut(&id)
            .ok_or(MessagingError::MessageNotFound { id })
    }

    fn scoped_messages(&self, scope: MessageScope) -> Vec<Message> {
        self.scopes
            .get(&scope)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| self.messages.get(id))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    fn live_count(&self, scope: MessageScope) -> u64 {
        self.scopes
            .get(&scope)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| self.messages.get(id))
                    .filter(|m| !m.is_deleted)
                    .count() as u64
            })
            .unwrap_or(0)
    }

    fn drop_scope(&mut self, scope: MessageScope) {
        if let Some(ids) = self.scopes.remove(&scope) {
            for id in ids {
                self.messages.remove(&id);
            }
        }
    }
}

/// Arena-backed implementation of all three store contracts.
#[derive(Default)]
pub struct MemoryStore {
    arena: Mutex<Arena>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConversationDirectory for MemoryStore {
    #[instrument(skip(self))]
    async fn get_or_create(&self, a: UserId, b: UserId) -> Result<Conversation, MessagingError> {
        let pair = ParticipantPair::new(a, b);
        let mut arena = self.arena.lock().await;

        if let Some(id) = arena.by_pair.get(&pair) {
            return arena.live_conversation(*id).cloned();
        }

        let conversation = Conversation::new(pair);
        arena.by_pair.insert(pair, conversation.id);
        arena
            .conversations
            .insert(conversation.id, conversation.clone());
        debug!(conversation_id = %conversation.id, "created conversation");
        Ok(conversation)
    }

    async fn find_by_id(&self, id: ConversationId) -> Result<Conversation, MessagingError> {
        let arena = self.arena.lock().await;
        arena.live_conversation(id).cloned()
    }

    async fn list_for_user(&self, user: UserId) -> Result<Vec<Conversation>, MessagingError> {
        let arena = self.arena.lock().await;
        let mut conversations: Vec<Conversation> = arena
            .conversations
            .values()
            .filter(|c| c.has_participant(user))
            .cloned()
            .collect();
        conversations.sort_by(|x, y| {
            y.last_activity_at
                .cmp(&x.last_activity_at)
                .then_with(|| y.id.cmp(&x.id))
        });
        Ok(conversations)
    }

    #[instrument(skip(self))]
    async fn delete(&self, id: ConversationId) -> Result<(), MessagingError> {
        let mut arena = self.arena.lock().await;

        let Some(conversation) = arena.conversations.remove(&id) else {
            if arena.removed.contains(&id) {
                return Ok(());
            }
            return Err(MessagingError::ConversationNotFound { id });
        };

        arena.by_pair.remove(&conversation.participants);
        arena.drop_scope(MessageScope::Conversation(id));
        let side_chat_ids = arena.side_chat_order.remove(&id).unwrap_or_default();
        for side_chat_id in side_chat_ids {
            arena.side_chats.remove(&side_chat_id);
            arena.drop_scope(MessageScope::SideChat(side_chat_id));
        }
        arena.removed.insert(id);
        debug!(conversation_id = %id, "deleted conversation");
        Ok(())
    }
}

#[async_trait]
impl MessageLog for MemoryStore {
    #[instrument(skip(self, message), fields(sender = %message.sender))]
    async fn send(
        &self,
        scope: MessageScope,
        message: NewMessage,
    ) -> Result<Message, MessagingError> {
        let mut arena = self.arena.lock().await;

        let (conversation_id, side_chat_id) = match scope {
            MessageScope::Conversation(id) => (id, None),
            MessageScope::SideChat(id) => {
                let side_chat = arena.side_chat(id)?;
                if side_chat.is_deleted {
                    return Err(MessagingError::SideChatNotFound { id });
                }
                (side_chat.conversation_id, Some(id))
            }
        };

        let last_activity = arena.live_conversation(conversation_id)?.last_activity_at;
        // Keep timestamps non-decreasing along acceptance order.
        let sent_at = Utc::now().max(last_activity);

        arena.last_message_seq += 1;
        let id = MessageId::from_raw(arena.last_message_seq);
        let stored = Message {
            id,
            conversation_id,
            side_chat_id,
            sender: message.sender,
            content: message.content,
            sent_at,
            is_edited: false,
            is_deleted: false,
            attachment: message.attachment,
        };

        if let Some(conversation) = arena.conversations.get_mut(&conversation_id) {
            conversation.last_activity_at = sent_at;
        }
        arena.scopes.entry(scope).or_default().push(id);
        arena.messages.insert(id, stored.clone());
        debug!(message_id = %id, "accepted message");
        Ok(stored)
    }

    async fn find_by_id(&self, id: MessageId) -> Result<Message, MessagingError> {
        let arena = self.arena.lock().await;
        arena
            .messages
            .get(&id)
            .cloned()
            .ok_or(MessagingError::MessageNotFound { id })
    }

    #[instrument(skip(self, content))]
    async fn edit(&self, id: MessageId, content: String) -> Result<Message, MessagingError> {
        let mut arena = self.arena.lock().await;
        let message = arena.message_mut(id)?;
        message.apply_edit(content);
        Ok(message.clone())
    }

    #[instrument(skip(self))]
    async fn delete(&self, id: MessageId) -> Result<Message, MessagingError> {
        let mut arena = self.arena.lock().await;
        let message = arena.message_mut(id)?;
        message.apply_delete();
        Ok(message.clone())
    }

    async fn list_for_conversation(
        &self,
        id: ConversationId,
    ) -> Result<Vec<Message>, MessagingError> {
        let arena = self.arena.lock().await;
        arena.live_conversation(id)?;
        Ok(arena.scoped_messages(MessageScope::Conversation(id)))
    }

    async fn list_for_side_chat(&self, id: SideChatId) -> Result<Vec<Message>, MessagingError> {
        let arena = self.arena.lock().await;
        arena.side_chat(id)?;
        Ok(arena.scoped_messages(MessageScope::SideChat(id)))
    }
}

#[async_trait]
impl SideChatRegistry for MemoryStore {
    #[instrument(skip(self, title))]
    async fn create(
        &self,
        conversation_id: ConversationId,
        title: String,
        creator: UserId,
    ) -> Result<SideChat, MessagingError> {
        let mut arena = self.arena.lock().await;
        arena.live_conversation(conversation_id)?;

        let side_chat = SideChat::new(conversation_id, title, creator);
        arena
            .side_chat_order
            .entry(conversation_id)
            .or_default()
            .push(side_chat.id);
        arena.side_chats.insert(side_chat.id, side_chat.clone());
        debug!(side_chat_id = %side_chat.id, "created side-chat");
        Ok(side_chat)
    }

    async fn find_by_id(&self, id: SideChatId) -> Result<SideChat, MessagingError> {
        let arena = self.arena.lock().await;
        arena.side_chat(id).cloned()
    }

    async fn list_side_chats(
        &self,
        conversation_id: ConversationId,
    ) -> Result<Vec<SideChatSummary>, MessagingError> {
        let arena = self.arena.lock().await;
        arena.live_conversation(conversation_id)?;

        let order = arena
            .side_chat_order
            .get(&conversation_id)
            .cloned()
            .unwrap_or_default();
        Ok(order
            .iter()
            .rev()
            .filter_map(|id| arena.side_chats.get(id))
            .filter(|side_chat| !side_chat.is_deleted)
            .map(|side_chat| SideChatSummary {
                side_chat: side_chat.clone(),
                message_count: arena.live_count(MessageScope::SideChat(side_chat.id)),
            })
            .collect())
    }

    #[instrument(skip(self))]
    async fn delete(&self, id: SideChatId) -> Result<(), MessagingError> {
        let mut arena = self.arena.lock().await;
        let side_chat = arena
            .side_chats
            .get_mut(&id)
            .ok_or(MessagingError::SideChatNotFound { id })?;
        side_chat.is_deleted = true;
        Ok(())
    }

    async fn message_count(&self, id: SideChatId) -> Result<u64, MessagingError> {
        let arena = self.arena.lock().await;
        arena.side_chat(id)?;
        Ok(arena.live_count(MessageScope::SideChat(id)))
    }
}

/// Identity directory backed by a map of registered participants.
#[derive(Default)]
pub struct MemoryIdentityLookup {
    participants: RwLock<HashMap<UserId, Participant>>,
}

impl MemoryIdentityLookup {
    /// Creates a directory with the given participants.
    #[must_use]
    pub fn with_participants(participants: impl IntoIterator<Item = Participant>) -> Self {
        let lookup = Self::default();
        for participant in participants {
            lookup.register(participant);
        }
        lookup
    }

    /// Registers or replaces a participant.
    pub fn register(&self, participant: Participant) {
        if let Ok(mut participants) = self.participants.write() {
            participants.insert(participant.id, participant);
        }
    }
}

#[async_trait]
impl IdentityLookup for MemoryIdentityLookup {
    async fn resolve(&self, id: UserId) -> Result<Option<Participant>, IdentityError> {
        let participants = self
            .participants
            .read()
            .map_err(|e| IdentityError::LookupFailed {
                reason: e.to_string(),
            })?;
        Ok(participants.get(&id).cloned())
    }
}

/// Attachment store that keeps blobs in memory.
pub struct MemoryAttachmentStore {
    max_bytes: usize,
    blobs: RwLock<HashMap<AttachmentToken, AttachmentUpload>>,
}

impl MemoryAttachmentStore {
    /// Creates a store rejecting blobs larger than `max_bytes`.
    #[must_use]
    pub fn new(max_bytes: usize) -> Self {
        Self {
            max_bytes,
            blobs: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the stored blob for a token.
    #[must_use]
    pub fn get(&self, token: AttachmentToken) -> Option<AttachmentUpload> {
        self.blobs.read().ok()?.get(&token).cloned()
    }
}

#[async_trait]
impl AttachmentResolver for MemoryAttachmentStore {
    async fn store(
        &self,
        upload: AttachmentUpload,
    ) -> threadline_core::Result<Attachment, AttachmentError> {
        if upload.data.len() > self.max_bytes {
            return Err(AttachmentError::TooLarge {
                size: upload.data.len(),
                limit: self.max_bytes,
            }
            .into());
        }

        let attachment = Attachment {
            token: AttachmentToken::new(),
            display_name: upload.file_name.clone(),
            media_type: upload.media_type.clone(),
        };
        let mut blobs = self
            .blobs
            .write()
            .map_err(|e| AttachmentError::WriteFailed {
                reason: e.to_string(),
            })?;
        blobs.insert(attachment.token, upload);
        Ok(attachment)
    }

    async fn discard(
        &self,
        token: AttachmentToken,
    ) -> threadline_core::Result<(), AttachmentError> {
        let mut blobs = self
            .blobs
            .write()
            .map_err(|e| AttachmentError::RemoveFailed {
                reason: e.to_string(),
            })?;
        blobs.remove(&token);
        Ok(())
    }
}

/// Notification sink that records what it was asked to deliver.
#[derive(Default)]
pub struct MemoryNotifier {
    delivered: RwLock<Vec<Notification>>,
    failing: AtomicBool,
}

impl MemoryNotifier {
    /// Creates a recording notifier.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent delivery fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Notifications delivered so far.
    #[must_use]
    pub fn delivered(&self) -> Vec<Notification> {
        self.delivered
            .read()
            .map(|d| d.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl NotificationEmitter for MemoryNotifier {
    async fn notify(
        &self,
        notification: Notification,
    ) -> threadline_core::Result<(), NotifyError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(NotifyError::DeliveryFailed {
                reason: "notifier is failing".to_string(),
            }
            .into());
        }
        let mut delivered = self
            .delivered
            .write()
            .map_err(|e| NotifyError::DeliveryFailed {
                reason: e.to_string(),
            })?;
        delivered.push(notification);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::DELETED_PLACEHOLDER;
    use std::sync::Arc;

    fn pair() -> (UserId, UserId) {
        (UserId::new(), UserId::new())
    }

    #[tokio::test]
    async fn get_or_create_is_pair_symmetric() {
        let store = MemoryStore::new();
        let (a, b) = pair();

        let first = store.get_or_create(a, b).await.unwrap();
        let second = store.get_or_create(b, a).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(store.list_for_user(a).await.unwrap().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_get_or_create_converges() {
        let store = Arc::new(MemoryStore::new());
        let (a, b) = pair();

        let calls = (0..64).map(|i| {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                if i % 2 == 0 {
                    store.get_or_create(a, b).await
                } else {
                    store.get_or_create(b, a).await
                }
            })
        });
        let results = futures::future::join_all(calls).await;

        let ids: HashSet<ConversationId> = results
            .into_iter()
            .map(|r| r.expect("task").expect("get_or_create").id)
            .collect();
        assert_eq!(ids.len(), 1);
        assert_eq!(store.list_for_user(b).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn hello_hi_scenario() {
        let store = MemoryStore::new();
        let (u1, u2) = pair();
        let conv = store.get_or_create(u1, u2).await.unwrap();

        store
            .send(MessageScope::Conversation(conv.id), NewMessage::text(u1, "hello"))
            .await
            .unwrap();
        let hi = store
            .send(MessageScope::Conversation(conv.id), NewMessage::text(u2, "hi"))
            .await
            .unwrap();

        let contents: Vec<String> = store
            .list_for_conversation(conv.id)
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.content)
            .collect();
        assert_eq!(contents, vec!["hello", "hi"]);

        let conv = ConversationDirectory::find_by_id(&store, conv.id).await.unwrap();
        assert_eq!(conv.last_activity_at, hi.sent_at);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_sends_are_totally_ordered() {
        let store = Arc::new(MemoryStore::new());
        let (a, b) = pair();
        let conv = store.get_or_create(a, b).await.unwrap();
        let scope = MessageScope::Conversation(conv.id);

        let sends = (0..50).map(|i| {
            let store = Arc::clone(&store);
            let sender = if i % 2 == 0 { a } else { b };
            tokio::spawn(async move {
                store
                    .send(scope, NewMessage::text(sender, format!("m{i}")))
                    .await
            })
        });
        for result in futures::future::join_all(sends).await {
            result.expect("task").expect("send");
        }

        let first = store.list_for_conversation(conv.id).await.unwrap();
        let second = store.list_for_conversation(conv.id).await.unwrap();
        assert_eq!(first.len(), 50);
        assert_eq!(first, second);
        for window in first.windows(2) {
            assert!(window[0].id < window[1].id);
            assert!(window[0].sent_at <= window[1].sent_at);
        }
    }

    #[tokio::test]
    async fn edit_and_delete_transitions() {
        let store = MemoryStore::new();
        let (a, b) = pair();
        let conv = store.get_or_create(a, b).await.unwrap();
        let scope = MessageScope::Conversation(conv.id);
        let first = store.send(scope, NewMessage::text(a, "one")).await.unwrap();
        let second = store.send(scope, NewMessage::text(b, "two")).await.unwrap();

        let edited = store.edit(first.id, "uno".to_string()).await.unwrap();
        assert!(edited.is_edited);
        let edited = store.edit(first.id, "eins".to_string()).await.unwrap();
        assert!(edited.is_edited);
        assert_eq!(edited.content, "eins");

        let deleted = MessageLog::delete(&store, second.id).await.unwrap();
        assert!(deleted.is_deleted);
        assert!(!deleted.is_edited);
        assert_eq!(deleted.content, DELETED_PLACEHOLDER);
        let again = MessageLog::delete(&store, second.id).await.unwrap();
        assert_eq!(again, deleted);

        let listed = store.list_for_conversation(conv.id).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[1].id, second.id);
        assert_eq!(listed[1].content, DELETED_PLACEHOLDER);
    }

    #[tokio::test]
    async fn editing_a_deleted_message_keeps_it_deleted() {
        let store = MemoryStore::new();
        let (a, b) = pair();
        let conv = store.get_or_create(a, b).await.unwrap();
        let scope = MessageScope::Conversation(conv.id);
        let first = store.send(scope, NewMessage::text(a, "one")).await.unwrap();
        let second = store.send(scope, NewMessage::text(b, "two")).await.unwrap();
        let third = store.send(scope, NewMessage::text(a, "three")).await.unwrap();

        MessageLog::delete(&store, second.id).await.unwrap();
        let edited = store.edit(second.id, "zwei".to_string()).await.unwrap();
        assert!(edited.is_deleted);
        assert!(edited.is_edited);
        assert_eq!(edited.content, "zwei");

        let listed = store.list_for_conversation(conv.id).await.unwrap();
        let ids: Vec<MessageId> = listed.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![first.id, second.id, third.id]);
        assert_eq!(listed[1], edited);
    }

    #[tokio::test]
    async fn edit_does_not_bump_activity() {
        let store = MemoryStore::new();
        let (a, b) = pair();
        let conv = store.get_or_create(a, b).await.unwrap();
        let sent = store
            .send(MessageScope::Conversation(conv.id), NewMessage::text(a, "x"))
            .await
            .unwrap();
        store.edit(sent.id, "y".to_string()).await.unwrap();
        MessageLog::delete(&store, sent.id).await.unwrap();

        let conv = ConversationDirectory::find_by_id(&store, conv.id).await.unwrap();
        assert_eq!(conv.last_activity_at, sent.sent_at);
    }

    #[tokio::test]
    async fn missing_message_is_not_found() {
        let store = MemoryStore::new();
        let id = MessageId::from_raw(99);
        assert_eq!(
            store.edit(id, "x".to_string()).await.unwrap_err(),
            MessagingError::MessageNotFound { id }
        );
        assert_eq!(
            MessageLog::delete(&store, id).await.unwrap_err(),
            MessagingError::MessageNotFound { id }
        );
    }

    #[tokio::test]
    async fn send_to_missing_scope_writes_nothing() {
        let store = MemoryStore::new();
        let (a, _) = pair();
        let missing = ConversationId::new();

        let err = store
            .send(MessageScope::Conversation(missing), NewMessage::text(a, "x"))
            .await
            .unwrap_err();
        assert!(err.is_not_found());

        let side = SideChatId::new();
        let err = store
            .send(MessageScope::SideChat(side), NewMessage::text(a, "x"))
            .await
            .unwrap_err();
        assert_eq!(err, MessagingError::SideChatNotFound { id: side });
        assert!(store.arena.lock().await.messages.is_empty());
    }

    #[tokio::test]
    async fn side_chat_count_scenario() {
        let store = MemoryStore::new();
        let (u1, u2) = pair();
        let conv = store.get_or_create(u1, u2).await.unwrap();
        let q1 = store.create(conv.id, "Q1".to_string(), u1).await.unwrap();

        let msg = store
            .send(MessageScope::SideChat(q1.id), NewMessage::text(u2, "question"))
            .await
            .unwrap();
        assert_eq!(msg.side_chat_id, Some(q1.id));
        assert_eq!(msg.conversation_id, conv.id);
        assert_eq!(store.message_count(q1.id).await.unwrap(), 1);

        MessageLog::delete(&store, msg.id).await.unwrap();
        assert_eq!(store.message_count(q1.id).await.unwrap(), 0);

        assert!(store.list_for_conversation(conv.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn side_chat_soft_delete_keeps_messages() {
        let store = MemoryStore::new();
        let (u1, u2) = pair();
        let conv = store.get_or_create(u1, u2).await.unwrap();
        let side = store.create(conv.id, "Q1".to_string(), u1).await.unwrap();
        store
            .send(MessageScope::SideChat(side.id), NewMessage::text(u2, "kept"))
            .await
            .unwrap();

        SideChatRegistry::delete(&store, side.id).await.unwrap();

        let listed = store.list_side_chats(conv.id).await.unwrap();
        assert!(listed.is_empty());
        let messages = store.list_for_side_chat(side.id).await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].content, "kept");

        let err = store
            .send(MessageScope::SideChat(side.id), NewMessage::text(u1, "late"))
            .await
            .unwrap_err();
        assert_eq!(err, MessagingError::SideChatNotFound { id: side.id });
    }

    #[tokio::test]
    async fn side_chats_list_newest_first() {
        let store = MemoryStore::new();
        let (u1, u2) = pair();
        let conv = store.get_or_create(u1, u2).await.unwrap();
        let older = store.create(conv.id, "older".to_string(), u1).await.unwrap();
        let newer = store.create(conv.id, "newer".to_string(), u2).await.unwrap();

        let listed = store.list_side_chats(conv.id).await.unwrap();
        let ids: Vec<SideChatId> = listed.iter().map(|s| s.side_chat.id).collect();
        assert_eq!(ids, vec![newer.id, older.id]);
    }

    #[tokio::test]
    async fn create_side_chat_on_missing_conversation() {
        let store = MemoryStore::new();
        let id = ConversationId::new();
        let err = store
            .create(id, "t".to_string(), UserId::new())
            .await
            .unwrap_err();
        assert_eq!(err, MessagingError::ConversationNotFound { id });
    }

    #[tokio::test]
    async fn delete_conversation_cascades_and_is_idempotent() {
        let store = MemoryStore::new();
        let (u1, u2) = pair();
        let conv = store.get_or_create(u1, u2).await.unwrap();
        let side = store.create(conv.id, "Q".to_string(), u1).await.unwrap();
        let main = store
            .send(MessageScope::Conversation(conv.id), NewMessage::text(u1, "a"))
            .await
            .unwrap();
        store
            .send(MessageScope::SideChat(side.id), NewMessage::text(u2, "b"))
            .await
            .unwrap();

        ConversationDirectory::delete(&store, conv.id).await.unwrap();
        ConversationDirectory::delete(&store, conv.id).await.unwrap();

        assert!(
            ConversationDirectory::find_by_id(&store, conv.id)
                .await
                .unwrap_err()
                .is_not_found()
        );
        assert!(MessageLog::find_by_id(&store, main.id).await.is_err());
        assert!(store.list_for_side_chat(side.id).await.is_err());

        let never = ConversationId::new();
        assert_eq!(
            ConversationDirectory::delete(&store, never).await.unwrap_err(),
            MessagingError::ConversationNotFound { id: never }
        );

        let fresh = store.get_or_create(u2, u1).await.unwrap();
        assert_ne!(fresh.id, conv.id);
    }

    #[tokio::test]
    async fn list_for_user_orders_by_activity() {
        let store = MemoryStore::new();
        let me = UserId::new();
        let quiet = store.get_or_create(me, UserId::new()).await.unwrap();
        let busy = store.get_or_create(me, UserId::new()).await.unwrap();
        store.get_or_create(UserId::new(), UserId::new()).await.unwrap();

        store
            .send(MessageScope::Conversation(busy.id), NewMessage::text(me, "ping"))
            .await
            .unwrap();

        let ids: Vec<ConversationId> = store
            .list_for_user(me)
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(ids, vec![busy.id, quiet.id]);
    }

    #[tokio::test]
    async fn attachment_store_enforces_limit() {
        let store = MemoryAttachmentStore::new(4);
        let small = AttachmentUpload {
            file_name: "a.txt".to_string(),
            media_type: "text/plain".to_string(),
            data: b"abc".to_vec(),
        };
        let stored = store.store(small.clone()).await.unwrap();
        assert_eq!(stored.display_name, "a.txt");
        assert_eq!(store.get(stored.token), Some(small));

        let big = AttachmentUpload {
            file_name: "b.bin".to_string(),
            media_type: "application/octet-stream".to_string(),
            data: vec![0; 5],
        };
        assert!(store.store(big).await.is_err());
    }

    #[tokio::test]
    async fn attachment_store_discards_blobs() {
        let store = MemoryAttachmentStore::new(16);
        let stored = store
            .store(AttachmentUpload {
                file_name: "a.txt".to_string(),
                media_type: "text/plain".to_string(),
                data: b"abc".to_vec(),
            })
            .await
            .unwrap();

        store.discard(stored.token).await.unwrap();
        assert_eq!(store.get(stored.token), None);
        store.discard(stored.token).await.unwrap();
    }

    #[tokio::test]
    async fn identity_lookup_resolves_registered_users() {
        let alice = Participant::new(UserId::new(), "alice");
        let lookup = MemoryIdentityLookup::with_participants([alice.clone()]);
        assert_eq!(lookup.resolve(alice.id).await.unwrap(), Some(alice));
        assert_eq!(lookup.resolve(UserId::new()).await.unwrap(), None);
    }
}
