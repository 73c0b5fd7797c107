//! Two-party conversations and the directory that owns them.
//!
//! A conversation is keyed by the unordered pair of its participants. The
//! pair is canonicalized (lower id first) before any lookup or insert, so
//! `(a, b)` and `(b, a)` always address the same record.

use crate::error::MessagingError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use threadline_core::{ConversationId, UserId};

/// Canonical form of an unordered participant pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ParticipantPair {
    low: UserId,
    high: UserId,
}

impl ParticipantPair {
    /// Builds the canonical pair for two participants in either order.
    #[must_use]
    pub fn new(a: UserId, b: UserId) -> Self {
        if a <= b {
            Self { low: a, high: b }
        } else {
            Self { low: b, high: a }
        }
    }

    /// The lower-ordered participant.
    #[must_use]
    pub const fn low(&self) -> UserId {
        self.low
    }

    /// The higher-ordered participant.
    #[must_use]
    pub const fn high(&self) -> UserId {
        self.high
    }

    /// Returns true if `user` is one of the two participants.
    #[must_use]
    pub fn contains(&self, user: UserId) -> bool {
        self.low == user || self.high == user
    }

    /// Returns the participant that is not `user`.
    ///
    /// For a self-conversation (both sides equal) this returns `None`, as it
    /// does when `user` is not a participant at all.
    #[must_use]
    pub fn other(&self, user: UserId) -> Option<UserId> {
        if self.low == self.high {
            None
        } else if self.low == user {
            Some(self.high)
        } else if self.high == user {
            Some(self.low)
        } else {
            None
        }
    }
}

/// A two-party conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    /// Unique conversation identifier.
    pub id: ConversationId,
    /// The canonical participant pair.
    pub participants: ParticipantPair,
    /// When the conversation was created.
    pub created_at: DateTime<Utc>,
    /// Time of the most recent successful send; starts at `created_at`.
    pub last_activity_at: DateTime<Utc>,
}

impl Conversation {
    /// Creates a new conversation for a pair, stamped now.
    #[must_use]
    pub fn new(participants: ParticipantPair) -> Self {
        let now = Utc::now();
        Self {
            id: ConversationId::new(),
            participants,
            created_at: now,
            last_activity_at: now,
        }
    }

    /// Returns true if `user` takes part in this conversation.
    #[must_use]
    pub fn has_participant(&self, user: UserId) -> bool {
        self.participants.contains(user)
    }

    /// Returns the other participant from `user`'s point of view.
    #[must_use]
    pub fn other_participant(&self, user: UserId) -> Option<UserId> {
        self.participants.other(user)
    }
}

/// Owner of the pair-to-conversation mapping.
///
/// Implementations must make `get_or_create` atomic per canonical pair:
/// concurrent first callers from either side converge on one record, and a
/// lost insert race resolves to the winner instead of surfacing an error.
#[async_trait]
pub trait ConversationDirectory: Send + Sync {
    /// Returns the live conversation for the pair, creating it if needed.
    async fn get_or_create(
        &self,
        a: UserId,
        b: UserId,
    ) -> Result<Conversation, MessagingError>;

    /// Gets a live conversation by ID.
    async fn find_by_id(&self, id: ConversationId) -> Result<Conversation, MessagingError>;

    /// Lists live conversations containing `user`, most recent activity first.
    async fn list_for_user(&self, user: UserId) -> Result<Vec<Conversation>, MessagingError>;

    /// Deletes a conversation, cascading to its messages and side-chats.
    ///
    /// Deleting an already deleted conversation is a no-op; an ID that never
    /// existed reports `ConversationNotFound`.
    async fn delete(&self, id: ConversationId) -> Result<(), MessagingError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pair_is_symmetric() {
        let a = UserId::new();
        let b = UserId::new();
        assert_eq!(ParticipantPair::new(a, b), ParticipantPair::new(b, a));
    }

    #[test]
    fn pair_orders_low_then_high() {
        let a = UserId::new();
        let b = UserId::new();
        let pair = ParticipantPair::new(a, b);
        assert!(pair.low() <= pair.high());
        assert!(pair.contains(a));
        assert!(pair.contains(b));
        assert!(!pair.contains(UserId::new()));
    }

    #[test]
    fn other_participant() {
        let a = UserId::new();
        let b = UserId::new();
        let conv = Conversation::new(ParticipantPair::new(a, b));
        assert_eq!(conv.other_participant(a), Some(b));
        assert_eq!(conv.other_participant(b), Some(a));
        assert_eq!(conv.other_participant(UserId::new()), None);
    }

    #[test]
    fn self_conversation_has_no_other_side() {
        let a = UserId::new();
        let pair = ParticipantPair::new(a, a);
        assert!(pair.contains(a));
        assert_eq!(pair.other(a), None);
    }

    #[test]
    fn new_conversation_starts_active_at_creation() {
        let conv = Conversation::new(ParticipantPair::new(UserId::new(), UserId::new()));
        assert_eq!(conv.created_at, conv.last_activity_at);
    }
}
