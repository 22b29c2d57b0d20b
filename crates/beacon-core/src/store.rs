//! Persistence collaborator interface for Beacon.
//!
//! Tickets, conversations, messages, and notifications are owned by an
//! external system; the hub consumes them through [`Store`] and holds no
//! authoritative copy of anything. The hub is stateless across restarts:
//! the registry resets to empty and reconnect events re-populate it.

use async_trait::async_trait;
use beacon_protocol::{PartyKind, Ticket, UserIdentity};
use thiserror::Error;

/// A conversation identifier.
pub type ConversationId = String;

/// Store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend failed or is unreachable.
    #[error("Store backend failure: {0}")]
    Backend(String),

    /// A referenced entity does not exist.
    #[error("{0} not found")]
    NotFound(&'static str),
}

/// Partial update applied to a ticket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TicketPatch {
    pub processing: Option<bool>,
    pub completed: Option<bool>,
}

impl TicketPatch {
    /// Patch marking a ticket as being processed.
    #[must_use]
    pub fn start_processing() -> Self {
        Self {
            processing: Some(true),
            completed: None,
        }
    }

    /// Patch marking a ticket as completed and no longer processing.
    #[must_use]
    pub fn complete() -> Self {
        Self {
            processing: Some(false),
            completed: Some(true),
        }
    }
}

/// A conversation between two parties.
///
/// The party pair is unordered: a conversation created for (A, B) is the
/// same conversation as (B, A).
#[derive(Debug, Clone, PartialEq)]
pub struct Conversation {
    pub id: ConversationId,
    pub party_a: String,
    pub party_b: String,
    /// Whether the receiver has accepted the conversation.
    pub accepted: bool,
    /// Denormalized last-message fields, updated on every new message.
    pub last_message: Option<ConversationSummary>,
}

impl Conversation {
    /// Whether this conversation is between the given unordered pair.
    #[must_use]
    pub fn is_between(&self, party_a: &str, party_b: &str) -> bool {
        (self.party_a == party_a && self.party_b == party_b)
            || (self.party_a == party_b && self.party_b == party_a)
    }
}

/// Denormalized last-message fields written back to a conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationSummary {
    pub last_message_id: String,
    pub last_message_content: String,
    pub last_message_timestamp: u64,
    pub last_message_sender_id: String,
}

/// Fields for a new message.
#[derive(Debug, Clone, PartialEq)]
pub struct NewMessage {
    pub sender_id: String,
    pub sender_type: PartyKind,
    pub receiver_id: String,
    pub conversation_id: ConversationId,
    pub content: String,
    /// Send time in Unix milliseconds.
    pub timestamp: u64,
    /// Expiry instant in Unix milliseconds; `None` means permanent.
    pub expires_at: Option<u64>,
}

/// A persisted message.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub id: String,
    pub sender_id: String,
    pub sender_type: PartyKind,
    pub receiver_id: String,
    pub conversation_id: ConversationId,
    pub content: String,
    pub timestamp: u64,
    pub expires_at: Option<u64>,
}

/// Fields for a new notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewNotification {
    pub sender_id: String,
    pub receiver_id: String,
    pub message: String,
    /// Type tag, e.g. `message`.
    pub kind: String,
}

/// A persisted notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub message: String,
    pub kind: String,
    pub created_at: u64,
}

/// The persistence collaborator consumed by the hub.
///
/// Implementations live outside this crate (a database-backed adapter in
/// production, [`crate::MemoryStore`] for standalone runs and tests).
#[async_trait]
pub trait Store: Send + Sync {
    /// Find the institution's latest non-completed ticket.
    async fn find_active_ticket(&self, institution_id: &str)
        -> Result<Option<Ticket>, StoreError>;

    /// List the institution's most recently completed tickets, newest
    /// first, enriched with submitter identity.
    async fn list_completed_tickets(
        &self,
        institution_id: &str,
        limit: usize,
    ) -> Result<Vec<Ticket>, StoreError>;

    /// Apply a partial update to a ticket and return the updated row.
    async fn update_ticket(&self, ticket_id: &str, patch: TicketPatch)
        -> Result<Ticket, StoreError>;

    /// List the institution's in-flight tickets (processing, not yet
    /// completed), oldest first.
    async fn list_processing_tickets(
        &self,
        institution_id: &str,
    ) -> Result<Vec<Ticket>, StoreError>;

    /// Look up a user's denormalized identity fields.
    async fn find_user_identity(&self, user_id: &str)
        -> Result<Option<UserIdentity>, StoreError>;

    /// Look up the kind of party behind a user id.
    async fn find_user_role(&self, user_id: &str) -> Result<Option<PartyKind>, StoreError>;

    /// Look up an institution's subscription plan name.
    async fn find_subscription_plan(
        &self,
        institution_id: &str,
    ) -> Result<Option<String>, StoreError>;

    /// Find the conversation between the unordered pair, or create one
    /// with the given acceptance state.
    async fn find_or_create_conversation(
        &self,
        party_a: &str,
        party_b: &str,
        accepted: bool,
    ) -> Result<ConversationId, StoreError>;

    /// Persist a message.
    async fn create_message(&self, message: NewMessage) -> Result<Message, StoreError>;

    /// Write the denormalized last-message fields back to a conversation.
    async fn update_conversation_summary(
        &self,
        conversation_id: &str,
        summary: ConversationSummary,
    ) -> Result<(), StoreError>;

    /// Persist a notification.
    async fn create_notification(
        &self,
        notification: NewNotification,
    ) -> Result<Notification, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ticket_patches() {
        let patch = TicketPatch::start_processing();
        assert_eq!(patch.processing, Some(true));
        assert_eq!(patch.completed, None);

        let patch = TicketPatch::complete();
        assert_eq!(patch.processing, Some(false));
        assert_eq!(patch.completed, Some(true));
    }

    #[test]
    fn test_conversation_pair_is_unordered() {
        let conversation = Conversation {
            id: "c1".into(),
            party_a: "u1".into(),
            party_b: "u2".into(),
            accepted: false,
            last_message: None,
        };

        assert!(conversation.is_between("u1", "u2"));
        assert!(conversation.is_between("u2", "u1"));
        assert!(!conversation.is_between("u1", "u3"));
    }
}
