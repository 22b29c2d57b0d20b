//! In-memory persistence adapter.
//!
//! Backs standalone server runs and the hub tests. A production
//! deployment points the hub at the externally-owned store instead; this
//! adapter mirrors its observable behavior (ordering, enrichment,
//! unordered conversation pairs) over plain in-process maps.

use crate::expiry::unix_millis;
use crate::store::{
    Conversation, ConversationId, ConversationSummary, Message, NewMessage, NewNotification,
    Notification, Store, StoreError, TicketPatch,
};
use async_trait::async_trait;
use beacon_protocol::{PartyKind, Ticket, UserIdentity};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

/// An in-memory [`Store`] implementation.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tickets: RwLock<Vec<Ticket>>,
    identities: RwLock<HashMap<String, UserIdentity>>,
    roles: RwLock<HashMap<String, PartyKind>>,
    plans: RwLock<HashMap<String, String>>,
    conversations: RwLock<Vec<Conversation>>,
    messages: RwLock<Vec<Message>>,
    notifications: RwLock<Vec<Notification>>,
    next_id: AtomicU64,
}

impl MemoryStore {
    /// Create a new, empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&self, prefix: &str) -> String {
        let n = self.next_id.fetch_add(1, Ordering::Relaxed);
        format!("{prefix}_{n}")
    }

    /// Seed a ticket.
    pub fn insert_ticket(&self, ticket: Ticket) {
        self.tickets.write().unwrap().push(ticket);
    }

    /// Seed a user with a role and optional identity fields.
    pub fn insert_user(&self, user_id: &str, role: PartyKind, identity: Option<UserIdentity>) {
        self.roles.write().unwrap().insert(user_id.to_string(), role);
        if let Some(identity) = identity {
            self.identities
                .write()
                .unwrap()
                .insert(user_id.to_string(), identity);
        }
    }

    /// Seed an institution's subscription plan.
    pub fn set_plan(&self, institution_id: &str, plan: &str) {
        self.plans
            .write()
            .unwrap()
            .insert(institution_id.to_string(), plan.to_string());
    }

    /// Snapshot of all persisted conversations.
    #[must_use]
    pub fn conversations(&self) -> Vec<Conversation> {
        self.conversations.read().unwrap().clone()
    }

    /// Snapshot of all persisted messages.
    #[must_use]
    pub fn messages(&self) -> Vec<Message> {
        self.messages.read().unwrap().clone()
    }

    /// Snapshot of all persisted notifications.
    #[must_use]
    pub fn notifications(&self) -> Vec<Notification> {
        self.notifications.read().unwrap().clone()
    }

    fn enrich(&self, ticket: Ticket) -> Ticket {
        let identity = ticket
            .user_id
            .as_ref()
            .and_then(|user_id| self.identities.read().unwrap().get(user_id).cloned());
        match identity {
            Some(identity) => ticket.with_identity(identity),
            None => ticket,
        }
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn find_active_ticket(
        &self,
        institution_id: &str,
    ) -> Result<Option<Ticket>, StoreError> {
        let tickets = self.tickets.read().unwrap();
        Ok(tickets
            .iter()
            .filter(|t| t.institution_id == institution_id && !t.completed)
            .max_by_key(|t| t.created_at)
            .cloned())
    }

    async fn list_completed_tickets(
        &self,
        institution_id: &str,
        limit: usize,
    ) -> Result<Vec<Ticket>, StoreError> {
        let tickets = self.tickets.read().unwrap();
        let mut completed: Vec<Ticket> = tickets
            .iter()
            .filter(|t| t.institution_id == institution_id && t.completed)
            .cloned()
            .collect();
        completed.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        completed.truncate(limit);
        Ok(completed.into_iter().map(|t| self.enrich(t)).collect())
    }

    async fn update_ticket(
        &self,
        ticket_id: &str,
        patch: TicketPatch,
    ) -> Result<Ticket, StoreError> {
        let mut tickets = self.tickets.write().unwrap();
        let ticket = tickets
            .iter_mut()
            .find(|t| t.id == ticket_id)
            .ok_or(StoreError::NotFound("ticket"))?;

        if let Some(processing) = patch.processing {
            ticket.processing = processing;
        }
        if let Some(completed) = patch.completed {
            ticket.completed = completed;
        }
        Ok(ticket.clone())
    }

    async fn list_processing_tickets(
        &self,
        institution_id: &str,
    ) -> Result<Vec<Ticket>, StoreError> {
        let tickets = self.tickets.read().unwrap();
        let mut processing: Vec<Ticket> = tickets
            .iter()
            .filter(|t| t.institution_id == institution_id && t.processing && !t.completed)
            .cloned()
            .collect();
        processing.sort_by_key(|t| t.created_at);
        Ok(processing)
    }

    async fn find_user_identity(
        &self,
        user_id: &str,
    ) -> Result<Option<UserIdentity>, StoreError> {
        Ok(self.identities.read().unwrap().get(user_id).cloned())
    }

    async fn find_user_role(&self, user_id: &str) -> Result<Option<PartyKind>, StoreError> {
        Ok(self.roles.read().unwrap().get(user_id).copied())
    }

    async fn find_subscription_plan(
        &self,
        institution_id: &str,
    ) -> Result<Option<String>, StoreError> {
        Ok(self.plans.read().unwrap().get(institution_id).cloned())
    }

    async fn find_or_create_conversation(
        &self,
        party_a: &str,
        party_b: &str,
        accepted: bool,
    ) -> Result<ConversationId, StoreError> {
        let mut conversations = self.conversations.write().unwrap();
        if let Some(existing) = conversations.iter().find(|c| c.is_between(party_a, party_b)) {
            return Ok(existing.id.clone());
        }

        let id = self.next_id("conv");
        conversations.push(Conversation {
            id: id.clone(),
            party_a: party_a.to_string(),
            party_b: party_b.to_string(),
            accepted,
            last_message: None,
        });
        Ok(id)
    }

    async fn create_message(&self, message: NewMessage) -> Result<Message, StoreError> {
        let stored = Message {
            id: self.next_id("msg"),
            sender_id: message.sender_id,
            sender_type: message.sender_type,
            receiver_id: message.receiver_id,
            conversation_id: message.conversation_id,
            content: message.content,
            timestamp: message.timestamp,
            expires_at: message.expires_at,
        };
        self.messages.write().unwrap().push(stored.clone());
        Ok(stored)
    }

    async fn update_conversation_summary(
        &self,
        conversation_id: &str,
        summary: ConversationSummary,
    ) -> Result<(), StoreError> {
        let mut conversations = self.conversations.write().unwrap();
        let conversation = conversations
            .iter_mut()
            .find(|c| c.id == conversation_id)
            .ok_or(StoreError::NotFound("conversation"))?;
        conversation.last_message = Some(summary);
        Ok(())
    }

    async fn create_notification(
        &self,
        notification: NewNotification,
    ) -> Result<Notification, StoreError> {
        let stored = Notification {
            id: self.next_id("notif"),
            sender_id: notification.sender_id,
            receiver_id: notification.receiver_id,
            message: notification.message,
            kind: notification.kind,
            created_at: unix_millis(),
        };
        self.notifications.write().unwrap().push(stored.clone());
        Ok(stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ticket(id: &str, institution: &str, created_at: u64) -> Ticket {
        Ticket {
            id: id.into(),
            institution_id: institution.into(),
            user_id: None,
            processing: false,
            completed: false,
            created_at,
            username: None,
            mobile_number: None,
        }
    }

    #[tokio::test]
    async fn test_active_ticket_is_latest_non_completed() {
        let store = MemoryStore::new();
        store.insert_ticket(ticket("t1", "inst-1", 10));
        store.insert_ticket(ticket("t2", "inst-1", 20));
        store.insert_ticket(Ticket {
            completed: true,
            ..ticket("t3", "inst-1", 30)
        });

        let active = store.find_active_ticket("inst-1").await.unwrap().unwrap();
        assert_eq!(active.id, "t2");
    }

    #[tokio::test]
    async fn test_completed_list_is_newest_first_and_enriched() {
        let store = MemoryStore::new();
        store.insert_user(
            "u1",
            PartyKind::User,
            Some(UserIdentity {
                username: "alice".into(),
                mobile_number: "555-0100".into(),
            }),
        );
        for i in 0..3 {
            store.insert_ticket(Ticket {
                completed: true,
                user_id: Some("u1".into()),
                ..ticket(&format!("t{i}"), "inst-1", i)
            });
        }

        let completed = store.list_completed_tickets("inst-1", 2).await.unwrap();
        assert_eq!(completed.len(), 2);
        assert_eq!(completed[0].id, "t2");
        assert!(completed.iter().all(Ticket::is_enriched));
    }

    #[tokio::test]
    async fn test_update_ticket_patch() {
        let store = MemoryStore::new();
        store.insert_ticket(ticket("t1", "inst-1", 10));

        let updated = store
            .update_ticket("t1", TicketPatch::start_processing())
            .await
            .unwrap();
        assert!(updated.processing);
        assert!(!updated.completed);

        let updated = store.update_ticket("t1", TicketPatch::complete()).await.unwrap();
        assert!(!updated.processing);
        assert!(updated.completed);

        assert!(matches!(
            store.update_ticket("t404", TicketPatch::default()).await,
            Err(StoreError::NotFound("ticket"))
        ));
    }

    #[tokio::test]
    async fn test_processing_list_is_oldest_first() {
        let store = MemoryStore::new();
        for (id, at) in [("t1", 30), ("t2", 10), ("t3", 20)] {
            store.insert_ticket(Ticket {
                processing: true,
                ..ticket(id, "inst-1", at)
            });
        }

        let processing = store.list_processing_tickets("inst-1").await.unwrap();
        let ids: Vec<&str> = processing.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, ["t2", "t3", "t1"]);
    }

    #[tokio::test]
    async fn test_conversation_reuse_is_symmetric() {
        let store = MemoryStore::new();

        let first = store
            .find_or_create_conversation("u1", "u2", false)
            .await
            .unwrap();
        let second = store
            .find_or_create_conversation("u2", "u1", true)
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(store.conversations().len(), 1);
    }
}
