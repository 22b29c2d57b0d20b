//! Event hub for Beacon.
//!
//! The hub dispatches inbound client events to handlers. Each handler
//! reads/writes the registry or rooms, optionally calls the persistence
//! collaborator, and emits zero or more server events to one connection,
//! to a user's connections, to an institution room, or to everyone.
//!
//! Handlers never fail the event stream: validation misses are dropped,
//! lookup misses abort the remaining steps, and persistence failures are
//! absorbed and logged. The only caller-visible fallback is the
//! ack-style processing-tokens query, which replies with an empty list.

use crate::expiry::{self, governing_institution, message_expiry};
use crate::registry::{ConnectionId, Registry};
use crate::room::Rooms;
use crate::store::{
    ConversationSummary, NewMessage, NewNotification, Store, StoreError, TicketPatch,
};
use beacon_protocol::{ClientEvent, PartyKind, PresenceStatus, ServerEvent, Ticket};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

/// Outbound handle for one connection.
///
/// Events are `Arc`-shared so a room broadcast serializes once per
/// connection, not once per clone.
pub type EventSender = mpsc::UnboundedSender<Arc<ServerEvent>>;

/// Number of completed tickets included in room snapshots.
const COMPLETED_SNAPSHOT_LIMIT: usize = 10;

/// Default notification type tag.
const DEFAULT_NOTIFICATION_KIND: &str = "message";

/// Hub statistics.
#[derive(Debug, Clone)]
pub struct HubStats {
    /// Number of attached connections.
    pub connection_count: usize,
    /// Number of active institution rooms.
    pub room_count: usize,
    /// Number of users with at least one bound connection.
    pub online_user_count: usize,
}

/// The central event hub.
pub struct Hub {
    registry: Registry,
    rooms: Rooms,
    /// Outbound handles, one per attached connection.
    connections: DashMap<ConnectionId, EventSender>,
    store: Arc<dyn Store>,
}

impl Hub {
    /// Create a new hub over the given persistence collaborator.
    #[must_use]
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            registry: Registry::new(),
            rooms: Rooms::new(),
            connections: DashMap::new(),
            store,
        }
    }

    /// The connection registry.
    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// The institution rooms.
    #[must_use]
    pub fn rooms(&self) -> &Rooms {
        &self.rooms
    }

    /// Get hub statistics.
    #[must_use]
    pub fn stats(&self) -> HubStats {
        HubStats {
            connection_count: self.connections.len(),
            room_count: self.rooms.room_count(),
            online_user_count: self.registry.stats().user_count,
        }
    }

    /// Attach a connection's outbound handle.
    pub fn connect(&self, connection: ConnectionId, sender: EventSender) {
        debug!(connection = %connection, "Connection attached");
        self.connections.insert(connection, sender);
    }

    /// Detach a closed connection: leave all rooms, unbind from its user,
    /// and broadcast the offline transition when it was the user's last
    /// connection.
    pub fn disconnect(&self, connection: &ConnectionId) {
        self.connections.remove(connection);
        self.rooms.leave_all(connection);

        if let Some(unbound) = self.registry.unbind(connection) {
            if unbound.went_offline {
                let delivered = self.broadcast_all(ServerEvent::PresenceUpdate {
                    user_id: unbound.user_id.clone(),
                    status: PresenceStatus::Offline,
                });
                debug!(user = %unbound.user_id, recipients = delivered, "Offline presence broadcast");
            }
        }

        debug!(connection = %connection, "Connection detached");
    }

    /// Dispatch an inbound event to its handler.
    pub async fn dispatch(&self, connection: &ConnectionId, event: ClientEvent) {
        match event {
            ClientEvent::Join { user_id } => {
                self.registry
                    .bind(&user_id, connection.clone(), PresenceStatus::Connected);
            }
            ClientEvent::Register { user_id } => self.handle_register(connection, &user_id),
            ClientEvent::JoinInstitutionRoom { institution_id } => {
                self.handle_join_institution_room(connection, &institution_id)
                    .await;
            }
            ClientEvent::NewToken {
                institution_id,
                token,
            } => self.handle_new_token(&institution_id, token).await,
            ClientEvent::StartProcessing {
                institution_id,
                token_id,
            } => self.handle_start_processing(&institution_id, &token_id).await,
            ClientEvent::CompleteToken {
                institution_id,
                token_id,
            } => self.handle_complete_token(&institution_id, &token_id).await,
            ClientEvent::GetCurrentProcessingTokens { institution_id } => {
                let tickets = self.current_processing_tokens(&institution_id).await;
                self.send_to(connection, ServerEvent::ProcessingTokens(tickets));
            }
            ClientEvent::SendMessage {
                sender_id,
                sender_type,
                receiver_id,
                conversation_id,
                content,
                timestamp,
                accepted,
            } => {
                self.handle_send_message(
                    &sender_id,
                    sender_type,
                    &receiver_id,
                    conversation_id,
                    content,
                    timestamp,
                    accepted,
                )
                .await;
            }
            ClientEvent::SendNotification {
                to_user_id,
                from_user_id,
                message,
                status,
            } => {
                self.handle_send_notification(&to_user_id, &from_user_id, message, status)
                    .await;
            }
        }
    }

    fn handle_register(&self, connection: &ConnectionId, user_id: &str) {
        if user_id.is_empty() {
            warn!(connection = %connection, "Register without user id dropped");
            return;
        }

        self.registry
            .bind(user_id, connection.clone(), PresenceStatus::Online);
        self.broadcast_all(ServerEvent::PresenceUpdate {
            user_id: user_id.to_string(),
            status: PresenceStatus::Online,
        });
    }

    /// Join the institution room and reply with the current-state
    /// snapshot: the latest active ticket plus the recent completed list.
    async fn handle_join_institution_room(&self, connection: &ConnectionId, institution_id: &str) {
        if institution_id.is_empty() {
            warn!(connection = %connection, "Room join without institution id dropped");
            return;
        }

        self.rooms.join(connection.clone(), institution_id);

        let active = match self.store.find_active_ticket(institution_id).await {
            Ok(ticket) => ticket,
            Err(e) => {
                error!(room = %institution_id, error = %e, "Active ticket fetch failed");
                return;
            }
        };
        let completed = match self
            .store
            .list_completed_tickets(institution_id, COMPLETED_SNAPSHOT_LIMIT)
            .await
        {
            Ok(tickets) => tickets,
            Err(e) => {
                error!(room = %institution_id, error = %e, "Completed tickets fetch failed");
                return;
            }
        };

        // Snapshot goes to the requesting connection only; room-wide
        // updates follow via the lifecycle events.
        self.send_to(connection, ServerEvent::TokenUpdated(active));
        self.send_to(connection, ServerEvent::CompletedTokensUpdated(completed));
    }

    async fn handle_new_token(&self, institution_id: &str, token: Ticket) {
        let token = match self.enrich_ticket(token).await {
            Ok(token) => token,
            Err(e) => {
                error!(room = %institution_id, error = %e, "Token enrichment failed");
                return;
            }
        };

        let delivered = self.broadcast_room(institution_id, ServerEvent::TokenUpdated(Some(token)));
        debug!(room = %institution_id, recipients = delivered, "New token broadcast");
    }

    async fn handle_start_processing(&self, institution_id: &str, token_id: &str) {
        let ticket = match self
            .store
            .update_ticket(token_id, TicketPatch::start_processing())
            .await
        {
            Ok(ticket) => ticket,
            Err(e) => {
                error!(ticket = %token_id, error = %e, "Start-processing update failed");
                return;
            }
        };
        let ticket = match self.enrich_ticket(ticket).await {
            Ok(ticket) => ticket,
            Err(e) => {
                error!(ticket = %token_id, error = %e, "Ticket enrichment failed");
                return;
            }
        };

        self.broadcast_room(institution_id, ServerEvent::ProcessingTokenUpdated(ticket));
    }

    async fn handle_complete_token(&self, institution_id: &str, token_id: &str) {
        if let Err(e) = self.store.update_ticket(token_id, TicketPatch::complete()).await {
            error!(ticket = %token_id, error = %e, "Complete-token update failed");
            return;
        }

        let completed = match self
            .store
            .list_completed_tickets(institution_id, COMPLETED_SNAPSHOT_LIMIT)
            .await
        {
            Ok(tickets) => tickets,
            Err(e) => {
                error!(room = %institution_id, error = %e, "Completed tickets fetch failed");
                return;
            }
        };

        self.broadcast_room(institution_id, ServerEvent::CompletedTokensUpdated(completed));
    }

    /// The institution's in-flight tickets, oldest first, enriched with
    /// submitter identity.
    ///
    /// Never fails: any persistence problem yields an empty list so the
    /// requesting caller is never left waiting on an error.
    pub async fn current_processing_tokens(&self, institution_id: &str) -> Vec<Ticket> {
        if institution_id.is_empty() {
            return Vec::new();
        }

        let listed = match self.store.list_processing_tickets(institution_id).await {
            Ok(tickets) => tickets,
            Err(e) => {
                error!(room = %institution_id, error = %e, "Processing tickets fetch failed");
                return Vec::new();
            }
        };

        let mut enriched = Vec::with_capacity(listed.len());
        for ticket in listed {
            match self.enrich_ticket(ticket).await {
                Ok(ticket) => enriched.push(ticket),
                Err(e) => {
                    error!(room = %institution_id, error = %e, "Ticket enrichment failed");
                    return Vec::new();
                }
            }
        }
        enriched
    }

    #[allow(clippy::too_many_arguments)]
    async fn handle_send_message(
        &self,
        sender_id: &str,
        sender_type: Option<PartyKind>,
        receiver_id: &str,
        conversation_id: Option<String>,
        content: String,
        timestamp: Option<u64>,
        accepted: Option<bool>,
    ) {
        let Some(sender_type) = sender_type else {
            debug!("Message dropped: missing sender type");
            return;
        };
        if sender_id.is_empty() || receiver_id.is_empty() || content.is_empty() {
            debug!("Message dropped: missing required fields");
            return;
        }

        let receiver_role = match self.store.find_user_role(receiver_id).await {
            Ok(Some(role)) => role,
            Ok(None) => {
                warn!(receiver = %receiver_id, "Message dropped: unknown receiver");
                return;
            }
            Err(e) => {
                error!(receiver = %receiver_id, error = %e, "Receiver role lookup failed");
                return;
            }
        };

        let now = expiry::unix_millis();
        let plan = if sender_type == PartyKind::User && receiver_role == PartyKind::User {
            None
        } else {
            let institution_id = governing_institution(sender_type, sender_id, receiver_id);
            match self.store.find_subscription_plan(institution_id).await {
                Ok(plan) => plan,
                Err(e) => {
                    error!(institution = %institution_id, error = %e, "Plan lookup failed");
                    return;
                }
            }
        };
        let expires_at = message_expiry(sender_type, receiver_role, plan.as_deref(), now);

        let conversation_id = match conversation_id.filter(|id| !id.is_empty()) {
            Some(id) => id,
            None => {
                match self
                    .store
                    .find_or_create_conversation(sender_id, receiver_id, accepted.unwrap_or(false))
                    .await
                {
                    Ok(id) => id,
                    Err(e) => {
                        error!(error = %e, "Conversation resolution failed");
                        return;
                    }
                }
            }
        };

        let message = match self
            .store
            .create_message(NewMessage {
                sender_id: sender_id.to_string(),
                sender_type,
                receiver_id: receiver_id.to_string(),
                conversation_id: conversation_id.clone(),
                content,
                timestamp: timestamp.unwrap_or(now),
                expires_at,
            })
            .await
        {
            Ok(message) => message,
            Err(e) => {
                error!(error = %e, "Message persistence failed");
                return;
            }
        };

        if let Err(e) = self
            .store
            .update_conversation_summary(
                &conversation_id,
                ConversationSummary {
                    last_message_id: message.id.clone(),
                    last_message_content: message.content.clone(),
                    last_message_timestamp: message.timestamp,
                    last_message_sender_id: message.sender_id.clone(),
                },
            )
            .await
        {
            error!(conversation = %conversation_id, error = %e, "Conversation summary update failed");
            return;
        }

        // Receiver connections are re-fetched here, at delivery time. An
        // offline receiver is a normal state: the message stays persisted
        // and nothing is emitted.
        let delivered = self.send_to_user(
            &message.receiver_id,
            ServerEvent::ReceiveMessage {
                sender_id: message.sender_id,
                sender_type: message.sender_type,
                receiver_id: message.receiver_id.clone(),
                conversation_id: message.conversation_id,
                content: message.content,
                timestamp: message.timestamp,
                expires_at: message.expires_at,
            },
        );
        debug!(receiver = %receiver_id, recipients = delivered, "Message routed");
    }

    async fn handle_send_notification(
        &self,
        to_user_id: &str,
        from_user_id: &str,
        message: String,
        status: Option<String>,
    ) {
        if to_user_id.is_empty() || from_user_id.is_empty() || message.is_empty() {
            warn!("Invalid notification payload dropped");
            return;
        }

        let kind = status
            .clone()
            .unwrap_or_else(|| DEFAULT_NOTIFICATION_KIND.to_string());
        if let Err(e) = self
            .store
            .create_notification(NewNotification {
                sender_id: from_user_id.to_string(),
                receiver_id: to_user_id.to_string(),
                message: message.clone(),
                kind,
            })
            .await
        {
            error!(receiver = %to_user_id, error = %e, "Notification persistence failed");
            return;
        }

        let delivered = self.send_to_user(
            to_user_id,
            ServerEvent::ReceiveNotification {
                message,
                from_user_id: from_user_id.to_string(),
                status,
            },
        );
        if delivered == 0 {
            // Not an error: no retry, no queue.
            warn!(receiver = %to_user_id, "Notification not delivered: recipient offline");
        }
    }

    /// Attach submitter identity fields to a ticket with an owning user.
    ///
    /// A ticket without an owner, or an owner without identity fields,
    /// passes through unchanged.
    async fn enrich_ticket(&self, ticket: Ticket) -> Result<Ticket, StoreError> {
        let Some(user_id) = ticket.user_id.clone() else {
            return Ok(ticket);
        };
        match self.store.find_user_identity(&user_id).await? {
            Some(identity) => Ok(ticket.with_identity(identity)),
            None => Ok(ticket),
        }
    }

    fn send_to(&self, connection: &ConnectionId, event: ServerEvent) {
        self.send_shared(connection, &Arc::new(event));
    }

    /// Send to one connection. A missing or closed handle means the
    /// connection is tearing down; the emission is dropped silently.
    fn send_shared(&self, connection: &ConnectionId, event: &Arc<ServerEvent>) -> bool {
        match self.connections.get(connection) {
            Some(sender) => sender.send(Arc::clone(event)).is_ok(),
            None => false,
        }
    }

    /// Send to every connection currently bound to a user. Returns the
    /// number of connections reached.
    fn send_to_user(&self, user_id: &str, event: ServerEvent) -> usize {
        let event = Arc::new(event);
        self.registry
            .connections_for(user_id)
            .iter()
            .filter(|connection| self.send_shared(connection, &event))
            .count()
    }

    /// Broadcast to every member of an institution room.
    fn broadcast_room(&self, institution_id: &str, event: ServerEvent) -> usize {
        let event = Arc::new(event);
        self.rooms
            .members(institution_id)
            .iter()
            .filter(|connection| self.send_shared(connection, &event))
            .count()
    }

    /// Broadcast to every attached connection.
    fn broadcast_all(&self, event: ServerEvent) -> usize {
        let event = Arc::new(event);
        self.connections
            .iter()
            .filter(|entry| entry.value().send(Arc::clone(&event)).is_ok())
            .count()
    }
}
