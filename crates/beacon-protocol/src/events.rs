//! Event types for the Beacon protocol.
//!
//! Inbound events carry loosely-filled payloads: required-but-missing
//! fields decode to empty strings or `None` so the hub can apply its own
//! validation (drop and log) instead of rejecting at the parse layer.

use crate::types::{PartyKind, PresenceStatus, Ticket};
use serde::{Deserialize, Serialize};

/// An event sent by a client to the hub.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum ClientEvent {
    /// Bind this connection to a user without announcing presence.
    Join {
        #[serde(default)]
        user_id: String,
    },

    /// Bind this connection to a user and announce presence to everyone.
    Register {
        #[serde(default)]
        user_id: String,
    },

    /// Subscribe to an institution's queue updates and receive the
    /// current-state snapshot.
    JoinInstitutionRoom {
        #[serde(default)]
        institution_id: String,
    },

    /// Announce a freshly issued queue ticket to the institution room.
    NewToken {
        #[serde(default)]
        institution_id: String,
        token: Ticket,
    },

    /// Mark a ticket as being processed.
    StartProcessing {
        #[serde(default)]
        institution_id: String,
        #[serde(default)]
        token_id: String,
    },

    /// Mark a ticket as completed.
    CompleteToken {
        #[serde(default)]
        institution_id: String,
        #[serde(default)]
        token_id: String,
    },

    /// Request the current processing queue. Answered with a
    /// `processingTokens` reply to the requesting connection only.
    GetCurrentProcessingTokens {
        #[serde(default)]
        institution_id: String,
    },

    /// Send a chat message to the other party of a conversation.
    SendMessage {
        #[serde(default)]
        sender_id: String,
        #[serde(default)]
        sender_type: Option<PartyKind>,
        #[serde(default)]
        receiver_id: String,
        /// Existing conversation, or absent to resolve/create one.
        #[serde(default)]
        conversation_id: Option<String>,
        #[serde(default)]
        content: String,
        /// Client-side send time in Unix milliseconds.
        #[serde(default)]
        timestamp: Option<u64>,
        /// Whether the conversation starts out accepted by the receiver.
        #[serde(default)]
        accepted: Option<bool>,
    },

    /// Send a notification to a single recipient.
    SendNotification {
        #[serde(default)]
        to_user_id: String,
        #[serde(default)]
        from_user_id: String,
        #[serde(default)]
        message: String,
        /// Notification type tag; defaults to `message` when absent.
        #[serde(default)]
        status: Option<String>,
    },
}

impl ClientEvent {
    /// Wire name of the event, for logging and metrics labels.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::Join { .. } => "join",
            ClientEvent::Register { .. } => "register",
            ClientEvent::JoinInstitutionRoom { .. } => "joinInstitutionRoom",
            ClientEvent::NewToken { .. } => "newToken",
            ClientEvent::StartProcessing { .. } => "startProcessing",
            ClientEvent::CompleteToken { .. } => "completeToken",
            ClientEvent::GetCurrentProcessingTokens { .. } => "getCurrentProcessingTokens",
            ClientEvent::SendMessage { .. } => "sendMessage",
            ClientEvent::SendNotification { .. } => "sendNotification",
        }
    }
}

/// An event emitted by the hub to one or more connections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum ServerEvent {
    /// The institution's latest active ticket changed (or none exists).
    TokenUpdated(Option<Ticket>),

    /// The institution's recently-completed list changed.
    CompletedTokensUpdated(Vec<Ticket>),

    /// A ticket entered processing.
    ProcessingTokenUpdated(Ticket),

    /// Reply to `getCurrentProcessingTokens`, oldest first.
    ProcessingTokens(Vec<Ticket>),

    /// A user's presence changed.
    PresenceUpdate {
        user_id: String,
        status: PresenceStatus,
    },

    /// A chat message addressed to the receiving user.
    ReceiveMessage {
        sender_id: String,
        sender_type: PartyKind,
        receiver_id: String,
        conversation_id: String,
        content: String,
        timestamp: u64,
        #[serde(skip_serializing_if = "Option::is_none")]
        expires_at: Option<u64>,
    },

    /// A notification addressed to the receiving user.
    ReceiveNotification {
        message: String,
        from_user_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        status: Option<String>,
    },
}

impl ServerEvent {
    /// Wire name of the event, for logging and metrics labels.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::TokenUpdated(_) => "tokenUpdated",
            ServerEvent::CompletedTokensUpdated(_) => "completedTokensUpdated",
            ServerEvent::ProcessingTokenUpdated(_) => "processingTokenUpdated",
            ServerEvent::ProcessingTokens(_) => "processingTokens",
            ServerEvent::PresenceUpdate { .. } => "presenceUpdate",
            ServerEvent::ReceiveMessage { .. } => "receiveMessage",
            ServerEvent::ReceiveNotification { .. } => "receiveNotification",
        }
    }
}
