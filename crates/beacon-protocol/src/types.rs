//! Wire-visible entity types for the Beacon protocol.
//!
//! These types appear inside event payloads. Business entities that never
//! cross the wire (conversations, persisted messages) live with the
//! persistence interface instead.

use serde::{Deserialize, Serialize};

/// Presence status of a user, derived from live connection count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceStatus {
    /// At least one live connection, announced via `register`.
    Online,
    /// Last connection closed. Only ever observed in the presence
    /// broadcast that accompanies removal.
    Offline,
    /// At least one live connection, announced via `join`.
    Connected,
}

impl PresenceStatus {
    /// Wire representation of the status.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            PresenceStatus::Online => "online",
            PresenceStatus::Offline => "offline",
            PresenceStatus::Connected => "connected",
        }
    }
}

/// The kind of party behind a user id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PartyKind {
    /// A plain end user.
    User,
    /// An institution account.
    Institution,
}

/// Denormalized identity fields attached to records before emission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserIdentity {
    pub username: String,
    pub mobile_number: String,
}

/// A queue ticket scoped to an institution.
///
/// The ticket lifecycle is owned by the persistence collaborator; the hub
/// only reads flags, patches them, and re-broadcasts the result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ticket {
    pub id: String,
    pub institution_id: String,
    /// Owning user, when the ticket was submitted by a registered user.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default)]
    pub processing: bool,
    #[serde(default)]
    pub completed: bool,
    /// Creation time in Unix milliseconds.
    #[serde(default)]
    pub created_at: u64,
    /// Submitter username, filled in by enrichment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Submitter mobile number, filled in by enrichment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mobile_number: Option<String>,
}

impl Ticket {
    /// Attach submitter identity fields to the ticket.
    #[must_use]
    pub fn with_identity(mut self, identity: UserIdentity) -> Self {
        self.username = Some(identity.username);
        self.mobile_number = Some(identity.mobile_number);
        self
    }

    /// Whether the ticket already carries submitter identity fields.
    #[must_use]
    pub fn is_enriched(&self) -> bool {
        self.username.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presence_status_wire_names() {
        assert_eq!(
            serde_json::to_string(&PresenceStatus::Online).unwrap(),
            r#""online""#
        );
        assert_eq!(PresenceStatus::Offline.as_str(), "offline");
    }

    #[test]
    fn test_party_kind_wire_names() {
        assert_eq!(
            serde_json::to_string(&PartyKind::Institution).unwrap(),
            r#""INSTITUTION""#
        );
        let kind: PartyKind = serde_json::from_str(r#""USER""#).unwrap();
        assert_eq!(kind, PartyKind::User);
    }

    #[test]
    fn test_ticket_enrichment() {
        let ticket = Ticket {
            id: "t1".into(),
            institution_id: "inst-1".into(),
            user_id: Some("u1".into()),
            processing: false,
            completed: false,
            created_at: 1_000,
            username: None,
            mobile_number: None,
        };

        assert!(!ticket.is_enriched());

        let enriched = ticket.with_identity(UserIdentity {
            username: "alice".into(),
            mobile_number: "555-0100".into(),
        });
        assert!(enriched.is_enriched());
        assert_eq!(enriched.username.as_deref(), Some("alice"));
    }

    #[test]
    fn test_ticket_camel_case_fields() {
        let json = r#"{"id":"t1","institutionId":"inst-1","createdAt":5}"#;
        let ticket: Ticket = serde_json::from_str(json).unwrap();
        assert_eq!(ticket.institution_id, "inst-1");
        assert_eq!(ticket.created_at, 5);
        assert!(!ticket.processing);
    }
}
