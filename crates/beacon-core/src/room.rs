//! Institution room membership for Beacon.
//!
//! Rooms group connections by institution id for queue-ticket broadcasts.
//! Membership is connection-level: a room targets all joined connections
//! regardless of which user owns them. There is no explicit leave event on
//! the wire; the hub removes a connection from every room when it closes.

use crate::registry::ConnectionId;
use dashmap::DashMap;
use std::collections::HashSet;
use tracing::debug;

/// An institution identifier.
pub type InstitutionId = String;

/// Room membership, keyed by institution id.
///
/// Rooms that empty out are deleted, never retained.
#[derive(Debug, Default)]
pub struct Rooms {
    rooms: DashMap<InstitutionId, HashSet<ConnectionId>>,
}

impl Rooms {
    /// Create a new, empty room set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Join a connection to an institution room, creating the room if
    /// needed. Idempotent.
    ///
    /// Returns `true` if the connection was newly joined.
    pub fn join(&self, connection: ConnectionId, institution_id: &str) -> bool {
        let joined = self
            .rooms
            .entry(institution_id.to_string())
            .or_default()
            .insert(connection.clone());

        if joined {
            debug!(room = %institution_id, connection = %connection, "Joined institution room");
        }

        joined
    }

    /// Get the current members of a room, possibly empty.
    #[must_use]
    pub fn members(&self, institution_id: &str) -> Vec<ConnectionId> {
        self.rooms
            .get(institution_id)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Get the member count of a room.
    #[must_use]
    pub fn member_count(&self, institution_id: &str) -> usize {
        self.rooms.get(institution_id).map_or(0, |set| set.len())
    }

    /// Get the number of active rooms.
    #[must_use]
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Remove a connection from every room it joined, deleting rooms that
    /// empty out.
    pub fn leave_all(&self, connection: &ConnectionId) {
        let joined: Vec<InstitutionId> = self
            .rooms
            .iter()
            .filter(|entry| entry.value().contains(connection))
            .map(|entry| entry.key().clone())
            .collect();

        for institution_id in joined {
            if let Some(mut set) = self.rooms.get_mut(&institution_id) {
                set.remove(connection);
            }
            self.rooms.remove_if(&institution_id, |_, set| set.is_empty());
            debug!(room = %institution_id, connection = %connection, "Left institution room");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conn(id: &str) -> ConnectionId {
        ConnectionId::new(id)
    }

    #[test]
    fn test_join_is_idempotent() {
        let rooms = Rooms::new();

        assert!(rooms.join(conn("c1"), "inst-1"));
        assert!(!rooms.join(conn("c1"), "inst-1"));

        assert_eq!(rooms.member_count("inst-1"), 1);
    }

    #[test]
    fn test_room_targets_all_members() {
        let rooms = Rooms::new();
        rooms.join(conn("c1"), "inst-1");
        rooms.join(conn("c2"), "inst-1");
        rooms.join(conn("c3"), "inst-2");

        let members = rooms.members("inst-1");
        assert_eq!(members.len(), 2);
        assert!(members.contains(&conn("c1")));
        assert!(!members.contains(&conn("c3")));
    }

    #[test]
    fn test_leave_all_deletes_empty_rooms() {
        let rooms = Rooms::new();
        rooms.join(conn("c1"), "inst-1");
        rooms.join(conn("c1"), "inst-2");
        rooms.join(conn("c2"), "inst-2");

        rooms.leave_all(&conn("c1"));

        assert_eq!(rooms.room_count(), 1);
        assert!(rooms.members("inst-1").is_empty());
        assert_eq!(rooms.member_count("inst-2"), 1);
    }

    #[test]
    fn test_unknown_room_is_empty() {
        let rooms = Rooms::new();
        assert!(rooms.members("inst-404").is_empty());
        assert_eq!(rooms.member_count("inst-404"), 0);
    }
}
