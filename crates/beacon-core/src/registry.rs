//! Connection registry for Beacon.
//!
//! The registry exclusively owns the user → connection-set and
//! user → presence maps. Presence is derived from connection-set
//! occupancy: a user with at least one live connection is online (or
//! connected), a user whose last connection unbinds goes offline and is
//! removed entirely. Empty sets are never retained.

use beacon_protocol::PresenceStatus;
use dashmap::DashMap;
use std::collections::HashSet;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

/// A stable external user identifier.
pub type UserId = String;

/// Unique identifier for one live transport connection.
///
/// Many connections may map to one user; the handle itself is opaque to
/// the hub.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub String);

impl ConnectionId {
    /// Create a new connection ID.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a random connection ID.
    #[must_use]
    pub fn generate() -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        Self(format!("conn_{timestamp:x}"))
    }

    /// Get the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ConnectionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ConnectionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Outcome of unbinding a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unbound {
    /// The user the connection belonged to.
    pub user_id: UserId,
    /// Whether this was the user's last connection.
    pub went_offline: bool,
}

/// Registry statistics.
#[derive(Debug, Clone)]
pub struct RegistryStats {
    /// Number of users with at least one live connection.
    pub user_count: usize,
    /// Total number of bound connections.
    pub connection_count: usize,
}

/// The connection registry.
///
/// Every operation is a single map/set mutation under one entry lock, so
/// interleaved calls from different connections' event streams are safe
/// without cross-operation transactions.
#[derive(Debug, Default)]
pub struct Registry {
    /// User → set of bound connections. Empty sets are removed.
    bindings: DashMap<UserId, HashSet<ConnectionId>>,
    /// User → announced presence status.
    status: DashMap<UserId, PresenceStatus>,
}

impl Registry {
    /// Create a new, empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a connection to a user and set the user's presence.
    ///
    /// Idempotent: binding the same connection twice leaves the set
    /// unchanged. A missing/empty user id is a logged no-op.
    pub fn bind(&self, user_id: &str, connection: ConnectionId, status: PresenceStatus) {
        if user_id.is_empty() {
            warn!(connection = %connection, "Bind without user id ignored");
            return;
        }

        self.bindings
            .entry(user_id.to_string())
            .or_default()
            .insert(connection.clone());
        self.status.insert(user_id.to_string(), status);

        debug!(user = %user_id, connection = %connection, status = status.as_str(), "Connection bound");
    }

    /// Unbind a connection from whichever user owns it.
    ///
    /// Scans all entries for the owner (O(total connections), acceptable
    /// at expected scale). When the user's last connection unbinds, both
    /// the binding entry and the status entry are removed; the offline
    /// transition is reported through the returned [`Unbound`] so the
    /// caller can emit exactly one presence broadcast.
    ///
    /// Returns `None` if the connection is not bound anywhere.
    pub fn unbind(&self, connection: &ConnectionId) -> Option<Unbound> {
        let owner = self.bindings.iter().find_map(|entry| {
            entry
                .value()
                .contains(connection)
                .then(|| entry.key().clone())
        })?;

        let went_offline = match self.bindings.get_mut(&owner) {
            Some(mut set) => {
                set.remove(connection);
                set.is_empty()
            }
            None => false,
        };

        if went_offline {
            self.bindings.remove_if(&owner, |_, set| set.is_empty());
            self.status.remove(&owner);
            debug!(user = %owner, connection = %connection, "User went offline");
        } else {
            debug!(user = %owner, connection = %connection, "Connection unbound");
        }

        Some(Unbound {
            user_id: owner,
            went_offline,
        })
    }

    /// Get the connections currently bound to a user, possibly empty.
    #[must_use]
    pub fn connections_for(&self, user_id: &str) -> Vec<ConnectionId> {
        self.bindings
            .get(user_id)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Get a user's announced presence, or `None` if unknown.
    #[must_use]
    pub fn status_of(&self, user_id: &str) -> Option<PresenceStatus> {
        self.status.get(user_id).map(|status| *status)
    }

    /// Whether the user has at least one live connection.
    #[must_use]
    pub fn is_online(&self, user_id: &str) -> bool {
        self.bindings.contains_key(user_id)
    }

    /// Get registry statistics.
    #[must_use]
    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            user_count: self.bindings.len(),
            connection_count: self.bindings.iter().map(|entry| entry.len()).sum(),
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
    fn test_bind_sets_presence() {
        let registry = Registry::new();

        registry.bind("u1", conn("c1"), PresenceStatus::Connected);
        assert_eq!(registry.status_of("u1"), Some(PresenceStatus::Connected));
        assert!(registry.is_online("u1"));

        registry.bind("u1", conn("c2"), PresenceStatus::Online);
        assert_eq!(registry.status_of("u1"), Some(PresenceStatus::Online));
        assert_eq!(registry.connections_for("u1").len(), 2);
    }

    #[test]
    fn test_bind_is_idempotent() {
        let registry = Registry::new();

        registry.bind("u1", conn("c1"), PresenceStatus::Online);
        registry.bind("u1", conn("c1"), PresenceStatus::Online);

        assert_eq!(registry.connections_for("u1").len(), 1);
    }

    #[test]
    fn test_bind_empty_user_is_noop() {
        let registry = Registry::new();

        registry.bind("", conn("c1"), PresenceStatus::Online);

        assert_eq!(registry.stats().user_count, 0);
        assert!(registry.unbind(&conn("c1")).is_none());
    }

    #[test]
    fn test_presence_matches_occupancy() {
        // Online iff the connection set is non-empty, for any bind/unbind
        // sequence.
        let registry = Registry::new();

        registry.bind("u1", conn("c1"), PresenceStatus::Online);
        registry.bind("u1", conn("c2"), PresenceStatus::Online);
        assert!(registry.is_online("u1"));

        let first = registry.unbind(&conn("c1")).unwrap();
        assert!(!first.went_offline);
        assert!(registry.is_online("u1"));
        assert_eq!(registry.status_of("u1"), Some(PresenceStatus::Online));

        let second = registry.unbind(&conn("c2")).unwrap();
        assert!(second.went_offline);
        assert_eq!(second.user_id, "u1");
        assert!(!registry.is_online("u1"));
        // The user is absent after going offline, not retained as offline.
        assert_eq!(registry.status_of("u1"), None);
        assert!(registry.connections_for("u1").is_empty());
    }

    #[test]
    fn test_unbind_unknown_connection() {
        let registry = Registry::new();
        registry.bind("u1", conn("c1"), PresenceStatus::Online);

        assert!(registry.unbind(&conn("nope")).is_none());
        assert_eq!(registry.connections_for("u1").len(), 1);
    }

    #[test]
    fn test_unbind_finds_owner_among_users() {
        let registry = Registry::new();
        registry.bind("u1", conn("c1"), PresenceStatus::Online);
        registry.bind("u2", conn("c2"), PresenceStatus::Online);

        let unbound = registry.unbind(&conn("c2")).unwrap();
        assert_eq!(unbound.user_id, "u2");
        assert!(unbound.went_offline);
        assert!(registry.is_online("u1"));
    }

    #[test]
    fn test_stats() {
        let registry = Registry::new();
        registry.bind("u1", conn("c1"), PresenceStatus::Online);
        registry.bind("u1", conn("c2"), PresenceStatus::Online);
        registry.bind("u2", conn("c3"), PresenceStatus::Connected);

        let stats = registry.stats();
        assert_eq!(stats.user_count, 2);
        assert_eq!(stats.connection_count, 3);
    }
}
