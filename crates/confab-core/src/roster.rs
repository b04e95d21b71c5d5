//! Derived room views.
//!
//! A room is never stored anywhere: it is the set of registry records
//! sharing a room id, and it exists exactly while that set is non-empty.
//! [`Roster`] computes those views on demand so there is no second copy
//! of membership state to drift out of sync.

use crate::registry::{MembershipRecord, Registry, RoomId};
use std::collections::BTreeSet;

/// Read-only view over the registry, scoped to room-level questions.
pub struct Roster<'a> {
    registry: &'a Registry,
}

impl<'a> Roster<'a> {
    /// Create a roster over a registry.
    #[must_use]
    pub fn new(registry: &'a Registry) -> Self {
        Self { registry }
    }

    /// Members of a room. Order is not significant.
    #[must_use]
    pub fn members(&self, room: &str) -> Vec<MembershipRecord> {
        self.registry.members_of(room)
    }

    /// Occupancy of a room.
    #[must_use]
    pub fn occupancy(&self, room: &str) -> usize {
        self.registry.iter().filter(|r| r.room == room).count()
    }

    /// Whether a room has no members (and therefore does not exist).
    #[must_use]
    pub fn is_vacant(&self, room: &str) -> bool {
        self.occupancy(room) == 0
    }

    /// Whether a username is taken in a room (case-sensitive).
    #[must_use]
    pub fn has_username(&self, room: &str, username: &str) -> bool {
        self.registry
            .iter()
            .any(|r| r.room == room && r.username == username)
    }

    /// All rooms with at least one member.
    #[must_use]
    pub fn rooms(&self) -> BTreeSet<RoomId> {
        self.registry.iter().map(|r| r.room.clone()).collect()
    }
}
