//! Connection registry for confab.
//!
//! The registry maps connection identifiers to membership records. It is
//! the single owner of membership state: rooms are never stored, they
//! exist implicitly while at least one record references them.

use crate::message::SYSTEM_AUTHOR;
use std::collections::HashMap;
use thiserror::Error;
use tracing::debug;

/// A connection identifier, assigned by the transport layer.
pub type ConnectionId = String;

/// A room identifier.
pub type RoomId = String;

/// Maximum username length.
pub const MAX_USERNAME_LENGTH: usize = 32;

/// Maximum room name length.
pub const MAX_ROOM_NAME_LENGTH: usize = 64;

/// Validate a username.
///
/// Comparison elsewhere is byte-exact; validation only rules out names
/// that cannot be displayed or that collide with the system author.
///
/// # Errors
///
/// Returns an error message if the username is invalid.
pub fn validate_username(name: &str) -> Result<(), &'static str> {
    if name.is_empty() {
        return Err("Username cannot be empty");
    }
    if name.len() > MAX_USERNAME_LENGTH {
        return Err("Username too long");
    }
    if name == SYSTEM_AUTHOR {
        return Err("Username is reserved");
    }
    if !name.chars().all(|c| c.is_ascii() && !c.is_ascii_control()) {
        return Err("Username contains invalid characters");
    }
    Ok(())
}

/// Validate a room name.
///
/// # Errors
///
/// Returns an error message if the room name is invalid.
pub fn validate_room_name(name: &str) -> Result<(), &'static str> {
    if name.is_empty() {
        return Err("Room name cannot be empty");
    }
    if name.len() > MAX_ROOM_NAME_LENGTH {
        return Err("Room name too long");
    }
    if !name.chars().all(|c| c.is_ascii() && !c.is_ascii_control()) {
        return Err("Room name contains invalid characters");
    }
    Ok(())
}

/// Registry errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// Another member of the room already uses this username.
    #[error("Username {username:?} already taken in room {room:?}")]
    DuplicateUsername {
        /// The contested username.
        username: String,
        /// The room it is taken in.
        room: String,
    },
}

/// The binding of one connection to a username and a room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MembershipRecord {
    /// Connection this record belongs to.
    pub connection_id: ConnectionId,
    /// Username, unique within the room (case-sensitive).
    pub username: String,
    /// Room the connection joined.
    pub room: RoomId,
}

/// The process-wide membership store.
///
/// Plain data, no interior locking: the coordinator serializes every
/// mutation behind its own lock, and nothing else writes here.
#[derive(Debug, Default)]
pub struct Registry {
    records: HashMap<ConnectionId, MembershipRecord>,
}

impl Registry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of active membership records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Check whether the registry has no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Look up the record for a connection.
    #[must_use]
    pub fn get(&self, connection_id: &str) -> Option<&MembershipRecord> {
        self.records.get(connection_id)
    }

    /// Insert a membership record for a connection.
    ///
    /// The caller guarantees the connection has no record yet; the
    /// session state machine enforces that a connection joins at most
    /// once.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicateUsername`] if any record in the
    /// same room carries a byte-equal username. The registry is left
    /// unchanged on failure.
    pub fn add(
        &mut self,
        connection_id: impl Into<ConnectionId>,
        username: impl Into<String>,
        room: impl Into<RoomId>,
    ) -> Result<MembershipRecord, RegistryError> {
        let connection_id = connection_id.into();
        let username = username.into();
        let room = room.into();

        if self
            .records
            .values()
            .any(|r| r.room == room && r.username == username)
        {
            return Err(RegistryError::DuplicateUsername { username, room });
        }

        let record = MembershipRecord {
            connection_id: connection_id.clone(),
            username,
            room,
        };
        self.records.insert(connection_id.clone(), record.clone());
        debug!(connection = %connection_id, username = %record.username, room = %record.room, "Member registered");

        Ok(record)
    }

    /// Remove and return the record for a connection.
    ///
    /// Absence is a normal outcome, not an error: disconnecting before
    /// ever joining is a common path.
    pub fn remove(&mut self, connection_id: &str) -> Option<MembershipRecord> {
        let record = self.records.remove(connection_id);
        if let Some(record) = &record {
            debug!(connection = %connection_id, username = %record.username, room = %record.room, "Member removed");
        }
        record
    }

    /// All records in a room. Order is not significant.
    #[must_use]
    pub fn members_of(&self, room: &str) -> Vec<MembershipRecord> {
        self.records
            .values()
            .filter(|r| r.room == room)
            .cloned()
            .collect()
    }

    /// Iterate over all records.
    pub fn iter(&self) -> impl Iterator<Item = &MembershipRecord> {
        self.records.values()
    }
}
