//! Chat message types and identifier allocation.

use crate::registry::RoomId;
use confab_protocol::Frame;
use std::collections::HashMap;

/// Reserved author identity for join/leave announcements.
///
/// Never admissible as a username; see
/// [`crate::registry::validate_username`].
pub const SYSTEM_AUTHOR: &str = "admin";

/// A message in flight through the relay.
///
/// Exists only for the duration of one relay operation; nothing is
/// retained after fan-out. For user messages the body is ciphertext the
/// relay never inspects; system announcements are plaintext.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    /// Per-room monotonic identifier.
    pub uid: u64,
    /// Room the message belongs to.
    pub room: RoomId,
    /// Ciphertext, or plaintext for system announcements.
    pub body: String,
    /// Author username, or [`SYSTEM_AUTHOR`].
    pub author: String,
    /// Display-formatted send time; absent on system announcements.
    pub sent_at: Option<String>,
}

impl ChatMessage {
    /// A user message carrying ciphertext.
    #[must_use]
    pub fn user(
        uid: u64,
        room: impl Into<RoomId>,
        body: impl Into<String>,
        author: impl Into<String>,
        sent_at: Option<String>,
    ) -> Self {
        Self {
            uid,
            room: room.into(),
            body: body.into(),
            author: author.into(),
            sent_at,
        }
    }

    /// The announcement broadcast when a member joins.
    #[must_use]
    pub fn joined(uid: u64, room: impl Into<RoomId>, username: &str) -> Self {
        Self {
            uid,
            room: room.into(),
            body: format!("{username} has joined the room"),
            author: SYSTEM_AUTHOR.to_string(),
            sent_at: None,
        }
    }

    /// The announcement broadcast when a member leaves.
    #[must_use]
    pub fn left(uid: u64, room: impl Into<RoomId>, username: &str) -> Self {
        Self {
            uid,
            room: room.into(),
            body: format!("{username} has left the room"),
            author: SYSTEM_AUTHOR.to_string(),
            sent_at: None,
        }
    }

    /// Whether this is a system announcement.
    #[must_use]
    pub fn is_system(&self) -> bool {
        self.author == SYSTEM_AUTHOR
    }
}

impl From<ChatMessage> for Frame {
    fn from(msg: ChatMessage) -> Frame {
        Frame::Message {
            uid: msg.uid,
            room: msg.room,
            body: msg.body,
            author: msg.author,
            sent_at: msg.sent_at,
        }
    }
}

/// Monotonic per-room message-id allocator.
///
/// Timestamp-derived identifiers collide under rapid sends; a counter
/// per room cannot. Counters start at 1 and are dropped with the room,
/// so ids are unique within one lifetime of a room.
#[derive(Debug, Default)]
pub struct Sequencer {
    next: HashMap<RoomId, u64>,
}

impl Sequencer {
    /// Create a sequencer with no counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next uid for a room.
    pub fn next(&mut self, room: &str) -> u64 {
        let counter = self.next.entry(room.to_string()).or_insert(1);
        let uid = *counter;
        *counter += 1;
        uid
    }

    /// Drop a room's counter. Called when the room empties.
    pub fn reset(&mut self, room: &str) {
        self.next.remove(room);
    }
}
