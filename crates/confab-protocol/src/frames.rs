//! Frame types for the confab protocol.
//!
//! Frames are the unit of communication between a chat client and the
//! relay. Each frame is serialized with MessagePack; see [`crate::codec`]
//! for the framing layer. Disconnects have no frame of their own, they
//! are signaled by closing the transport.

use serde::{Deserialize, Serialize};

/// Frame type identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
#[repr(u8)]
pub enum FrameType {
    Join = 0x01,
    Send = 0x02,
    Message = 0x03,
    Meta = 0x04,
    Ack = 0x05,
    Error = 0x06,
    Ping = 0x07,
    Pong = 0x08,
    Connected = 0x09,
}

impl From<FrameType> for u8 {
    fn from(ft: FrameType) -> u8 {
        ft as u8
    }
}

impl TryFrom<u8> for FrameType {
    type Error = &'static str;

    fn try_from(value: u8) -> Result<Self, <Self as TryFrom<u8>>::Error> {
        match value {
            0x01 => Ok(FrameType::Join),
            0x02 => Ok(FrameType::Send),
            0x03 => Ok(FrameType::Message),
            0x04 => Ok(FrameType::Meta),
            0x05 => Ok(FrameType::Ack),
            0x06 => Ok(FrameType::Error),
            0x07 => Ok(FrameType::Ping),
            0x08 => Ok(FrameType::Pong),
            0x09 => Ok(FrameType::Connected),
            _ => Err("Invalid frame type"),
        }
    }
}

/// Error codes carried by [`Frame::Error`].
pub mod codes {
    /// Frame could not be decoded or failed basic validation.
    pub const MALFORMED_FRAME: u16 = 1001;
    /// Another member of the room already uses this username.
    pub const DUPLICATE_USERNAME: u16 = 2001;
    /// The username is the reserved system author identity.
    pub const RESERVED_USERNAME: u16 = 2002;
    /// The username failed validation (empty, too long, bad characters).
    pub const INVALID_USERNAME: u16 = 2003;
    /// The room name failed validation.
    pub const INVALID_ROOM: u16 = 2004;
    /// The connection already joined a room.
    pub const ALREADY_JOINED: u16 = 2005;
    /// The connection has not joined a room yet, or its session is closed.
    pub const NOT_JOINED: u16 = 2006;
    /// The target room does not match the room the connection joined.
    pub const ROOM_MISMATCH: u16 = 2007;
}

/// A protocol frame.
///
/// `Join`, `Send`, and `Ping` travel client-to-server; the rest travel
/// server-to-client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Frame {
    /// Request to join a room under a username.
    #[serde(rename = "join")]
    Join {
        /// Request ID for acknowledgment or rejection.
        id: u64,
        /// Requested username, unique within the room.
        username: String,
        /// Room to join.
        room: String,
    },

    /// Relay a ciphertext message to the sender's room.
    #[serde(rename = "send")]
    Send {
        /// Optional request ID for acknowledgment.
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<u64>,
        /// Target room; must match the room the sender joined.
        room: String,
        /// Ciphertext, already encrypted by the sender.
        body: String,
        /// Claimed author. The relay stamps the registered username
        /// instead; this field exists for client-side echo only.
        #[serde(skip_serializing_if = "Option::is_none")]
        author: Option<String>,
        /// Display-formatted send time (e.g. "14:32").
        #[serde(skip_serializing_if = "Option::is_none")]
        sent_at: Option<String>,
    },

    /// A relayed message delivered to a room member.
    #[serde(rename = "message")]
    Message {
        /// Per-room monotonic message identifier.
        uid: u64,
        /// Room the message belongs to.
        room: String,
        /// Ciphertext for user messages, plaintext for system
        /// announcements.
        body: String,
        /// Author username, or the reserved system author.
        author: String,
        /// Display-formatted send time; absent on system announcements.
        #[serde(skip_serializing_if = "Option::is_none")]
        sent_at: Option<String>,
    },

    /// Room metadata broadcast to all members on every membership change.
    #[serde(rename = "meta")]
    Meta {
        /// Room this update describes.
        room: String,
        /// Current occupancy of the room.
        total_active_users: u32,
        /// The room's shared symmetric key.
        room_secret: String,
    },

    /// Acknowledgment of a request.
    #[serde(rename = "ack")]
    Ack {
        /// ID of the acknowledged request.
        id: u64,
    },

    /// Rejection of a request, delivered only to its originator.
    #[serde(rename = "error")]
    Error {
        /// ID of the failed request (0 if not applicable).
        id: u64,
        /// Error code; see [`codes`].
        code: u16,
        /// Human-readable error message.
        message: String,
    },

    /// Keepalive ping.
    #[serde(rename = "ping")]
    Ping {
        #[serde(skip_serializing_if = "Option::is_none")]
        timestamp: Option<u64>,
    },

    /// Keepalive pong.
    #[serde(rename = "pong")]
    Pong {
        /// Echoed timestamp from ping.
        #[serde(skip_serializing_if = "Option::is_none")]
        timestamp: Option<u64>,
    },

    /// Connection established response, first frame on every connection.
    #[serde(rename = "connected")]
    Connected {
        /// Unique connection identifier assigned by the relay.
        connection_id: String,
        /// Protocol major version spoken by the server.
        version: u8,
        /// Recommended heartbeat interval in milliseconds.
        heartbeat: u32,
    },
}

impl Frame {
    /// Get the frame type.
    #[must_use]
    pub fn frame_type(&self) -> FrameType {
        match self {
            Frame::Join { .. } => FrameType::Join,
            Frame::Send { .. } => FrameType::Send,
            Frame::Message { .. } => FrameType::Message,
            Frame::Meta { .. } => FrameType::Meta,
            Frame::Ack { .. } => FrameType::Ack,
            Frame::Error { .. } => FrameType::Error,
            Frame::Ping { .. } => FrameType::Ping,
            Frame::Pong { .. } => FrameType::Pong,
            Frame::Connected { .. } => FrameType::Connected,
        }
    }

    /// Create a new Join frame.
    #[must_use]
    pub fn join(id: u64, username: impl Into<String>, room: impl Into<String>) -> Self {
        Frame::Join {
            id,
            username: username.into(),
            room: room.into(),
        }
    }

    /// Create a new Send frame without acknowledgment.
    #[must_use]
    pub fn send(room: impl Into<String>, body: impl Into<String>) -> Self {
        Frame::Send {
            id: None,
            room: room.into(),
            body: body.into(),
            author: None,
            sent_at: None,
        }
    }

    /// Create a new Send frame with ID for acknowledgment.
    #[must_use]
    pub fn send_with_ack(id: u64, room: impl Into<String>, body: impl Into<String>) -> Self {
        Frame::Send {
            id: Some(id),
            room: room.into(),
            body: body.into(),
            author: None,
            sent_at: None,
        }
    }

    /// Create a new Meta frame.
    #[must_use]
    pub fn meta(room: impl Into<String>, total_active_users: u32, room_secret: impl Into<String>) -> Self {
        Frame::Meta {
            room: room.into(),
            total_active_users,
            room_secret: room_secret.into(),
        }
    }

    /// Create a new Ack frame.
    #[must_use]
    pub fn ack(id: u64) -> Self {
        Frame::Ack { id }
    }

    /// Create a new Error frame.
    #[must_use]
    pub fn error(id: u64, code: u16, message: impl Into<String>) -> Self {
        Frame::Error {
            id,
            code,
            message: message.into(),
        }
    }

    /// Create a new Ping frame.
    #[must_use]
    pub fn ping() -> Self {
        Frame::Ping { timestamp: None }
    }

    /// Create a new Pong frame.
    #[must_use]
    pub fn pong(timestamp: Option<u64>) -> Self {
        Frame::Pong { timestamp }
    }

    /// Create a new Connected frame.
    #[must_use]
    pub fn connected(connection_id: impl Into<String>, version: u8, heartbeat: u32) -> Self {
        Frame::Connected {
            connection_id: connection_id.into(),
            version,
            heartbeat,
        }
    }
}
