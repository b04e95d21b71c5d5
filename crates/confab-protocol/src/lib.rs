//! # confab-protocol
//!
//! Wire protocol definitions for the confab chat relay.
//!
//! This crate defines the frames exchanged between chat clients and the
//! relay server, the MessagePack codec that puts them on the wire, and
//! protocol versioning.
//!
//! ## Frame Types
//!
//! - `Join` - Enter a room under a username
//! - `Send` / `Message` - Relay ciphertext to a room / receive it
//! - `Meta` - Occupancy and room-secret broadcast on membership changes
//! - `Ack` / `Error` - Request acknowledgments and rejections
//!
//! ## Example
//!
//! ```rust
//! use confab_protocol::{Frame, codec};
//!
//! let frame = Frame::join(1, "alice", "lobby");
//!
//! let encoded = codec::encode(&frame).unwrap();
//! let decoded = codec::decode(&encoded).unwrap();
//! assert_eq!(frame, decoded);
//! ```

pub mod codec;
pub mod frames;
pub mod version;

pub use codec::{decode, encode, ProtocolError};
pub use frames::{codes, Frame, FrameType};
pub use version::{Version, PROTOCOL_VERSION};
