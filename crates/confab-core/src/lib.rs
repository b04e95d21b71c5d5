//! # confab-core
//!
//! Room membership and message-relay coordination for the confab chat
//! relay.
//!
//! This crate provides the building blocks the server drives:
//!
//! - **Registry** - Who is connected, as whom, in which room
//! - **Roster** - Derived read-only view of a room's members
//! - **Keyring** - One generated symmetric key per live room
//! - **Coordinator** - The join/relay/leave state machine and fan-out
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌──────────────┐     ┌─────────────┐
//! │  Connection │────▶│  Coordinator │────▶│  Registry   │
//! └─────────────┘     └──────────────┘     └─────────────┘
//!                            │                    │
//!                            ▼                    ▼
//!                     ┌─────────────┐      ┌─────────────┐
//!                     │  EventSink  │      │   Roster    │
//!                     └─────────────┘      └─────────────┘
//! ```
//!
//! The coordinator is the only writer of the registry. Everything it
//! emits goes through [`EventSink`], the abstract per-connection event
//! channel the transport layer implements. Nothing here performs I/O.

pub mod cipher;
pub mod message;
pub mod registry;
pub mod roster;
pub mod secret;
pub mod session;

pub use cipher::{Cipher, CipherError};
pub use message::{ChatMessage, Sequencer, SYSTEM_AUTHOR};
pub use registry::{ConnectionId, MembershipRecord, Registry, RegistryError, RoomId};
pub use roster::Roster;
pub use secret::{Keyring, RoomSecret};
pub use session::{
    Coordinator, CoordinatorStats, EventSink, JoinError, RelayError, Session, SessionState,
};
