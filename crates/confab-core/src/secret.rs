//! Per-room symmetric keys.
//!
//! Every live room has exactly one secret, minted when its first member
//! joins and discarded when its last member leaves. Members receive the
//! current secret in every meta broadcast and use it for end-to-end
//! encryption; the relay itself never encrypts or decrypts anything.

use crate::registry::RoomId;
use rand::distr::{Alphanumeric, SampleString};
use std::collections::HashMap;
use std::fmt;
use tracing::debug;

/// Length of generated key material in characters.
pub const SECRET_LENGTH: usize = 32;

/// A room's shared symmetric key.
#[derive(Clone, PartialEq, Eq)]
pub struct RoomSecret(String);

impl RoomSecret {
    /// Generate fresh random key material.
    #[must_use]
    pub fn generate() -> Self {
        Self(Alphanumeric.sample_string(&mut rand::rng(), SECRET_LENGTH))
    }

    /// Wrap existing key material.
    #[must_use]
    pub fn new(material: impl Into<String>) -> Self {
        Self(material.into())
    }

    /// The key material, for inclusion in a meta broadcast.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// Key material stays out of logs.
impl fmt::Debug for RoomSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RoomSecret(..)")
    }
}

/// Keyring holding one secret per live room.
#[derive(Debug, Default)]
pub struct Keyring {
    keys: HashMap<RoomId, RoomSecret>,
}

impl Keyring {
    /// Create an empty keyring.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The secret for a room, minting one on first use.
    pub fn issue(&mut self, room: &str) -> RoomSecret {
        if let Some(secret) = self.keys.get(room) {
            return secret.clone();
        }
        let secret = RoomSecret::generate();
        self.keys.insert(room.to_string(), secret.clone());
        debug!(room = %room, "Minted room secret");
        secret
    }

    /// The secret for a room, if one exists.
    #[must_use]
    pub fn peek(&self, room: &str) -> Option<&RoomSecret> {
        self.keys.get(room)
    }

    /// Discard a room's secret. Called when the room empties.
    pub fn retire(&mut self, room: &str) -> Option<RoomSecret> {
        let secret = self.keys.remove(room);
        if secret.is_some() {
            debug!(room = %room, "Retired room secret");
        }
        secret
    }

    /// Number of rooms holding a secret.
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Check whether no secrets are held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}
