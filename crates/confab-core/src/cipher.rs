//! Cipher boundary contract.
//!
//! End-to-end encryption happens at the endpoints: a sender encrypts
//! with the room secret it received in the last meta broadcast, and the
//! relay forwards the resulting ciphertext verbatim. This trait pins
//! down the shape an endpoint cipher must have; the relay never calls
//! `encrypt` or `decrypt` itself, and system announcements bypass the
//! cipher entirely.

use crate::secret::RoomSecret;
use thiserror::Error;

/// Cipher errors.
#[derive(Debug, Error)]
pub enum CipherError {
    /// Ciphertext could not be decrypted with the given key.
    #[error("Undecipherable ciphertext: {0}")]
    Undecipherable(String),
}

/// A symmetric transform over message bodies.
///
/// For any key distributed via a meta broadcast, `decrypt` must invert
/// `encrypt`: `decrypt(encrypt(p, k), k) == p`.
pub trait Cipher: Send + Sync {
    /// Encrypt a plaintext message body.
    fn encrypt(&self, plaintext: &str, key: &RoomSecret) -> String;

    /// Decrypt a ciphertext message body.
    ///
    /// # Errors
    ///
    /// Returns an error if the ciphertext is malformed or was produced
    /// under a different key.
    fn decrypt(&self, ciphertext: &str, key: &RoomSecret) -> Result<String, CipherError>;
}
