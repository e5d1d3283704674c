//! Per-connection symmetric session key.

use std::fmt;

use rand::{CryptoRng, RngCore};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::CryptoError;

/// AES-256 key size in bytes.
pub const SESSION_KEY_SIZE: usize = 32;

/// AES block-sized IV in bytes.
pub const SESSION_IV_SIZE: usize = 16;

/// Symmetric session key + IV bound to one connected user.
///
/// Generated fresh by the server per connection, delivered to the client
/// wrapped under its exchange public key, and destroyed at disconnect. Never
/// persisted.
///
/// # Security
///
/// Key and IV are zeroized when the value is dropped.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SessionKey {
    key: [u8; SESSION_KEY_SIZE],
    iv: [u8; SESSION_IV_SIZE],
}

impl SessionKey {
    /// Generate a fresh key and IV from a CSPRNG.
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        let mut key = [0u8; SESSION_KEY_SIZE];
        let mut iv = [0u8; SESSION_IV_SIZE];
        rng.fill_bytes(&mut key);
        rng.fill_bytes(&mut iv);
        Self { key, iv }
    }

    /// Reassemble a session key from unwrapped parts (client side).
    ///
    /// # Errors
    ///
    /// `InvalidLength` if either slice has the wrong size.
    pub fn from_slices(key: &[u8], iv: &[u8]) -> Result<Self, CryptoError> {
        let key: [u8; SESSION_KEY_SIZE] = key
            .try_into()
            .map_err(|_| CryptoError::InvalidLength { expected: SESSION_KEY_SIZE, actual: key.len() })?;
        let iv: [u8; SESSION_IV_SIZE] = iv
            .try_into()
            .map_err(|_| CryptoError::InvalidLength { expected: SESSION_IV_SIZE, actual: iv.len() })?;
        Ok(Self { key, iv })
    }

    /// Raw key bytes.
    pub fn key(&self) -> &[u8; SESSION_KEY_SIZE] {
        &self.key
    }

    /// Raw IV bytes.
    pub fn iv(&self) -> &[u8; SESSION_IV_SIZE] {
        &self.iv
    }
}

impl fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Key material never reaches logs.
        f.debug_struct("SessionKey").finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn generate_produces_distinct_keys() {
        let mut rng = rand::thread_rng();
        let a = SessionKey::generate(&mut rng);
        let b = SessionKey::generate(&mut rng);
        assert_ne!(a, b);
    }

    #[test]
    fn from_slices_round_trip() {
        let mut rng = rand::thread_rng();
        let key = SessionKey::generate(&mut rng);

        let rebuilt = SessionKey::from_slices(key.key(), key.iv()).unwrap();
        assert_eq!(rebuilt, key);
    }

    #[test]
    fn from_slices_rejects_wrong_lengths() {
        assert!(matches!(
            SessionKey::from_slices(&[0u8; 16], &[0u8; 16]),
            Err(CryptoError::InvalidLength { expected: 32, actual: 16 })
        ));
        assert!(matches!(
            SessionKey::from_slices(&[0u8; 32], &[0u8; 8]),
            Err(CryptoError::InvalidLength { expected: 16, actual: 8 })
        ));
    }

    #[test]
    fn debug_redacts_key_material() {
        let mut rng = rand::thread_rng();
        let key = SessionKey::generate(&mut rng);
        let debug = format!("{key:?}");
        assert!(!debug.contains("key:"));
        assert!(!debug.contains("iv:"));
    }
}
