//! Exchange keypair: wraps and unwraps the session key during the handshake.
//!
//! RSA-2048 with PKCS#1 v1.5 padding. The exchange keypair encrypts exactly
//! two values per connection (session key and IV) and nothing else; chat
//! content never touches it.

use base64::{Engine as _, engine::general_purpose::STANDARD};
use rand::{CryptoRng, RngCore};
use rsa::{
    Pkcs1v15Encrypt, RsaPrivateKey, RsaPublicKey,
    pkcs8::{DecodePublicKey, EncodePublicKey},
};

use crate::{CryptoError, RSA_BITS, SessionKey};

/// Client-side exchange keypair.
///
/// Generated per connection; the private half never leaves the client.
pub struct ExchangeKeyPair {
    private: RsaPrivateKey,
    public: RsaPublicKey,
}

impl ExchangeKeyPair {
    /// Generate a fresh RSA-2048 keypair.
    ///
    /// # Errors
    ///
    /// `KeyGeneration` if the RNG or prime search fails.
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Result<Self, CryptoError> {
        let private = RsaPrivateKey::new(rng, RSA_BITS)
            .map_err(|e| CryptoError::KeyGeneration(e.to_string()))?;
        let public = RsaPublicKey::from(&private);
        Ok(Self { private, public })
    }

    /// Public key as the wire string (base64 of SPKI DER).
    ///
    /// # Errors
    ///
    /// `InvalidKey` if DER encoding fails.
    pub fn public_key_wire(&self) -> Result<String, CryptoError> {
        public_key_to_wire(&self.public)
    }

    /// Unwrap a session key delivered by the server.
    ///
    /// # Errors
    ///
    /// `Decrypt` if either ciphertext does not decrypt under the private
    /// key, `InvalidLength` if the recovered parts have the wrong size.
    pub fn unwrap_session_key(
        &self,
        encrypted_key: &[u8],
        encrypted_iv: &[u8],
    ) -> Result<SessionKey, CryptoError> {
        let key = self
            .private
            .decrypt(Pkcs1v15Encrypt, encrypted_key)
            .map_err(|e| CryptoError::Decrypt(e.to_string()))?;
        let iv = self
            .private
            .decrypt(Pkcs1v15Encrypt, encrypted_iv)
            .map_err(|e| CryptoError::Decrypt(e.to_string()))?;
        SessionKey::from_slices(&key, &iv)
    }
}

/// Server-side view of a client's exchange public key.
#[derive(Debug, Clone)]
pub struct ExchangePublicKey(RsaPublicKey);

impl ExchangePublicKey {
    /// Parse from the wire string (base64 of SPKI DER).
    ///
    /// # Errors
    ///
    /// `InvalidKey` for bad base64 or DER.
    pub fn from_wire(wire: &str) -> Result<Self, CryptoError> {
        let der = STANDARD.decode(wire).map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        let key = RsaPublicKey::from_public_key_der(&der)
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        Ok(Self(key))
    }

    /// Wrap a session key for delivery: returns the two ciphertexts
    /// (encrypted key, encrypted IV).
    ///
    /// # Errors
    ///
    /// `Encrypt` if RSA encryption fails.
    pub fn wrap_session_key<R: RngCore + CryptoRng>(
        &self,
        rng: &mut R,
        session_key: &SessionKey,
    ) -> Result<(Vec<u8>, Vec<u8>), CryptoError> {
        let encrypted_key = self
            .0
            .encrypt(rng, Pkcs1v15Encrypt, session_key.key())
            .map_err(|e| CryptoError::Encrypt(e.to_string()))?;
        let encrypted_iv = self
            .0
            .encrypt(rng, Pkcs1v15Encrypt, session_key.iv())
            .map_err(|e| CryptoError::Encrypt(e.to_string()))?;
        Ok((encrypted_key, encrypted_iv))
    }
}

/// Encode a public key as the wire string (base64 of SPKI DER).
pub(crate) fn public_key_to_wire(key: &RsaPublicKey) -> Result<String, CryptoError> {
    let der = key.to_public_key_der().map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
    Ok(STANDARD.encode(der.as_bytes()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn wrap_unwrap_session_key() {
        let mut rng = rand::thread_rng();
        let pair = ExchangeKeyPair::generate(&mut rng).unwrap();

        let server_view = ExchangePublicKey::from_wire(&pair.public_key_wire().unwrap()).unwrap();
        let session_key = SessionKey::generate(&mut rng);

        let (enc_key, enc_iv) = server_view.wrap_session_key(&mut rng, &session_key).unwrap();
        assert_ne!(enc_key, session_key.key().as_slice());

        let unwrapped = pair.unwrap_session_key(&enc_key, &enc_iv).unwrap();
        assert_eq!(unwrapped, session_key);
    }

    #[test]
    fn unwrap_with_wrong_keypair_fails() {
        let mut rng = rand::thread_rng();
        let pair = ExchangeKeyPair::generate(&mut rng).unwrap();
        let other = ExchangeKeyPair::generate(&mut rng).unwrap();

        let server_view = ExchangePublicKey::from_wire(&pair.public_key_wire().unwrap()).unwrap();
        let session_key = SessionKey::generate(&mut rng);
        let (enc_key, enc_iv) = server_view.wrap_session_key(&mut rng, &session_key).unwrap();

        assert!(other.unwrap_session_key(&enc_key, &enc_iv).is_err());
    }

    #[test]
    fn from_wire_rejects_garbage() {
        assert!(ExchangePublicKey::from_wire("not base64!").is_err());
        assert!(ExchangePublicKey::from_wire(&STANDARD.encode(b"not der")).is_err());
    }
}
