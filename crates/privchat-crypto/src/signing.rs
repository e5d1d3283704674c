//! Signing keypair: detached RSA signatures over chat plaintext.
//!
//! PKCS#1 v1.5 over a SHA-256 digest. Signatures bind the plaintext, not the
//! ciphertext, so verification never depends on decrypting first and a relay
//! can forward a signature verbatim alongside a re-encrypted copy.

use base64::{Engine as _, engine::general_purpose::STANDARD};
use rand::{CryptoRng, RngCore};
use rsa::{Pkcs1v15Sign, RsaPrivateKey, RsaPublicKey, pkcs8::DecodePublicKey};
use sha2::{Digest, Sha256};

use crate::{CryptoError, RSA_BITS, exchange::public_key_to_wire};

/// Client-side signing keypair, independent of the exchange keypair.
pub struct SigningKeyPair {
    private: RsaPrivateKey,
    public: RsaPublicKey,
}

impl SigningKeyPair {
    /// Generate a fresh RSA-2048 signing keypair.
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

    /// Sign a plaintext message.
    ///
    /// # Errors
    ///
    /// `Sign` if the RSA operation fails.
    pub fn sign(&self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let digest = Sha256::digest(plaintext);
        self.private
            .sign(Pkcs1v15Sign::new::<Sha256>(), &digest)
            .map_err(|e| CryptoError::Sign(e.to_string()))
    }
}

/// Verifier half of a peer's signing keypair, held server-side.
#[derive(Debug, Clone)]
pub struct SigningPublicKey(RsaPublicKey);

impl SigningPublicKey {
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

    /// Verify a detached signature over a plaintext.
    ///
    /// # Errors
    ///
    /// `BadSignature` if the signature does not match.
    pub fn verify(&self, plaintext: &[u8], signature: &[u8]) -> Result<(), CryptoError> {
        let digest = Sha256::digest(plaintext);
        self.0
            .verify(Pkcs1v15Sign::new::<Sha256>(), &digest, signature)
            .map_err(|_| CryptoError::BadSignature)
    }
}
