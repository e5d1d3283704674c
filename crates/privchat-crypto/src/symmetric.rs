//! Chat content cipher: AES-256-CBC with PKCS#7 padding.
//!
//! The session's fixed IV is applied per message, matching the wire contract
//! of the original protocol. Confidentiality of chat content rests on the
//! per-connection key; authenticity comes from the detached RSA signature,
//! not from the cipher.

use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit, block_padding::Pkcs7};

use crate::{CryptoError, SessionKey};

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// Encrypt plaintext under a session key.
#[must_use]
pub fn encrypt(key: &SessionKey, plaintext: &[u8]) -> Vec<u8> {
    Aes256CbcEnc::new(key.key().into(), key.iv().into())
        .encrypt_padded_vec_mut::<Pkcs7>(plaintext)
}

/// Decrypt ciphertext under a session key.
///
/// # Errors
///
/// `CryptoError::Decrypt` on corrupt ciphertext or a wrong key (surfaces as a
/// padding failure). Callers drop the message; they never NACK.
pub fn decrypt(key: &SessionKey, ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    Aes256CbcDec::new(key.key().into(), key.iv().into())
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|e| CryptoError::Decrypt(e.to_string()))
}
