//! Typed views over the `||` and `|` text payload contracts.
//!
//! The wire shapes are ad hoc string concatenations inherited from the
//! protocol's first implementation and must be preserved bit-for-bit:
//!
//! - chat envelope: `base64(ciphertext) + "||" + base64(signature)`, or a
//!   single ciphertext field for legacy/unsigned messages
//! - session-key delivery: `base64(encKey) + "|" + base64(encIV)`
//!
//! Internally both are typed structs; string splitting happens only here.

use base64::{Engine as _, engine::general_purpose::STANDARD};

use crate::ProtocolError;

/// Separator between ciphertext and signature in a chat envelope.
const ENVELOPE_SEP: &str = "||";

/// Separator between encrypted key and encrypted IV in a key delivery.
const KEY_DELIVERY_SEP: char = '|';

/// A chat payload: ciphertext plus an optional detached signature.
///
/// The signature is computed over the *plaintext*, not the ciphertext, so a
/// relay can forward it verbatim after re-encrypting for another recipient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// Symmetric ciphertext of the chat plaintext.
    pub ciphertext: Vec<u8>,
    /// Detached signature over the plaintext. `None` for legacy/unsigned
    /// messages and server-generated notifications.
    pub signature: Option<Vec<u8>>,
}

impl Envelope {
    /// Create a signed envelope.
    #[must_use]
    pub fn signed(ciphertext: Vec<u8>, signature: Vec<u8>) -> Self {
        Self { ciphertext, signature: Some(signature) }
    }

    /// Create an unsigned (legacy/notification) envelope.
    #[must_use]
    pub fn unsigned(ciphertext: Vec<u8>) -> Self {
        Self { ciphertext, signature: None }
    }

    /// Parse an envelope from its text payload form.
    ///
    /// Splits on the *first* `||`; a single field is a legacy unsigned
    /// message.
    ///
    /// # Errors
    ///
    /// `MalformedPayload` if either field is not valid base64.
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let (ct_b64, sig_b64) = match text.split_once(ENVELOPE_SEP) {
            Some((ct, sig)) => (ct, Some(sig)),
            None => (text, None),
        };

        let ciphertext = STANDARD
            .decode(ct_b64)
            .map_err(|e| ProtocolError::MalformedPayload(format!("envelope ciphertext: {e}")))?;

        let signature = sig_b64
            .map(|sig| {
                STANDARD.decode(sig).map_err(|e| {
                    ProtocolError::MalformedPayload(format!("envelope signature: {e}"))
                })
            })
            .transpose()?;

        Ok(Self { ciphertext, signature })
    }

    /// Serialize to the text payload form.
    #[must_use]
    pub fn serialize(&self) -> String {
        let ct = STANDARD.encode(&self.ciphertext);
        match &self.signature {
            Some(sig) => format!("{ct}{ENVELOPE_SEP}{}", STANDARD.encode(sig)),
            None => ct,
        }
    }
}

/// Server-to-client session-key delivery: RSA-encrypted key and IV.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionKeyDelivery {
    /// Session key encrypted under the client's exchange public key.
    pub encrypted_key: Vec<u8>,
    /// IV encrypted under the client's exchange public key.
    pub encrypted_iv: Vec<u8>,
}

impl SessionKeyDelivery {
    /// Parse from the `encKey|encIV` text form.
    ///
    /// # Errors
    ///
    /// `MalformedPayload` for a wrong field count or invalid base64.
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let Some((key_b64, iv_b64)) = text.split_once(KEY_DELIVERY_SEP) else {
            return Err(ProtocolError::MalformedPayload(
                "key delivery: expected two |-separated fields".to_string(),
            ));
        };

        if iv_b64.contains(KEY_DELIVERY_SEP) {
            return Err(ProtocolError::MalformedPayload(
                "key delivery: too many fields".to_string(),
            ));
        }

        let encrypted_key = STANDARD
            .decode(key_b64)
            .map_err(|e| ProtocolError::MalformedPayload(format!("key delivery key: {e}")))?;
        let encrypted_iv = STANDARD
            .decode(iv_b64)
            .map_err(|e| ProtocolError::MalformedPayload(format!("key delivery iv: {e}")))?;

        Ok(Self { encrypted_key, encrypted_iv })
    }

    /// Serialize to the `encKey|encIV` text form.
    #[must_use]
    pub fn serialize(&self) -> String {
        format!("{}{KEY_DELIVERY_SEP}{}", STANDARD.encode(&self.encrypted_key), STANDARD.encode(&self.encrypted_iv))
    }
}
