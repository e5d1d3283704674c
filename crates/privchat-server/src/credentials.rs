//! Credential store: account creation and password verification.
//!
//! The protocol core treats login/register as opaque request/response
//! exchanges preceding the handshake; the store behind them is a trait so a
//! relational backend can replace the in-memory one without touching the
//! state machine. Hashing is PBKDF2-HMAC-SHA256 with a per-account random
//! salt.

use std::collections::HashMap;

use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use sha2::Sha256;
use thiserror::Error;

/// PBKDF2 iteration count.
const PBKDF2_ITERATIONS: u32 = 1000;

/// Per-account salt size in bytes.
const SALT_SIZE: usize = 8;

/// Derived hash size in bytes.
const HASH_SIZE: usize = 32;

/// Errors from account creation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AccountError {
    /// The username already has an account.
    #[error("username already taken")]
    UsernameTaken,

    /// Empty username or password, or a `|` inside the username (it would
    /// corrupt the credential wire format).
    #[error("malformed account request")]
    Malformed,
}

/// Verification and creation of user accounts.
pub trait CredentialStore: Send {
    /// Check a username/password pair. Unknown users and wrong passwords are
    /// indistinguishable to the caller.
    fn verify_credentials(&self, username: &str, password: &str) -> bool;

    /// Create an account with a freshly salted password hash.
    ///
    /// # Errors
    ///
    /// `UsernameTaken` if an account exists, `Malformed` for unusable input.
    fn create_account(&mut self, username: &str, password: &str) -> Result<(), AccountError>;
}

/// Salted PBKDF2 hash of one account's password.
struct StoredCredential {
    salt: [u8; SALT_SIZE],
    hash: [u8; HASH_SIZE],
}

/// In-memory credential store.
#[derive(Default)]
pub struct MemoryCredentialStore {
    accounts: HashMap<String, StoredCredential>,
}

impl MemoryCredentialStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn verify_credentials(&self, username: &str, password: &str) -> bool {
        let Some(stored) = self.accounts.get(username) else {
            return false;
        };
        derive_hash(password, &stored.salt) == stored.hash
    }

    fn create_account(&mut self, username: &str, password: &str) -> Result<(), AccountError> {
        if username.is_empty() || password.is_empty() || username.contains('|') {
            return Err(AccountError::Malformed);
        }
        if self.accounts.contains_key(username) {
            return Err(AccountError::UsernameTaken);
        }

        let mut salt = [0u8; SALT_SIZE];
        rand::rngs::OsRng.fill_bytes(&mut salt);
        let hash = derive_hash(password, &salt);

        self.accounts.insert(username.to_string(), StoredCredential { salt, hash });
        Ok(())
    }
}

/// PBKDF2-HMAC-SHA256 over the password with the account salt.
fn derive_hash(password: &str, salt: &[u8; SALT_SIZE]) -> [u8; HASH_SIZE] {
    let mut hash = [0u8; HASH_SIZE];
    pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, PBKDF2_ITERATIONS, &mut hash);
    hash
}
