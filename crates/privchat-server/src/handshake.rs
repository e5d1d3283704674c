//! Handshake state machine: one per connection, driven payload by payload.
//!
//! Stages advance strictly in order:
//!
//! ```text
//! AwaitUsername → AwaitExchangeKey → AwaitSigningKey → Ready
//! ```
//!
//! Stage transitions are positional: the machine interprets a payload
//! according to its current stage, never by sniffing contents. A payload that
//! fails the current stage's parse is a protocol violation, fatal for the
//! connection, with two deliberate exceptions at the username stage: failed
//! login and failed registration are serviced with a reply and the stage
//! stays put, so a client can retry without reconnecting.

use privchat_crypto::{ExchangePublicKey, SessionKey, SigningPublicKey};
use privchat_proto::{SessionKeyDelivery, wire};
use rand::{CryptoRng, RngCore};

use crate::credentials::{AccountError, CredentialStore};
use crate::error::ServerError;
use crate::session::{PeerSession, SessionStore};

/// Current position in the handshake sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    /// Waiting for a username, a login request or a registration request.
    AwaitUsername,
    /// Username established; waiting for the exchange public key.
    AwaitExchangeKey,
    /// Exchange key stored; waiting for the signing public key.
    AwaitSigningKey,
    /// Session key delivered; payloads are chat envelopes from here on.
    Ready,
}

/// Outcome of feeding one payload to the machine.
#[derive(Debug)]
pub enum HandshakeStep {
    /// Send this reply; the handshake continues.
    Reply(String),
    /// Send this reply (the session-key delivery); the handshake is done.
    Complete {
        /// Serialized session-key delivery payload.
        reply: String,
    },
    /// The handshake already completed; the payload is a chat envelope.
    Chat(String),
}

/// Per-connection handshake driver.
#[derive(Debug)]
pub struct HandshakeMachine {
    conn_id: u64,
    stage: Stage,
    username: Option<String>,
}

impl HandshakeMachine {
    /// New machine for a freshly accepted connection.
    #[must_use]
    pub fn new(conn_id: u64) -> Self {
        Self { conn_id, stage: Stage::AwaitUsername, username: None }
    }

    /// Username established so far, if any.
    #[must_use]
    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    /// Handshake completed for this connection.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.stage == Stage::Ready
    }

    /// Feed one data payload through the machine.
    ///
    /// # Errors
    ///
    /// `HandshakeViolation` for an out-of-order or unparseable payload,
    /// `DuplicateUsername` if the name is held by a live session. Both are
    /// fatal for the connection; the caller closes it.
    pub fn process<C, R>(
        &mut self,
        payload: &str,
        store: &mut SessionStore,
        credentials: &mut C,
        rng: &mut R,
    ) -> Result<HandshakeStep, ServerError>
    where
        C: CredentialStore + ?Sized,
        R: RngCore + CryptoRng,
    {
        match self.stage {
            Stage::AwaitUsername => self.process_username(payload, store, credentials),
            Stage::AwaitExchangeKey => self.process_exchange_key(payload, store),
            Stage::AwaitSigningKey => self.process_signing_key(payload, store, rng),
            Stage::Ready => Ok(HandshakeStep::Chat(payload.to_string())),
        }
    }

    /// Username stage: plain username, `LOGIN|user|pass` or
    /// `REGISTER|user|pass`.
    fn process_username<C>(
        &mut self,
        payload: &str,
        store: &mut SessionStore,
        credentials: &mut C,
    ) -> Result<HandshakeStep, ServerError>
    where
        C: CredentialStore + ?Sized,
    {
        if let Some(rest) = payload.strip_prefix(wire::LOGIN_PREFIX) {
            let Some((username, password)) = parse_credentials(rest) else {
                return Ok(HandshakeStep::Reply(wire::LOGIN_FAIL.to_string()));
            };
            if !credentials.verify_credentials(username, password) {
                return Ok(HandshakeStep::Reply(wire::LOGIN_FAIL.to_string()));
            }
            self.establish_username(username, store)?;
            return Ok(HandshakeStep::Reply(wire::LOGIN_OK.to_string()));
        }

        if let Some(rest) = payload.strip_prefix(wire::REGISTER_PREFIX) {
            let Some((username, password)) = parse_credentials(rest) else {
                return Ok(HandshakeStep::Reply(wire::REGISTER_FAIL.to_string()));
            };
            return match credentials.create_account(username, password) {
                Ok(()) => {
                    self.establish_username(username, store)?;
                    Ok(HandshakeStep::Reply(wire::REGISTER_OK.to_string()))
                }
                Err(AccountError::UsernameTaken) => {
                    Ok(HandshakeStep::Reply(wire::REGISTER_FAIL_USERNAME_EXISTS.to_string()))
                }
                Err(AccountError::Malformed) => {
                    Ok(HandshakeStep::Reply(wire::REGISTER_FAIL.to_string()))
                }
            };
        }

        // Plain (unauthenticated) username.
        if payload.is_empty() || payload.contains('|') {
            return Err(ServerError::HandshakeViolation(format!(
                "invalid username {payload:?}"
            )));
        }
        self.establish_username(payload, store)?;
        Ok(HandshakeStep::Reply(wire::SEND_EXCHANGE_KEY.to_string()))
    }

    /// Bind the username to this connection and advance the stage.
    fn establish_username(
        &mut self,
        username: &str,
        store: &mut SessionStore,
    ) -> Result<(), ServerError> {
        store.register(username, PeerSession::new(self.conn_id))?;
        self.username = Some(username.to_string());
        self.stage = Stage::AwaitExchangeKey;
        Ok(())
    }

    fn process_exchange_key(
        &mut self,
        payload: &str,
        store: &mut SessionStore,
    ) -> Result<HandshakeStep, ServerError> {
        let key = ExchangePublicKey::from_wire(payload).map_err(|e| {
            ServerError::HandshakeViolation(format!("bad exchange key: {e}"))
        })?;

        let session = self.session_mut(store)?;
        session.exchange_key = Some(key);
        self.stage = Stage::AwaitSigningKey;
        Ok(HandshakeStep::Reply(wire::SEND_SIGNING_KEY.to_string()))
    }

    fn process_signing_key<R>(
        &mut self,
        payload: &str,
        store: &mut SessionStore,
        rng: &mut R,
    ) -> Result<HandshakeStep, ServerError>
    where
        R: RngCore + CryptoRng,
    {
        let key = SigningPublicKey::from_wire(payload).map_err(|e| {
            ServerError::HandshakeViolation(format!("bad signing key: {e}"))
        })?;

        let session_key = SessionKey::generate(rng);

        let session = self.session_mut(store)?;
        let Some(exchange_key) = session.exchange_key.clone() else {
            return Err(ServerError::HandshakeViolation(
                "signing key before exchange key".to_string(),
            ));
        };

        let (encrypted_key, encrypted_iv) = exchange_key.wrap_session_key(rng, &session_key)?;
        let delivery = SessionKeyDelivery { encrypted_key, encrypted_iv };

        let session = self.session_mut(store)?;
        session.signing_key = Some(key);
        session.session_key = Some(session_key);
        self.stage = Stage::Ready;
        Ok(HandshakeStep::Complete { reply: delivery.serialize() })
    }

    /// Session bound to this machine's username.
    fn session_mut<'a>(
        &self,
        store: &'a mut SessionStore,
    ) -> Result<&'a mut PeerSession, ServerError> {
        let username = self
            .username
            .as_deref()
            .ok_or(ServerError::UnknownConnection(self.conn_id))?;
        store
            .lookup_mut(username)
            .ok_or(ServerError::UnknownConnection(self.conn_id))
    }
}

/// Split a credential line body into exactly (username, password).
///
/// The wire contract is exactly three `|`-separated fields; a `|` inside the
/// password would make the line ambiguous, so it is rejected.
fn parse_credentials(rest: &str) -> Option<(&str, &str)> {
    let (username, password) = rest.split_once('|')?;
    if password.contains('|') {
        return None;
    }
    Some((username, password))
}
