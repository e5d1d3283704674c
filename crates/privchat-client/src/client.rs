//! Client-side protocol state machine, no I/O.
//!
//! Mirrors the server's positional handshake from the other side:
//!
//! ```text
//! send hello + auth line
//!   ← SEND_EXCHANGE_KEY / LOGIN_OK / REGISTER_OK   → send exchange key
//!   ← SEND_SIGNING_KEY                             → send signing key
//!   ← encKey|encIV                                 → unwrap session key, ready
//! ```
//!
//! Each inbound frame is fed to [`Client::handle_frame`], which returns the
//! frames to send plus events for the application. The machine accepts the
//! session-key delivery exactly once; anything arriving after that is a chat
//! envelope.

use privchat_crypto::{ExchangeKeyPair, SessionKey, SigningKeyPair, decrypt, encrypt};
use privchat_proto::{CmdType, Envelope, Frame, SessionKeyDelivery, wire};
use rand::{CryptoRng, RngCore};

use crate::error::ClientError;

/// How the client identifies itself in the first data frame.
#[derive(Debug, Clone)]
pub enum Auth {
    /// Plain username, no account.
    Username(String),
    /// Log in to an existing account.
    Login {
        /// Account username.
        username: String,
        /// Account password.
        password: String,
    },
    /// Create an account and log in.
    Register {
        /// Desired username.
        username: String,
        /// Desired password.
        password: String,
    },
}

impl Auth {
    /// Username this auth would establish.
    #[must_use]
    pub fn username(&self) -> &str {
        match self {
            Self::Username(username)
            | Self::Login { username, .. }
            | Self::Register { username, .. } => username,
        }
    }

    /// The first data payload of the connection.
    fn wire_line(&self) -> String {
        match self {
            Self::Username(username) => username.clone(),
            Self::Login { username, password } => {
                format!("{}{username}|{password}", wire::LOGIN_PREFIX)
            }
            Self::Register { username, password } => {
                format!("{}{username}|{password}", wire::REGISTER_PREFIX)
            }
        }
    }
}

/// Handshake position, client side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Auth line sent; waiting for the exchange-key prompt or a rejection.
    AwaitAck,
    /// Exchange key sent; waiting for the signing-key prompt.
    AwaitSigningPrompt,
    /// Signing key sent; waiting for the session-key delivery.
    AwaitSessionKey,
    /// Session established.
    Ready,
}

/// Outcome of feeding one inbound frame to the machine.
#[derive(Debug)]
pub enum ClientStep {
    /// Write this frame to the server.
    Send(Frame),
    /// The handshake completed; messages can now be sent.
    SessionReady,
    /// A chat message arrived.
    Message {
        /// Decrypted message text.
        text: String,
        /// A signature was attached and forwarded by the relay. Server
        /// notifications are unsigned and surface as unverified.
        verified: bool,
    },
    /// Login or registration was rejected; retry with [`Client::authenticate`].
    AuthFailed(String),
}

/// Sans-IO client protocol machine.
pub struct Client {
    auth: Auth,
    phase: Phase,
    exchange: ExchangeKeyPair,
    signing: SigningKeyPair,
    session_key: Option<SessionKey>,
}

impl Client {
    /// Create a client with fresh per-connection keypairs.
    ///
    /// # Errors
    ///
    /// `Crypto` if keypair generation fails.
    pub fn new<R: RngCore + CryptoRng>(auth: Auth, rng: &mut R) -> Result<Self, ClientError> {
        Ok(Self {
            auth,
            phase: Phase::AwaitAck,
            exchange: ExchangeKeyPair::generate(rng)?,
            signing: SigningKeyPair::generate(rng)?,
            session_key: None,
        })
    }

    /// Frames to send immediately after connecting: the hello marker and the
    /// auth line.
    #[must_use]
    pub fn hello_frames(&self) -> Vec<Frame> {
        vec![Frame::hello(), Frame::data(&self.auth.wire_line())]
    }

    /// Retry authentication after an [`ClientStep::AuthFailed`] event.
    ///
    /// Returns the auth frame to send. Only valid before the username is
    /// accepted.
    ///
    /// # Errors
    ///
    /// `HandshakeFailed` if the handshake already advanced past the auth
    /// stage.
    pub fn authenticate(&mut self, auth: Auth) -> Result<Frame, ClientError> {
        if self.phase != Phase::AwaitAck {
            return Err(ClientError::HandshakeFailed(
                "authentication already completed".to_string(),
            ));
        }
        self.auth = auth;
        Ok(Frame::data(&self.auth.wire_line()))
    }

    /// Session established.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.phase == Phase::Ready
    }

    /// Session key delivered by the server, once ready.
    #[must_use]
    pub fn session_key(&self) -> Option<&SessionKey> {
        self.session_key.as_ref()
    }

    /// Feed one inbound frame through the machine.
    ///
    /// # Errors
    ///
    /// `HandshakeFailed` for a reply the current phase cannot interpret,
    /// `Disconnected` for an end-of-transmission frame.
    pub fn handle_frame(&mut self, frame: &Frame) -> Result<Vec<ClientStep>, ClientError> {
        match frame.cmd {
            CmdType::Eot => Err(ClientError::Disconnected),
            CmdType::Hello => Ok(Vec::new()),
            CmdType::Data => {
                let payload = frame.payload_str()?.to_string();
                match self.phase {
                    Phase::AwaitAck => self.on_ack(&payload),
                    Phase::AwaitSigningPrompt => self.on_signing_prompt(&payload),
                    Phase::AwaitSessionKey => self.on_session_key(&payload),
                    Phase::Ready => Ok(self.on_chat(&payload)),
                }
            }
        }
    }

    /// Encrypt and sign an outbound chat message.
    ///
    /// # Errors
    ///
    /// `NotReady` before the handshake completes, `Crypto` if signing fails.
    pub fn encrypt_message(&self, text: &str) -> Result<Frame, ClientError> {
        let session_key = self.session_key.as_ref().ok_or(ClientError::NotReady)?;
        let ciphertext = encrypt(session_key, text.as_bytes());
        let signature = self.signing.sign(text.as_bytes())?;
        Ok(Frame::data(&Envelope::signed(ciphertext, signature).serialize()))
    }

    fn on_ack(&mut self, payload: &str) -> Result<Vec<ClientStep>, ClientError> {
        match payload {
            wire::SEND_EXCHANGE_KEY | wire::LOGIN_OK | wire::REGISTER_OK => {
                let key_wire = self.exchange.public_key_wire()?;
                self.phase = Phase::AwaitSigningPrompt;
                Ok(vec![ClientStep::Send(Frame::data(&key_wire))])
            }
            wire::LOGIN_FAIL | wire::REGISTER_FAIL | wire::REGISTER_FAIL_USERNAME_EXISTS => {
                Ok(vec![ClientStep::AuthFailed(payload.to_string())])
            }
            other => Err(ClientError::HandshakeFailed(format!("unexpected reply: {other}"))),
        }
    }

    fn on_signing_prompt(&mut self, payload: &str) -> Result<Vec<ClientStep>, ClientError> {
        if payload != wire::SEND_SIGNING_KEY {
            return Err(ClientError::HandshakeFailed(format!("unexpected reply: {payload}")));
        }
        let key_wire = self.signing.public_key_wire()?;
        self.phase = Phase::AwaitSessionKey;
        Ok(vec![ClientStep::Send(Frame::data(&key_wire))])
    }

    fn on_session_key(&mut self, payload: &str) -> Result<Vec<ClientStep>, ClientError> {
        let delivery = SessionKeyDelivery::parse(payload)
            .map_err(|e| ClientError::HandshakeFailed(format!("bad key delivery: {e}")))?;
        let session_key =
            self.exchange.unwrap_session_key(&delivery.encrypted_key, &delivery.encrypted_iv)?;

        self.session_key = Some(session_key);
        self.phase = Phase::Ready;
        Ok(vec![ClientStep::SessionReady])
    }

    /// Chat envelope after the handshake. Undecipherable payloads are
    /// dropped, never fatal.
    fn on_chat(&self, payload: &str) -> Vec<ClientStep> {
        let Some(session_key) = self.session_key.as_ref() else {
            return Vec::new();
        };
        match open_envelope(session_key, payload) {
            Some((text, verified)) => vec![ClientStep::Message { text, verified }],
            None => Vec::new(),
        }
    }
}

/// Decrypt an inbound chat envelope under the session key.
///
/// Returns the message text and whether a signature was attached. `None`
/// (with a log line) for anything malformed or undecipherable; inbound chat
/// failures are dropped, never fatal.
#[must_use]
pub fn open_envelope(session_key: &SessionKey, payload: &str) -> Option<(String, bool)> {
    let envelope = match Envelope::parse(payload) {
        Ok(envelope) => envelope,
        Err(e) => {
            tracing::warn!("dropping malformed envelope: {}", e);
            return None;
        }
    };

    let plaintext = match decrypt(session_key, &envelope.ciphertext) {
        Ok(plaintext) => plaintext,
        Err(e) => {
            tracing::warn!("dropping undecipherable message: {}", e);
            return None;
        }
    };

    let Ok(text) = String::from_utf8(plaintext) else {
        tracing::warn!("dropping non-UTF-8 message");
        return None;
    };

    Some((text, envelope.signature.is_some()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use privchat_crypto::ExchangePublicKey;

    use super::*;

    fn client() -> Client {
        Client::new(Auth::Username("alice".to_string()), &mut rand::thread_rng()).unwrap()
    }

    /// Drive the handshake from the server side, returning the session key
    /// the "server" generated.
    fn complete_handshake(client: &mut Client) -> SessionKey {
        let mut rng = rand::thread_rng();

        let steps = client.handle_frame(&Frame::data(wire::SEND_EXCHANGE_KEY)).unwrap();
        let ClientStep::Send(exchange_frame) = &steps[0] else {
            panic!("expected exchange key send");
        };
        let exchange_key =
            ExchangePublicKey::from_wire(exchange_frame.payload_str().unwrap()).unwrap();

        let steps = client.handle_frame(&Frame::data(wire::SEND_SIGNING_KEY)).unwrap();
        assert!(matches!(steps[0], ClientStep::Send(_)));

        let session_key = SessionKey::generate(&mut rng);
        let (encrypted_key, encrypted_iv) =
            exchange_key.wrap_session_key(&mut rng, &session_key).unwrap();
        let delivery = SessionKeyDelivery { encrypted_key, encrypted_iv };

        let steps = client.handle_frame(&Frame::data(&delivery.serialize())).unwrap();
        assert!(matches!(steps[0], ClientStep::SessionReady));
        session_key
    }

    #[test]
    fn hello_frames_carry_auth_line() {
        let client = client();
        let frames = client.hello_frames();
        assert_eq!(frames[0], Frame::hello());
        assert_eq!(frames[1].payload_str().unwrap(), "alice");

        let login = Client::new(
            Auth::Login { username: "a".to_string(), password: "b".to_string() },
            &mut rand::thread_rng(),
        )
        .unwrap();
        assert_eq!(login.hello_frames()[1].payload_str().unwrap(), "LOGIN|a|b");
    }

    #[test]
    fn handshake_recovers_server_session_key() {
        let mut client = client();
        let server_key = complete_handshake(&mut client);

        assert!(client.is_ready());
        assert_eq!(client.session_key(), Some(&server_key));
    }

    #[test]
    fn inbound_message_decrypts_with_verified_flag() {
        let mut client = client();
        let server_key = complete_handshake(&mut client);

        // Signed message (relay forwarded a signature).
        let envelope = Envelope::signed(encrypt(&server_key, b"hi"), vec![1, 2, 3]);
        let steps = client.handle_frame(&Frame::data(&envelope.serialize())).unwrap();
        assert!(
            matches!(&steps[0], ClientStep::Message { text, verified: true } if text == "hi")
        );

        // Unsigned notification.
        let envelope = Envelope::unsigned(encrypt(&server_key, b"bob joined the chat"));
        let steps = client.handle_frame(&Frame::data(&envelope.serialize())).unwrap();
        assert!(matches!(&steps[0], ClientStep::Message { verified: false, .. }));
    }

    #[test]
    fn undecipherable_message_is_dropped() {
        let mut client = client();
        complete_handshake(&mut client);

        let other_key = SessionKey::generate(&mut rand::thread_rng());
        let envelope = Envelope::unsigned(encrypt(&other_key, b"wrong key"));
        let steps = client.handle_frame(&Frame::data(&envelope.serialize())).unwrap();
        assert!(steps.is_empty());
    }

    #[test]
    fn session_key_accepted_exactly_once() {
        let mut client = client();
        let first_key = complete_handshake(&mut client);

        // A second delivery arrives after the phase advanced, so it is
        // handled as (malformed) chat and dropped; the key never changes.
        let mut rng = rand::thread_rng();
        let replacement = SessionKey::generate(&mut rng);
        let exchange_key = ExchangePublicKey::from_wire(
            &Client::new(Auth::Username("x".to_string()), &mut rng)
                .unwrap()
                .exchange
                .public_key_wire()
                .unwrap(),
        )
        .unwrap();
        let (encrypted_key, encrypted_iv) =
            exchange_key.wrap_session_key(&mut rng, &replacement).unwrap();
        let delivery = SessionKeyDelivery { encrypted_key, encrypted_iv };

        let steps = client.handle_frame(&Frame::data(&delivery.serialize())).unwrap();
        assert!(steps.is_empty());
        assert_eq!(client.session_key(), Some(&first_key));
    }

    #[test]
    fn encrypt_before_ready_fails() {
        let client = client();
        assert!(matches!(client.encrypt_message("hi"), Err(ClientError::NotReady)));
    }

    #[test]
    fn auth_failure_is_retriable() {
        let mut client = client();

        let steps = client.handle_frame(&Frame::data(wire::LOGIN_FAIL)).unwrap();
        assert!(matches!(&steps[0], ClientStep::AuthFailed(reply) if reply == wire::LOGIN_FAIL));

        // Still at the auth stage: a new attempt is allowed and the prompt
        // then advances the handshake.
        client.authenticate(Auth::Username("alice2".to_string())).unwrap();
        let steps = client.handle_frame(&Frame::data(wire::SEND_EXCHANGE_KEY)).unwrap();
        assert!(matches!(steps[0], ClientStep::Send(_)));
    }

    #[test]
    fn unexpected_reply_fails_handshake() {
        let mut client = client();
        let result = client.handle_frame(&Frame::data("SOMETHING_ELSE"));
        assert!(matches!(result, Err(ClientError::HandshakeFailed(_))));
    }

    #[test]
    fn eot_reports_disconnect() {
        let mut client = client();
        assert!(matches!(client.handle_frame(&Frame::eot()), Err(ClientError::Disconnected)));
    }
}
