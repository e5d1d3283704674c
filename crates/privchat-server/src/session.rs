//! Session store: negotiated key material for connected users.
//!
//! Maintains bidirectional mappings: username to session (for relay lookups)
//! and connection ID to username (for teardown). Registration is an atomic
//! check-and-insert; last-registered-wins is explicitly disallowed. Broadcast
//! recipients are handed out as an owned snapshot so no lock is ever held
//! across network I/O on the entries.
//!
//! The store itself is a plain struct; the relay driver that owns it sits
//! behind a single mutex, which is the store-wide mutual-exclusion
//! discipline. Nothing exposes the underlying map for iterate-while-locked
//! use.

use std::collections::HashMap;

use privchat_crypto::{ExchangePublicKey, SessionKey, SigningPublicKey};

use crate::error::ServerError;

/// One connected user's negotiated state.
///
/// Created when a username is established, populated field by field as
/// handshake steps succeed. Each key field is set once and never overwritten
/// while the session is live.
#[derive(Debug)]
pub struct PeerSession {
    /// Connection the session is bound to.
    pub conn_id: u64,
    /// Client's public key for session-key wrapping. Never encrypts chat
    /// content.
    pub exchange_key: Option<ExchangePublicKey>,
    /// Client's public key for verifying message signatures.
    pub signing_key: Option<SigningPublicKey>,
    /// Server-generated symmetric key + IV. Present only once the handshake
    /// completed; dropped (and zeroized) at disconnect.
    pub session_key: Option<SessionKey>,
}

impl PeerSession {
    /// New session bound to a connection, no key material yet.
    #[must_use]
    pub fn new(conn_id: u64) -> Self {
        Self { conn_id, exchange_key: None, signing_key: None, session_key: None }
    }

    /// Handshake completed: the session key exists and chat may flow.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.session_key.is_some()
    }
}

/// A broadcast recipient captured by [`SessionStore::ready_recipients`].
///
/// Owned copies only: the snapshot stays valid after the store lock is
/// released, so delivery I/O never runs under the lock.
#[derive(Debug, Clone)]
pub struct Recipient {
    /// Recipient's username.
    pub username: String,
    /// Recipient's connection.
    pub conn_id: u64,
    /// Recipient's own session key (for per-recipient re-encryption).
    pub session_key: SessionKey,
}

/// In-memory registry of live sessions.
#[derive(Debug, Default)]
pub struct SessionStore {
    /// Username → session.
    sessions: HashMap<String, PeerSession>,
    /// Connection ID → username (reverse index for cleanup).
    usernames: HashMap<u64, String>,
}

impl SessionStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a username for a connection (atomic check-and-insert).
    ///
    /// # Errors
    ///
    /// `DuplicateUsername` if the name is held by a live session. The
    /// existing session is left untouched.
    pub fn register(&mut self, username: &str, session: PeerSession) -> Result<(), ServerError> {
        if self.sessions.contains_key(username) {
            return Err(ServerError::DuplicateUsername(username.to_string()));
        }

        self.usernames.insert(session.conn_id, username.to_string());
        self.sessions.insert(username.to_string(), session);
        Ok(())
    }

    /// Session for a username, if registered.
    pub fn lookup(&self, username: &str) -> Option<&PeerSession> {
        self.sessions.get(username)
    }

    /// Mutable session for a username, if registered.
    pub fn lookup_mut(&mut self, username: &str) -> Option<&mut PeerSession> {
        self.sessions.get_mut(username)
    }

    /// Username established by a connection, if any.
    pub fn username_for(&self, conn_id: u64) -> Option<&str> {
        self.usernames.get(&conn_id).map(String::as_str)
    }

    /// Remove a session by username. The returned session owns the key
    /// material; dropping it zeroizes the session key.
    pub fn remove(&mut self, username: &str) -> Option<PeerSession> {
        let session = self.sessions.remove(username)?;
        self.usernames.remove(&session.conn_id);
        Some(session)
    }

    /// Remove whatever session a closing connection had established.
    pub fn remove_connection(&mut self, conn_id: u64) -> Option<(String, PeerSession)> {
        let username = self.usernames.remove(&conn_id)?;
        let session = self.sessions.remove(&username)?;
        Some((username, session))
    }

    /// Snapshot of all ready sessions except `excluding`, in stable
    /// (sorted-by-username) order.
    ///
    /// Owned copies taken while the caller holds the store; the caller must
    /// release its lock before attempting I/O on the entries.
    #[must_use]
    pub fn ready_recipients(&self, excluding: &str) -> Vec<Recipient> {
        let mut recipients: Vec<Recipient> = self
            .sessions
            .iter()
            .filter(|(username, session)| username.as_str() != excluding && session.is_ready())
            .filter_map(|(username, session)| {
                session.session_key.clone().map(|session_key| Recipient {
                    username: username.clone(),
                    conn_id: session.conn_id,
                    session_key,
                })
            })
            .collect();

        recipients.sort_by(|a, b| a.username.cmp(&b.username));
        recipients
    }

    /// Number of registered sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// `true` if no session is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
