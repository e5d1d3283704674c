//! Relay driver: pure event-to-action protocol logic.
//!
//! The driver owns every piece of shared protocol state (handshake machines,
//! session store, credential store) and is driven by [`ServerEvent`]s from
//! the transport runtime. It performs no I/O itself: each event produces a
//! list of [`ServerAction`]s for the runtime to execute after releasing the
//! driver lock, so no network write ever happens under the lock.
//!
//! Error discipline: failures scoped to one connection (handshake violation,
//! duplicate username, oversized frame) become `CloseConnection` plus `Log`
//! actions for that connection only. A `ServerError` return means driver
//! bookkeeping is inconsistent, which the runtime treats as a bug.

use std::collections::HashMap;

use privchat_crypto::encrypt;
use privchat_proto::{CmdType, Envelope, Frame};
use rand::rngs::OsRng;

use crate::credentials::CredentialStore;
use crate::error::ServerError;
use crate::handshake::{HandshakeMachine, HandshakeStep};
use crate::session::{Recipient, SessionStore};

/// Default cap on concurrently accepted connections.
pub const DEFAULT_MAX_CONNECTIONS: usize = 256;

/// Driver configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Connections accepted beyond this count are closed immediately.
    pub max_connections: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self { max_connections: DEFAULT_MAX_CONNECTIONS }
    }
}

/// Input to the driver: something happened on the transport.
#[derive(Debug)]
pub enum ServerEvent {
    /// A TCP connection was accepted and assigned an ID.
    ConnectionAccepted {
        /// Runtime-assigned connection ID.
        conn_id: u64,
    },
    /// A complete frame arrived on a connection.
    FrameReceived {
        /// Source connection.
        conn_id: u64,
        /// The reassembled frame.
        frame: Frame,
    },
    /// A connection is gone (graceful or abrupt); runtime teardown started.
    ConnectionClosed {
        /// The closed connection.
        conn_id: u64,
    },
}

/// Log severity carried in a [`ServerAction::Log`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Diagnostic detail.
    Debug,
    /// Normal lifecycle events.
    Info,
    /// Dropped messages and rejected connections.
    Warn,
}

/// Output of the driver: work for the transport runtime.
#[derive(Debug)]
pub enum ServerAction {
    /// Write a frame to a connection.
    SendFrame {
        /// Destination connection.
        conn_id: u64,
        /// Frame to write.
        frame: Frame,
    },
    /// Close a connection.
    CloseConnection {
        /// Connection to close.
        conn_id: u64,
        /// Human-readable reason, for the log.
        reason: String,
    },
    /// Emit a log line.
    Log {
        /// Severity.
        level: LogLevel,
        /// Message text.
        message: String,
    },
}

/// The protocol core. One instance per server, behind the runtime's mutex.
pub struct RelayDriver<C: CredentialStore> {
    config: RelayConfig,
    connections: HashMap<u64, HandshakeMachine>,
    store: SessionStore,
    credentials: C,
}

impl<C: CredentialStore> RelayDriver<C> {
    /// Create a driver with the given configuration and credential backend.
    pub fn new(config: RelayConfig, credentials: C) -> Self {
        Self { config, connections: HashMap::new(), store: SessionStore::new(), credentials }
    }

    /// Number of tracked connections.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Process one transport event into a list of actions.
    ///
    /// # Errors
    ///
    /// Only for driver bookkeeping inconsistencies (an event for a connection
    /// the driver never saw). Per-connection protocol failures are expressed
    /// as `CloseConnection` actions, never as errors.
    pub fn process_event(&mut self, event: ServerEvent) -> Result<Vec<ServerAction>, ServerError> {
        match event {
            ServerEvent::ConnectionAccepted { conn_id } => Ok(self.on_accepted(conn_id)),
            ServerEvent::FrameReceived { conn_id, frame } => self.on_frame(conn_id, frame),
            ServerEvent::ConnectionClosed { conn_id } => Ok(self.on_closed(conn_id)),
        }
    }

    fn on_accepted(&mut self, conn_id: u64) -> Vec<ServerAction> {
        if self.connections.len() >= self.config.max_connections {
            return vec![
                ServerAction::Log {
                    level: LogLevel::Warn,
                    message: format!(
                        "rejecting conn {conn_id}: at capacity ({})",
                        self.config.max_connections
                    ),
                },
                ServerAction::CloseConnection { conn_id, reason: "server full".to_string() },
            ];
        }

        self.connections.insert(conn_id, HandshakeMachine::new(conn_id));
        vec![ServerAction::Log {
            level: LogLevel::Debug,
            message: format!("conn {conn_id} accepted"),
        }]
    }

    fn on_frame(&mut self, conn_id: u64, frame: Frame) -> Result<Vec<ServerAction>, ServerError> {
        // A capacity-rejected connection can still race a frame in before its
        // close lands. Not a server bug, so close again quietly.
        if !self.connections.contains_key(&conn_id) {
            return Ok(vec![
                ServerAction::Log {
                    level: LogLevel::Debug,
                    message: format!("frame from unadmitted conn {conn_id}"),
                },
                ServerAction::CloseConnection {
                    conn_id,
                    reason: "connection not admitted".to_string(),
                },
            ]);
        }

        match frame.cmd {
            CmdType::Hello => Ok(vec![ServerAction::Log {
                level: LogLevel::Debug,
                message: format!("conn {conn_id} hello"),
            }]),
            CmdType::Eot => Ok(vec![ServerAction::CloseConnection {
                conn_id,
                reason: "end of transmission".to_string(),
            }]),
            CmdType::Data => self.on_data(conn_id, &frame),
        }
    }

    fn on_data(&mut self, conn_id: u64, frame: &Frame) -> Result<Vec<ServerAction>, ServerError> {
        let payload = match frame.payload_str() {
            Ok(payload) => payload.to_string(),
            Err(e) => return Ok(fail_connection(conn_id, &ServerError::Framing(e))),
        };

        let Some(machine) = self.connections.get_mut(&conn_id) else {
            return Err(ServerError::UnknownConnection(conn_id));
        };

        let mut rng = OsRng;
        let result = machine.process(&payload, &mut self.store, &mut self.credentials, &mut rng);
        let username = machine.username().map(ToOwned::to_owned);

        match result {
            Ok(HandshakeStep::Reply(reply)) => {
                Ok(vec![ServerAction::SendFrame { conn_id, frame: Frame::data(&reply) }])
            }
            Ok(HandshakeStep::Complete { reply }) => {
                let username = username.ok_or(ServerError::UnknownConnection(conn_id))?;
                let mut actions = vec![
                    ServerAction::SendFrame { conn_id, frame: Frame::data(&reply) },
                    ServerAction::Log {
                        level: LogLevel::Info,
                        message: format!("{username} joined (conn {conn_id})"),
                    },
                ];
                actions.extend(self.notify_peers(&username, &format!("{username} joined the chat")));
                Ok(actions)
            }
            Ok(HandshakeStep::Chat(envelope_text)) => {
                let username = username.ok_or(ServerError::UnknownConnection(conn_id))?;
                Ok(self.relay_chat(&username, &envelope_text))
            }
            Err(e) => Ok(fail_connection(conn_id, &e)),
        }
    }

    fn on_closed(&mut self, conn_id: u64) -> Vec<ServerAction> {
        self.connections.remove(&conn_id);

        let Some((username, session)) = self.store.remove_connection(conn_id) else {
            return vec![ServerAction::Log {
                level: LogLevel::Debug,
                message: format!("conn {conn_id} closed before handshake"),
            }];
        };

        let mut actions = vec![ServerAction::Log {
            level: LogLevel::Info,
            message: format!("{username} left (conn {conn_id})"),
        }];
        if session.is_ready() {
            actions.extend(self.notify_peers(&username, &format!("{username} left the chat")));
        }
        actions
    }

    /// Relay a chat envelope from a ready sender to every other ready user.
    ///
    /// Decrypts under the sender's session key, verifies the signature when
    /// present, then re-encrypts the plaintext for each recipient under that
    /// recipient's own key, forwarding the original signature verbatim.
    /// Undecipherable or unverifiable messages are dropped and logged; the
    /// connection stays open.
    fn relay_chat(&self, sender: &str, envelope_text: &str) -> Vec<ServerAction> {
        let Some(session) = self.store.lookup(sender) else {
            return vec![drop_message(sender, "no session")];
        };
        let (Some(session_key), Some(signing_key)) =
            (session.session_key.as_ref(), session.signing_key.as_ref())
        else {
            return vec![drop_message(sender, "session not ready")];
        };

        let envelope = match Envelope::parse(envelope_text) {
            Ok(envelope) => envelope,
            Err(e) => return vec![drop_message(sender, &format!("malformed envelope: {e}"))],
        };

        let plaintext = match privchat_crypto::decrypt(session_key, &envelope.ciphertext) {
            Ok(plaintext) => plaintext,
            Err(e) => return vec![drop_message(sender, &format!("undecipherable: {e}"))],
        };

        if let Some(signature) = &envelope.signature {
            if let Err(e) = signing_key.verify(&plaintext, signature) {
                return vec![drop_message(sender, &format!("bad signature: {e}"))];
            }
        }

        let recipients = self.store.ready_recipients(sender);
        let mut actions = Vec::with_capacity(recipients.len() + 1);
        for recipient in &recipients {
            actions.push(deliver(recipient, &plaintext, envelope.signature.clone()));
        }
        actions.push(ServerAction::Log {
            level: LogLevel::Info,
            message: format!("relayed message from {sender} to {} recipient(s)", recipients.len()),
        });
        actions
    }

    /// Server-generated notification to every ready user except `excluding`.
    ///
    /// Notifications are unsigned: there is no user key to sign them with,
    /// and clients surface them as unverified.
    fn notify_peers(&self, excluding: &str, text: &str) -> Vec<ServerAction> {
        self.store
            .ready_recipients(excluding)
            .iter()
            .map(|recipient| deliver(recipient, text.as_bytes(), None))
            .collect()
    }
}

/// Re-encrypt a plaintext for one recipient and build the send action.
fn deliver(recipient: &Recipient, plaintext: &[u8], signature: Option<Vec<u8>>) -> ServerAction {
    let ciphertext = encrypt(&recipient.session_key, plaintext);
    let envelope = Envelope { ciphertext, signature };
    ServerAction::SendFrame {
        conn_id: recipient.conn_id,
        frame: Frame::data(&envelope.serialize()),
    }
}

/// Actions for a fatal per-connection failure: log it, close it.
fn fail_connection(conn_id: u64, error: &ServerError) -> Vec<ServerAction> {
    vec![
        ServerAction::Log {
            level: LogLevel::Warn,
            message: format!("closing conn {conn_id}: {error}"),
        },
        ServerAction::CloseConnection { conn_id, reason: error.to_string() },
    ]
}

/// Action for a dropped (not relayed) chat message.
fn drop_message(sender: &str, reason: &str) -> ServerAction {
    ServerAction::Log {
        level: LogLevel::Warn,
        message: format!("dropping message from {sender}: {reason}"),
    }
}
