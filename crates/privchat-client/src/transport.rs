//! TCP transport: drives the sans-IO [`Client`] machine over a real socket.
//!
//! [`connect`] performs the full handshake before returning, so a
//! [`ConnectedClient`] is always ready to send. Inbound traffic is handled
//! by a reader task feeding an event channel; sends go straight out on the
//! write half from the caller's task.

use std::time::Duration;

use privchat_crypto::SessionKey;
use privchat_proto::{CmdType, Frame, codec};
use rand::rngs::OsRng;
use tokio::{
    net::{
        TcpStream,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
    },
    sync::mpsc,
    task::JoinHandle,
};

use crate::client::{Auth, Client, ClientStep, open_envelope};
use crate::error::ClientError;

/// How long to wait for the reader task after a graceful shutdown.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Inbound event on an established connection.
#[derive(Debug)]
pub enum ChatEvent {
    /// A chat message or server notification arrived.
    Message {
        /// Decrypted message text.
        text: String,
        /// A signature was attached; server notifications are unverified.
        verified: bool,
    },
    /// The server closed the connection.
    Disconnected,
}

/// An established, ready-to-chat connection.
pub struct ConnectedClient {
    username: String,
    client: Client,
    writer: OwnedWriteHalf,
    event_rx: mpsc::UnboundedReceiver<ChatEvent>,
    reader_task: JoinHandle<()>,
}

/// Connect and complete the handshake.
///
/// # Errors
///
/// `AuthFailed` if the server rejects the login or registration,
/// `HandshakeFailed`/`Disconnected` if the handshake cannot complete, `Io`
/// for transport failures.
pub async fn connect(addr: &str, auth: Auth) -> Result<ConnectedClient, ClientError> {
    let username = auth.username().to_string();
    let stream = TcpStream::connect(addr).await?;
    let (mut reader, mut writer) = stream.into_split();

    let mut client = Client::new(auth, &mut OsRng)?;
    for frame in client.hello_frames() {
        codec::write_frame(&mut writer, &frame).await?;
    }

    // Drive the machine until the session key is delivered.
    while !client.is_ready() {
        let frame = codec::read_frame(&mut reader).await?;
        for step in client.handle_frame(&frame)? {
            match step {
                ClientStep::Send(frame) => codec::write_frame(&mut writer, &frame).await?,
                ClientStep::SessionReady => {}
                ClientStep::AuthFailed(reply) => return Err(ClientError::AuthFailed(reply)),
                ClientStep::Message { .. } => {}
            }
        }
    }

    let session_key = client.session_key().cloned().ok_or(ClientError::NotReady)?;
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let reader_task = tokio::spawn(read_loop(reader, session_key, event_tx));

    tracing::debug!("session established for {}", username);

    Ok(ConnectedClient { username, client, writer, event_rx, reader_task })
}

impl ConnectedClient {
    /// Username this connection established.
    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Encrypt, sign and send a chat message.
    ///
    /// # Errors
    ///
    /// `Crypto` if signing fails, `Io` if the write fails.
    pub async fn send_message(&mut self, text: &str) -> Result<(), ClientError> {
        let frame = self.client.encrypt_message(text)?;
        codec::write_frame(&mut self.writer, &frame).await?;
        Ok(())
    }

    /// Next inbound event. `None` once the reader task has exited.
    pub async fn next_event(&mut self) -> Option<ChatEvent> {
        self.event_rx.recv().await
    }

    /// Gracefully disconnect: send end-of-transmission and wait for the
    /// reader to observe the close.
    ///
    /// # Errors
    ///
    /// `Io` if the final write fails.
    pub async fn shutdown(mut self) -> Result<(), ClientError> {
        codec::write_frame(&mut self.writer, &Frame::eot()).await?;
        if tokio::time::timeout(SHUTDOWN_TIMEOUT, &mut self.reader_task).await.is_err() {
            self.reader_task.abort();
        }
        Ok(())
    }
}

/// Reader task: decode inbound frames into chat events until the connection
/// closes.
async fn read_loop(
    mut reader: OwnedReadHalf,
    session_key: SessionKey,
    event_tx: mpsc::UnboundedSender<ChatEvent>,
) {
    loop {
        let frame = match codec::read_frame(&mut reader).await {
            Ok(frame) => frame,
            Err(e) => {
                tracing::debug!("connection closed: {}", e);
                let _ = event_tx.send(ChatEvent::Disconnected);
                return;
            }
        };

        match frame.cmd {
            CmdType::Data => {
                let Ok(payload) = frame.payload_str() else {
                    tracing::warn!("dropping non-UTF-8 frame");
                    continue;
                };
                if let Some((text, verified)) = open_envelope(&session_key, payload) {
                    if event_tx.send(ChatEvent::Message { text, verified }).is_err() {
                        return;
                    }
                }
            }
            CmdType::Eot => {
                let _ = event_tx.send(ChatEvent::Disconnected);
                return;
            }
            CmdType::Hello => {}
        }
    }
}
