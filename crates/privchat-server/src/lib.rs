//! Privchat relay server.
//!
//! # Architecture
//!
//! The protocol logic lives in [`RelayDriver`], a pure event-to-action state
//! machine with no I/O of its own. This crate wraps it with a Tokio TCP
//! runtime: one reader task and one writer task per connection, a single
//! mutex around the driver, and an action executor that runs only after the
//! driver lock is released. Network writes therefore never happen under the
//! lock, and a slow client can only stall its own writer task.
//!
//! # Components
//!
//! - [`RelayDriver`]: event-to-action protocol core (handshake, relay)
//! - [`SessionStore`]: username and key-material registry
//! - [`CredentialStore`]: account backend trait (+ in-memory impl)
//! - [`Server`]: TCP runtime executing driver actions
//!
//! # Shutdown
//!
//! Connection teardown is cooperative: each connection carries a watch
//! channel, and a `CloseConnection` action flips it. The reader task observes
//! the flip at its next `select!`, drains out, and runs ordinary teardown, so
//! a close initiated by protocol logic and a close initiated by the peer take
//! the same path.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod credentials;
mod driver;
mod error;
mod handshake;
mod session;

use std::{collections::HashMap, net::SocketAddr, sync::Arc, time::Duration};

pub use credentials::{AccountError, CredentialStore, MemoryCredentialStore};
pub use driver::{
    DEFAULT_MAX_CONNECTIONS, LogLevel, RelayConfig, RelayDriver, ServerAction, ServerEvent,
};
pub use error::ServerError;
pub use handshake::{HandshakeMachine, HandshakeStep};
use privchat_proto::{Frame, ProtocolError, codec};
pub use session::{PeerSession, Recipient, SessionStore};
use tokio::{
    net::{TcpListener, TcpStream},
    sync::{Mutex, RwLock, mpsc, watch},
};

/// How long to wait for a connection's writer task to drain at teardown.
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Outbound frames queued per connection before the peer counts as slow.
///
/// A peer that stops reading fills its queue; further frames to it are
/// dropped so its backlog stays bounded and never blocks the executor.
const WRITER_QUEUE_CAPACITY: usize = 256;

/// Shared per-connection runtime handles.
///
/// Writers are mpsc senders feeding each connection's writer task; shutdowns
/// are watch senders the executor flips to request cooperative teardown.
struct SharedState {
    writers: RwLock<HashMap<u64, mpsc::Sender<Frame>>>,
    shutdowns: RwLock<HashMap<u64, watch::Sender<bool>>>,
}

/// Server configuration for the production runtime.
#[derive(Debug, Clone)]
pub struct ServerRuntimeConfig {
    /// Address to bind to (e.g. "0.0.0.0:12345").
    pub bind_address: String,
    /// Idle timeout: a connection with no inbound frame for this long is
    /// closed.
    pub idle_timeout: Duration,
    /// Driver configuration (connection limits).
    pub driver: RelayConfig,
}

impl Default for ServerRuntimeConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:12345".to_string(),
            idle_timeout: Duration::from_secs(300),
            driver: RelayConfig::default(),
        }
    }
}

/// Production privchat server.
///
/// Wraps [`RelayDriver`] with a Tokio TCP accept loop.
pub struct Server<C: CredentialStore + 'static> {
    listener: TcpListener,
    driver: Arc<Mutex<RelayDriver<C>>>,
    idle_timeout: Duration,
}

impl<C: CredentialStore + 'static> Server<C> {
    /// Bind the listener and build the runtime around a credential backend.
    ///
    /// # Errors
    ///
    /// `ServerError::Io` if the address cannot be bound.
    pub async fn bind(config: ServerRuntimeConfig, credentials: C) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(&config.bind_address).await?;
        let driver = Arc::new(Mutex::new(RelayDriver::new(config.driver, credentials)));

        tracing::info!("TCP transport bound to {}", config.bind_address);

        Ok(Self { listener, driver, idle_timeout: config.idle_timeout })
    }

    /// Local address the server is bound to.
    ///
    /// # Errors
    ///
    /// `ServerError::Io` if the socket address cannot be read.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    /// Run the server, accepting connections until the process is stopped.
    ///
    /// # Errors
    ///
    /// `ServerError::Io` if the accept loop fails fatally.
    pub async fn run(self) -> Result<(), ServerError> {
        let shared = Arc::new(SharedState {
            writers: RwLock::new(HashMap::new()),
            shutdowns: RwLock::new(HashMap::new()),
        });

        let mut next_conn_id: u64 = 1;

        loop {
            match self.listener.accept().await {
                Ok((stream, peer_addr)) => {
                    let conn_id = next_conn_id;
                    next_conn_id += 1;

                    let driver = Arc::clone(&self.driver);
                    let shared = Arc::clone(&shared);
                    let idle_timeout = self.idle_timeout;

                    tokio::spawn(async move {
                        tracing::debug!("conn {} from {}", conn_id, peer_addr);
                        if let Err(e) =
                            handle_connection(conn_id, stream, driver, shared, idle_timeout).await
                        {
                            tracing::warn!("conn {} error: {}", conn_id, e);
                        }
                    });
                }
                Err(e) => {
                    tracing::error!("accept error: {}", e);
                }
            }
        }
    }
}

/// Handle one TCP connection from accept to teardown.
async fn handle_connection<C: CredentialStore + 'static>(
    conn_id: u64,
    stream: TcpStream,
    driver: Arc<Mutex<RelayDriver<C>>>,
    shared: Arc<SharedState>,
    idle_timeout: Duration,
) -> Result<(), ServerError> {
    let (mut reader, mut writer) = stream.into_split();

    let (frame_tx, mut frame_rx) = mpsc::channel::<Frame>(WRITER_QUEUE_CAPACITY);
    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

    {
        let mut writers = shared.writers.write().await;
        writers.insert(conn_id, frame_tx);
    }
    {
        let mut shutdowns = shared.shutdowns.write().await;
        shutdowns.insert(conn_id, shutdown_tx);
    }

    // All outbound frames for this connection go through one writer task, so
    // frames written from different events never interleave on the socket.
    let writer_task = tokio::spawn(async move {
        while let Some(frame) = frame_rx.recv().await {
            if let Err(e) = codec::write_frame(&mut writer, &frame).await {
                tracing::debug!("conn {} write error: {}", conn_id, e);
                break;
            }
        }
    });

    {
        let actions = {
            let mut driver = driver.lock().await;
            driver.process_event(ServerEvent::ConnectionAccepted { conn_id })?
        };
        execute_actions(actions, &shared).await;
    }

    // Driver errors inside the loop break out rather than return, so the
    // teardown below always runs and the shared maps stay consistent.
    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => {
                tracing::debug!("conn {} shutdown requested", conn_id);
                break;
            }
            read = tokio::time::timeout(idle_timeout, codec::read_frame(&mut reader)) => {
                let frame = match read {
                    Err(_) => {
                        tracing::info!("conn {} idle timeout", conn_id);
                        break;
                    }
                    Ok(Err(ProtocolError::ConnectionClosed)) => break,
                    Ok(Err(e)) => {
                        tracing::warn!("conn {} framing error: {}", conn_id, e);
                        break;
                    }
                    Ok(Ok(frame)) => frame,
                };

                let actions = {
                    let mut driver = driver.lock().await;
                    match driver.process_event(ServerEvent::FrameReceived { conn_id, frame }) {
                        Ok(actions) => actions,
                        Err(e) => {
                            tracing::error!("conn {} driver error: {}", conn_id, e);
                            break;
                        }
                    }
                };
                execute_actions(actions, &shared).await;
            }
        }
    }

    // Teardown: drop our writer handle first so the writer task drains and
    // exits, then tell the driver the connection is gone.
    {
        let mut writers = shared.writers.write().await;
        writers.remove(&conn_id);
    }
    {
        let mut shutdowns = shared.shutdowns.write().await;
        shutdowns.remove(&conn_id);
    }

    if tokio::time::timeout(WRITER_DRAIN_TIMEOUT, writer_task).await.is_err() {
        tracing::warn!("conn {} writer did not drain in time", conn_id);
    }

    let actions = {
        let mut driver = driver.lock().await;
        driver.process_event(ServerEvent::ConnectionClosed { conn_id })?
    };
    execute_actions(actions, &shared).await;

    Ok(())
}

/// Execute driver actions against the shared runtime state.
///
/// Must be called without the driver lock held.
async fn execute_actions(actions: Vec<ServerAction>, shared: &SharedState) {
    for action in actions {
        match action {
            ServerAction::SendFrame { conn_id, frame } => {
                let writers = shared.writers.read().await;
                match writers.get(&conn_id) {
                    Some(sender) => match sender.try_send(frame) {
                        Ok(()) => {}
                        Err(mpsc::error::TrySendError::Full(_)) => {
                            // Slow peer with a full queue: drop the frame
                            // rather than block the executor for everyone.
                            tracing::warn!("conn {} queue full, dropping frame", conn_id);
                        }
                        Err(mpsc::error::TrySendError::Closed(_)) => {
                            // The connection is tearing down; its own
                            // teardown path handles cleanup.
                            tracing::debug!("send to closing conn {}", conn_id);
                        }
                    },
                    None => {
                        tracing::debug!("send to unknown conn {}", conn_id);
                    }
                }
            }

            ServerAction::CloseConnection { conn_id, reason } => {
                tracing::info!("closing conn {}: {}", conn_id, reason);
                let shutdowns = shared.shutdowns.read().await;
                if let Some(sender) = shutdowns.get(&conn_id) {
                    // Receiver dropped means the connection already exited.
                    let _ = sender.send(true);
                }
            }

            ServerAction::Log { level, message } => match level {
                LogLevel::Debug => tracing::debug!("{}", message),
                LogLevel::Info => tracing::info!("{}", message),
                LogLevel::Warn => tracing::warn!("{}", message),
            },
        }
    }
}
