//! Privchat client library.
//!
//! Two layers:
//!
//! - [`Client`]: sans-IO protocol machine. Feed it inbound frames, get back
//!   frames to send and application events. Testable without a socket.
//! - [`connect`]/[`ConnectedClient`]: Tokio TCP transport around the
//!   machine. [`connect`] completes the handshake before returning; the
//!   returned handle sends messages and yields [`ChatEvent`]s.
//!
//! ```no_run
//! use privchat_client::{Auth, ChatEvent, connect};
//!
//! # async fn run() -> Result<(), privchat_client::ClientError> {
//! let mut client = connect("127.0.0.1:12345", Auth::Username("alice".into())).await?;
//! client.send_message("hello").await?;
//! while let Some(event) = client.next_event().await {
//!     if let ChatEvent::Message { text, verified } = event {
//!         println!("{text} (verified: {verified})");
//!     }
//! }
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod client;
mod error;
mod transport;

pub use client::{Auth, Client, ClientStep, open_envelope};
pub use error::ClientError;
pub use transport::{ChatEvent, ConnectedClient, connect};
