//! End-to-end relay tests over real TCP.
//!
//! These tests start an actual server, connect real clients through the
//! public client library, and verify that messages relay with per-recipient
//! re-encryption and forwarded signatures.

use std::time::Duration;

use privchat_client::{Auth, ChatEvent, ClientError, ConnectedClient, connect};
use privchat_server::{MemoryCredentialStore, Server, ServerRuntimeConfig};
use tokio::time::timeout;

/// Start a real server on an ephemeral port and return its address.
async fn start_server() -> String {
    let config = ServerRuntimeConfig {
        bind_address: "127.0.0.1:0".to_string(),
        ..ServerRuntimeConfig::default()
    };
    let server = Server::bind(config, MemoryCredentialStore::new()).await.unwrap();
    let addr = server.local_addr().unwrap().to_string();

    tokio::spawn(async move {
        let _ = server.run().await;
    });

    addr
}

/// Wait until the client receives a message with exactly this text.
///
/// Join/leave notifications may interleave with chat traffic, so events that
/// do not match are skipped.
async fn wait_for_message(client: &mut ConnectedClient, expected: &str) -> Option<bool> {
    timeout(Duration::from_secs(10), async {
        while let Some(event) = client.next_event().await {
            if let ChatEvent::Message { text, verified } = event {
                if text == expected {
                    return Some(verified);
                }
            }
        }
        None
    })
    .await
    .unwrap_or(None)
}

#[tokio::test]
async fn client_completes_handshake() {
    let addr = start_server().await;

    let client = connect(&addr, Auth::Username("alice".to_string())).await.unwrap();
    assert_eq!(client.username(), "alice");

    client.shutdown().await.unwrap();
}

#[tokio::test]
async fn message_relays_with_forwarded_signature() {
    let addr = start_server().await;

    let mut alice = connect(&addr, Auth::Username("alice".to_string())).await.unwrap();
    let mut bob = connect(&addr, Auth::Username("bob".to_string())).await.unwrap();

    bob.send_message("hi").await.unwrap();

    // The relayed message carries the sender's signature.
    assert_eq!(wait_for_message(&mut alice, "hi").await, Some(true));

    bob.shutdown().await.unwrap();
    alice.shutdown().await.unwrap();
}

#[tokio::test]
async fn sender_does_not_receive_own_message() {
    let addr = start_server().await;

    let mut alice = connect(&addr, Auth::Username("alice".to_string())).await.unwrap();
    let mut bob = connect(&addr, Auth::Username("bob".to_string())).await.unwrap();

    bob.send_message("only for alice").await.unwrap();
    assert_eq!(wait_for_message(&mut alice, "only for alice").await, Some(true));

    // Bob sees nothing for his own message; a short window is enough since
    // alice already received hers.
    let echoed = timeout(Duration::from_millis(200), bob.next_event()).await;
    match echoed {
        Err(_) => {}
        Ok(Some(ChatEvent::Message { text, .. })) => {
            assert_ne!(text, "only for alice");
        }
        Ok(other) => panic!("unexpected event: {other:?}"),
    }
}

#[tokio::test]
async fn broadcast_reaches_every_other_client() {
    let addr = start_server().await;

    let mut alice = connect(&addr, Auth::Username("alice".to_string())).await.unwrap();
    let mut bob = connect(&addr, Auth::Username("bob".to_string())).await.unwrap();
    let mut carol = connect(&addr, Auth::Username("carol".to_string())).await.unwrap();

    alice.send_message("hello everyone").await.unwrap();

    assert_eq!(wait_for_message(&mut bob, "hello everyone").await, Some(true));
    assert_eq!(wait_for_message(&mut carol, "hello everyone").await, Some(true));
}

#[tokio::test]
async fn join_and_leave_notifications_are_unverified() {
    let addr = start_server().await;

    let mut alice = connect(&addr, Auth::Username("alice".to_string())).await.unwrap();
    let bob = connect(&addr, Auth::Username("bob".to_string())).await.unwrap();

    assert_eq!(wait_for_message(&mut alice, "bob joined the chat").await, Some(false));

    bob.shutdown().await.unwrap();
    assert_eq!(wait_for_message(&mut alice, "bob left the chat").await, Some(false));
}

#[tokio::test]
async fn duplicate_username_cannot_connect() {
    let addr = start_server().await;

    let _alice = connect(&addr, Auth::Username("alice".to_string())).await.unwrap();

    // The server closes the second connection during its handshake.
    let result = connect(&addr, Auth::Username("alice".to_string())).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn freed_username_is_reusable_after_disconnect() {
    let addr = start_server().await;

    let alice = connect(&addr, Auth::Username("alice".to_string())).await.unwrap();
    alice.shutdown().await.unwrap();

    // Teardown is asynchronous; retry until the name frees up.
    let mut reconnected = None;
    for _ in 0..50 {
        match connect(&addr, Auth::Username("alice".to_string())).await {
            Ok(client) => {
                reconnected = Some(client);
                break;
            }
            Err(_) => tokio::time::sleep(Duration::from_millis(50)).await,
        }
    }
    assert!(reconnected.is_some(), "username should free up after disconnect");
}

#[tokio::test]
async fn register_login_round_trip() {
    let addr = start_server().await;

    let carol = connect(
        &addr,
        Auth::Register { username: "carol".to_string(), password: "hunter2".to_string() },
    )
    .await
    .unwrap();

    // A second registration for the same account is rejected.
    let result = connect(
        &addr,
        Auth::Register { username: "carol".to_string(), password: "other".to_string() },
    )
    .await;
    assert!(matches!(result, Err(ClientError::AuthFailed(_))));

    // Wrong password is rejected.
    let result = connect(
        &addr,
        Auth::Login { username: "carol".to_string(), password: "wrong".to_string() },
    )
    .await;
    assert!(matches!(result, Err(ClientError::AuthFailed(_))));

    // Free the username, then log in with the right password.
    carol.shutdown().await.unwrap();
    let mut logged_in = None;
    for _ in 0..50 {
        match connect(
            &addr,
            Auth::Login { username: "carol".to_string(), password: "hunter2".to_string() },
        )
        .await
        {
            Ok(client) => {
                logged_in = Some(client);
                break;
            }
            Err(ClientError::AuthFailed(reply)) => panic!("login rejected: {reply}"),
            Err(_) => tokio::time::sleep(Duration::from_millis(50)).await,
        }
    }
    assert!(logged_in.is_some());
}

#[tokio::test]
async fn abrupt_disconnect_does_not_stall_relay() {
    let addr = start_server().await;

    let mut alice = connect(&addr, Auth::Username("alice".to_string())).await.unwrap();
    let mut bob = connect(&addr, Auth::Username("bob".to_string())).await.unwrap();
    let carol = connect(&addr, Auth::Username("carol".to_string())).await.unwrap();

    // Carol's socket closes without an end-of-transmission frame.
    drop(carol);

    bob.send_message("still flowing").await.unwrap();
    assert_eq!(wait_for_message(&mut alice, "still flowing").await, Some(true));
}
