//! End-to-end tests: a real relay on an ephemeral port driven by
//! tokio-tungstenite clients.

use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use tributary_server::{Config, Registry, Server};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

const WAIT: Duration = Duration::from_secs(5);

struct Relay {
    addr: SocketAddr,
    registry: Arc<Registry>,
    shutdown: Option<oneshot::Sender<()>>,
    handle: JoinHandle<anyhow::Result<()>>,
}

impl Relay {
    async fn start() -> Self {
        Self::start_with(Config::default()).await
    }

    async fn start_with(mut config: Config) -> Self {
        config.server.host = "127.0.0.1".to_string();
        config.server.port = 0;

        let bound = Server::new(config).bind().await.unwrap();
        let addr = bound.local_addr().unwrap();
        let registry = bound.registry().clone();
        let (tx, rx) = oneshot::channel();
        let handle = tokio::spawn(bound.serve(async move {
            let _ = rx.await;
        }));

        Self {
            addr,
            registry,
            shutdown: Some(tx),
            handle,
        }
    }

    async fn connect(&self) -> Client {
        let before = self.registry.len();
        let (ws, _) = connect_async(format!("ws://{}/api/ws", self.addr))
            .await
            .unwrap();
        self.wait_for_members(before + 1).await;
        ws
    }

    async fn wait_for_members(&self, count: usize) {
        tokio::time::timeout(WAIT, async {
            while self.registry.len() != count {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap_or_else(|_| panic!("registry never reached {count} members"));
    }

    async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        tokio::time::timeout(WAIT, self.handle)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
    }
}

async fn send(ws: &mut Client, raw: &str) {
    ws.send(Message::Text(raw.to_string())).await.unwrap();
}

/// Next text frame, skipping control frames. `None` once the server closed.
async fn next_text(ws: &mut Client) -> Option<String> {
    tokio::time::timeout(WAIT, async {
        loop {
            match ws.next().await {
                Some(Ok(Message::Text(text))) => return Some(text),
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
                Some(Ok(_)) | Some(Err(_)) | None => return None,
            }
        }
    })
    .await
    .expect("timed out waiting for a frame")
}

async fn expect_closed(ws: &mut Client) {
    assert_eq!(next_text(ws).await, None, "connection should be closed");
}

#[tokio::test]
async fn test_broadcast_reaches_all_peers_including_sender() {
    let relay = Relay::start().await;
    let mut a = relay.connect().await;
    let mut b = relay.connect().await;
    let mut c = relay.connect().await;

    send(&mut a, r#"{"command":"BROADCAST","message":"hi"}"#).await;

    for ws in [&mut a, &mut b, &mut c] {
        assert_eq!(next_text(ws).await.as_deref(), Some(r#"{"message":"hi"}"#));
    }

    relay.stop().await;
}

#[tokio::test]
async fn test_broadcast_can_exclude_sender() {
    let relay = Relay::start().await;
    let mut a = relay.connect().await;
    let mut b = relay.connect().await;

    send(&mut a, r#"{"command":"BROADCAST","message":"one","excludeSender":true}"#).await;
    send(&mut a, r#"{"command":"BROADCAST","message":"two"}"#).await;

    assert_eq!(next_text(&mut b).await.as_deref(), Some(r#"{"message":"one"}"#));
    assert_eq!(next_text(&mut b).await.as_deref(), Some(r#"{"message":"two"}"#));
    // The sender's first frame is the second broadcast.
    assert_eq!(next_text(&mut a).await.as_deref(), Some(r#"{"message":"two"}"#));

    relay.stop().await;
}

#[tokio::test]
async fn test_exclusive_sender_policy_from_config() {
    let mut config = Config::default();
    config.broadcast.include_sender = false;
    let relay = Relay::start_with(config).await;
    let mut a = relay.connect().await;
    let mut b = relay.connect().await;

    send(&mut a, r#"{"command":"BROADCAST","message":"quiet"}"#).await;
    send(&mut b, r#"{"command":"BROADCAST","message":"reply"}"#).await;

    assert_eq!(next_text(&mut b).await.as_deref(), Some(r#"{"message":"quiet"}"#));
    assert_eq!(next_text(&mut a).await.as_deref(), Some(r#"{"message":"reply"}"#));

    relay.stop().await;
}

#[tokio::test]
async fn test_bare_string_gets_error_and_close() {
    let relay = Relay::start().await;
    let mut ws = relay.connect().await;

    send(&mut ws, r#""not an object""#).await;

    assert_eq!(
        next_text(&mut ws).await.as_deref(),
        Some(r#"{"message":"Message is not a JSON object"}"#)
    );
    expect_closed(&mut ws).await;
    relay.wait_for_members(0).await;

    relay.stop().await;
}

#[tokio::test]
async fn test_missing_command_gets_error_and_close() {
    let relay = Relay::start().await;
    let mut ws = relay.connect().await;

    send(&mut ws, r#"{"message":"hi"}"#).await;

    assert_eq!(
        next_text(&mut ws).await.as_deref(),
        Some(r#"{"message":"Message is lacking a command property"}"#)
    );
    expect_closed(&mut ws).await;

    relay.stop().await;
}

#[tokio::test]
async fn test_unknown_command_gets_error_and_close() {
    let relay = Relay::start().await;
    let mut ws = relay.connect().await;

    send(&mut ws, r#"{"command":"DANCE"}"#).await;

    assert_eq!(
        next_text(&mut ws).await.as_deref(),
        Some(r#"{"message":"Unknown command: DANCE"}"#)
    );
    expect_closed(&mut ws).await;
    relay.wait_for_members(0).await;

    relay.stop().await;
}

#[tokio::test]
async fn test_misbehaving_client_does_not_affect_others() {
    let relay = Relay::start().await;
    let mut good = relay.connect().await;
    let mut bad = relay.connect().await;
    let mut sender = relay.connect().await;

    send(&mut bad, "[1,2,3]").await;
    assert!(next_text(&mut bad).await.is_some());
    expect_closed(&mut bad).await;
    relay.wait_for_members(2).await;

    send(&mut sender, r#"{"command":"BROADCAST","message":"still up"}"#).await;
    assert_eq!(
        next_text(&mut good).await.as_deref(),
        Some(r#"{"message":"still up"}"#)
    );

    relay.stop().await;
}

#[tokio::test]
async fn test_vanished_peer_is_removed_and_delivery_continues() {
    let relay = Relay::start().await;
    let mut a = relay.connect().await;
    let mut b = relay.connect().await;
    let gone = relay.connect().await;

    drop(gone);
    relay.wait_for_members(2).await;

    send(&mut a, r#"{"command":"BROADCAST","message":"after"}"#).await;
    assert_eq!(next_text(&mut a).await.as_deref(), Some(r#"{"message":"after"}"#));
    assert_eq!(next_text(&mut b).await.as_deref(), Some(r#"{"message":"after"}"#));

    relay.stop().await;
}

#[tokio::test]
async fn test_commands_from_one_connection_keep_their_order() {
    let relay = Relay::start().await;
    let mut a = relay.connect().await;
    let mut b = relay.connect().await;

    for i in 0..20 {
        send(&mut a, &format!(r#"{{"command":"BROADCAST","message":"{i}"}}"#)).await;
    }
    for i in 0..20 {
        assert_eq!(
            next_text(&mut b).await,
            Some(format!(r#"{{"message":"{i}"}}"#))
        );
    }
    drop(a);

    relay.stop().await;
}

#[tokio::test]
async fn test_shutdown_closes_clients() {
    let relay = Relay::start().await;
    let mut ws = relay.connect().await;
    let registry = relay.registry.clone();

    relay.stop().await;

    expect_closed(&mut ws).await;
    assert!(registry.is_empty());
}

#[tokio::test]
async fn test_stalled_reader_is_pruned_while_others_keep_receiving() {
    let mut config = Config::default();
    config.broadcast.include_sender = false;
    config.connection.outbound_queue_capacity = 4;
    config.connection.write_timeout_ms = 200;
    config.connection.max_message_bytes = 1 << 20;
    let relay = Relay::start_with(config).await;

    let mut sender = relay.connect().await;
    let mut reader = relay.connect().await;
    // Never polled: once its socket buffers fill, the relay can no longer
    // write to it.
    let stalled = relay.connect().await;

    let body = "x".repeat(128 * 1024);
    let frame = format!(r#"{{"command":"BROADCAST","message":"{body}"}}"#);
    let expected = format!(r#"{{"message":"{body}"}}"#);

    tokio::time::timeout(Duration::from_secs(30), async {
        for _ in 0..512 {
            send(&mut sender, &frame).await;
            assert_eq!(next_text(&mut reader).await.as_deref(), Some(expected.as_str()));
            if relay.registry.len() == 2 {
                return;
            }
        }
        panic!("stalled reader was never pruned");
    })
    .await
    .expect("pruning the stalled reader took too long");

    send(&mut sender, r#"{"command":"BROADCAST","message":"still here"}"#).await;
    assert_eq!(
        next_text(&mut reader).await.as_deref(),
        Some(r#"{"message":"still here"}"#)
    );

    drop(stalled);
    relay.stop().await;
}
