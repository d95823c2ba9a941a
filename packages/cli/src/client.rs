//! Relay Client
//!
//! WebSocket client for talking to a Tributary relay.

use anyhow::{Context, Result};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::debug;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Something the relay sent us
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A text frame
    Text(String),
    /// The relay closed the connection
    Closed(Option<String>),
    /// Nothing arrived within the idle timeout
    Idle,
}

pub struct RelayClient {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl RelayClient {
    /// Connect to a relay endpoint
    pub async fn connect(url: &str) -> Result<Self> {
        debug!(url, "Connecting to relay");
        let (ws, _) = timeout(CONNECT_TIMEOUT, connect_async(url))
            .await
            .context("Connection timeout")?
            .with_context(|| format!("Failed to connect to {}", url))?;
        Ok(Self { ws })
    }

    /// Send one raw text frame
    pub async fn send_raw(&mut self, text: &str) -> Result<()> {
        self.ws
            .send(Message::Text(text.to_string()))
            .await
            .context("Failed to send message")
    }

    /// Send a BROADCAST command
    pub async fn broadcast(&mut self, message: &str, exclude_sender: bool) -> Result<()> {
        let envelope = broadcast_envelope(message, exclude_sender);
        self.send_raw(&envelope.to_string()).await
    }

    /// Wait for the next text frame or close. With `idle` set, gives up
    /// after that long without traffic.
    pub async fn next_event(&mut self, idle: Option<Duration>) -> Result<Event> {
        let next = async {
            loop {
                match self.ws.next().await {
                    Some(Ok(Message::Text(text))) => return Ok(Event::Text(text)),
                    Some(Ok(Message::Binary(data))) => {
                        return Ok(Event::Text(String::from_utf8_lossy(&data).into_owned()))
                    }
                    Some(Ok(Message::Close(frame))) => {
                        return Ok(Event::Closed(frame.map(|f| f.reason.into_owned())))
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => return Err(anyhow::Error::new(e).context("WebSocket error")),
                    None => return Ok(Event::Closed(None)),
                }
            }
        };

        match idle {
            Some(idle) => match timeout(idle, next).await {
                Ok(event) => event,
                Err(_) => Ok(Event::Idle),
            },
            None => next.await,
        }
    }

    /// Close the connection politely
    pub async fn close(mut self) -> Result<()> {
        self.ws.close(None).await.context("Failed to close connection")
    }
}

/// Build a BROADCAST envelope
pub fn broadcast_envelope(message: &str, exclude_sender: bool) -> Value {
    let mut envelope = json!({
        "command": "BROADCAST",
        "message": message,
    });
    if exclude_sender {
        envelope["excludeSender"] = Value::Bool(true);
    }
    envelope
}

/// Text to show for a frame: the `message` field when the frame is a relay
/// envelope, the raw frame otherwise.
pub fn display_text(frame: &str) -> String {
    match serde_json::from_str::<Value>(frame) {
        Ok(Value::Object(map)) if map.len() == 1 => match map.get("message") {
            Some(Value::String(message)) => message.clone(),
            _ => frame.to_string(),
        },
        _ => frame.to_string(),
    }
}
