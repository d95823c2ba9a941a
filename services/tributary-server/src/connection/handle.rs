//! Connection Handle
//!
//! The shared, send-side view of one client session. The registry, the
//! dispatcher and any broadcaster hold the same `Arc<Connection>`; the
//! socket itself is owned by the session's reader and writer halves.

use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use uuid::Uuid;

use crate::error::ConnectionError;

/// A serialized frame waiting in a connection's outbound queue.
pub type Outbound = Arc<str>;

/// Receiving end of a connection's outbound queue, drained by its writer.
pub type OutboundQueue = mpsc::Receiver<Outbound>;

/// Opaque identity of a connection, unique per session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle of a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Accepting sends
    Open,
    /// Close in progress; sends are refused
    Closing,
    /// Terminal
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Open => write!(f, "Open"),
            ConnectionState::Closing => write!(f, "Closing"),
            ConnectionState::Closed => write!(f, "Closed"),
        }
    }
}

impl ConnectionState {
    fn is_valid_transition(self, to: ConnectionState) -> bool {
        matches!(
            (self, to),
            (ConnectionState::Open, ConnectionState::Closing)
                | (ConnectionState::Closing, ConnectionState::Closed)
        )
    }
}

struct ConnectionInner {
    state: ConnectionState,
    /// Dropped on close so the writer drains what is queued and stops.
    outbound: Option<mpsc::Sender<Outbound>>,
}

/// One logical client session
pub struct Connection {
    id: ConnectionId,
    inner: Mutex<ConnectionInner>,
    closed_tx: watch::Sender<bool>,
    connected_at: Instant,
}

impl Connection {
    /// Create an open connection with a bounded outbound queue.
    ///
    /// The returned queue must be handed to exactly one writer task.
    pub fn new(capacity: usize) -> (Arc<Self>, OutboundQueue) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let (closed_tx, _) = watch::channel(false);
        let connection = Arc::new(Self {
            id: ConnectionId::new(),
            inner: Mutex::new(ConnectionInner {
                state: ConnectionState::Open,
                outbound: Some(tx),
            }),
            closed_tx,
            connected_at: Instant::now(),
        });
        (connection, rx)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.lock().state
    }

    pub fn is_open(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    /// Time since the connection was established
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }

    /// Queue a frame for delivery.
    ///
    /// Never blocks: a full queue is reported as [`ConnectionError::QueueFull`]
    /// and a closed connection as [`ConnectionError::Closed`]. Frames from
    /// concurrent callers are written whole, one after another, by the
    /// connection's single writer.
    pub fn send(&self, frame: Outbound) -> Result<(), ConnectionError> {
        let inner = self.inner.lock();
        if inner.state != ConnectionState::Open {
            return Err(ConnectionError::Closed);
        }
        let tx = inner.outbound.as_ref().ok_or(ConnectionError::Closed)?;
        tx.try_send(frame).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => ConnectionError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => ConnectionError::Closed,
        })
    }

    /// Serialize a value to JSON and queue it.
    pub fn send_json<T: Serialize>(&self, value: &T) -> Result<(), ConnectionError> {
        let json = serde_json::to_string(value)?;
        self.send(Arc::from(json))
    }

    /// Close the connection.
    ///
    /// Idempotent. Frames already queued are still flushed by the writer;
    /// later sends fail and any pending receive wakes with a close error.
    /// Returns `true` for the call that performed the close.
    pub fn close(&self) -> bool {
        {
            let mut inner = self.inner.lock();
            if !self.transition(&mut inner, ConnectionState::Closing) {
                return false;
            }
            inner.outbound = None;
        }

        self.closed_tx.send_replace(true);

        let mut inner = self.inner.lock();
        self.transition(&mut inner, ConnectionState::Closed);
        true
    }

    /// Resolves once [`close`](Self::close) has been called.
    pub async fn closed(&self) {
        let mut rx = self.closed_tx.subscribe();
        // The sender lives as long as `self`, so this only returns on close.
        let _ = rx.wait_for(|closed| *closed).await;
    }

    fn transition(&self, inner: &mut ConnectionInner, to: ConnectionState) -> bool {
        if !inner.state.is_valid_transition(to) {
            return false;
        }
        tracing::trace!(conn_id = %self.id, from = %inner.state, to = %to, "Connection state transition");
        inner.state = to;
        true
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("state", &self.state())
            .finish()
    }
}
