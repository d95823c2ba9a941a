//! Command Dispatcher
//!
//! Runs the receive loop of one connection: register, read a command, route
//! it to its handler, repeat. Any failure on this connection ends this loop
//! and nothing else. Protocol violations and handler failures are reported
//! to the client in one error envelope before the connection is closed.

use futures_util::{FutureExt, Stream};
use std::fmt::{self, Display};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::connection::handle::Connection;
use crate::connection::protocol::MessageEnvelope;
use crate::connection::reader::{ConnectionReader, Frame};
use crate::error::{HandlerError, ProtocolViolation, ReceiveError};
use crate::relay::handler::{HandlerContext, HandlerTable};
use crate::relay::registry::Registry;

/// Why a session ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// Peer closed, stream ended, or the connection was closed locally
    Closed,
    Transport(String),
    Protocol(ProtocolViolation),
    Handler(String),
    /// The connection id was already registered
    Rejected,
}

impl Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisconnectReason::Closed => write!(f, "closed"),
            DisconnectReason::Transport(e) => write!(f, "transport error: {e}"),
            DisconnectReason::Protocol(v) => write!(f, "protocol violation: {v}"),
            DisconnectReason::Handler(e) => write!(f, "handler failure: {e}"),
            DisconnectReason::Rejected => write!(f, "rejected by registry"),
        }
    }
}

/// What happened during one session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    /// Commands handled successfully
    pub commands: u64,
    pub reason: DisconnectReason,
}

/// Routes commands from connections to handlers
#[derive(Clone)]
pub struct Dispatcher {
    handlers: Arc<HandlerTable>,
    registry: Arc<Registry>,
}

impl Dispatcher {
    pub fn new(handlers: Arc<HandlerTable>, registry: Arc<Registry>) -> Self {
        Self { handlers, registry }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Serve one connection until it ends.
    ///
    /// Commands are handled one at a time in receipt order. On return the
    /// connection is closed and no longer registered.
    pub async fn run<S, E>(&self, mut reader: ConnectionReader<S>) -> SessionSummary
    where
        S: Stream<Item = Result<Frame, E>> + Unpin,
        E: Display,
    {
        let connection = reader.connection().clone();

        if let Err(e) = self.registry.add(connection.clone()) {
            error!(conn_id = %connection.id(), error = %e, "Refusing connection");
            connection.close();
            return SessionSummary {
                commands: 0,
                reason: DisconnectReason::Rejected,
            };
        }

        let ctx = HandlerContext {
            connection: connection.clone(),
            registry: self.registry.clone(),
        };
        let mut commands = 0u64;

        let reason = loop {
            let command = match reader.receive().await {
                Ok(command) => command,
                Err(ReceiveError::Closed) => break DisconnectReason::Closed,
                Err(ReceiveError::Transport(e)) => {
                    warn!(conn_id = %connection.id(), error = %e, "Read error");
                    break DisconnectReason::Transport(e);
                }
                Err(ReceiveError::Protocol(violation)) => {
                    warn!(conn_id = %connection.id(), error = %violation, "Protocol violation");
                    report(&connection, &violation);
                    break DisconnectReason::Protocol(violation);
                }
            };

            debug!(conn_id = %connection.id(), command = %command.name, "Received command");

            let Some(handler) = self.handlers.get(&command.name) else {
                let violation = ProtocolViolation::UnknownCommand(command.name);
                warn!(conn_id = %connection.id(), error = %violation, "Unknown command");
                report(&connection, &violation);
                break DisconnectReason::Protocol(violation);
            };

            let outcome = AssertUnwindSafe(handler.handle(&ctx, &command))
                .catch_unwind()
                .await
                .unwrap_or_else(|_| Err(HandlerError::Panicked(command.name.clone())));

            if let Err(e) = outcome {
                error!(
                    conn_id = %connection.id(),
                    command = %command.name,
                    error = %e,
                    "Command handler failed"
                );
                report(&connection, &e);
                break DisconnectReason::Handler(e.to_string());
            }

            commands += 1;
        };

        self.registry.remove(connection.id());
        connection.close();

        info!(
            conn_id = %connection.id(),
            commands,
            reason = %reason,
            age_ms = connection.age().as_millis() as u64,
            "Session ended"
        );

        SessionSummary { commands, reason }
    }
}

/// Send one error envelope; the caller closes the connection right after.
fn report(connection: &Connection, error: &dyn Display) {
    let envelope = MessageEnvelope::new(error.to_string());
    if let Err(e) = connection.send_json(&envelope) {
        debug!(conn_id = %connection.id(), error = %e, "Could not deliver error envelope");
    }
}
