//! Error types
//!
//! Every per-connection failure is expressed as one of these enums and is
//! handled at the dispatcher boundary; none of them terminate the server.

use thiserror::Error;

use crate::connection::handle::ConnectionId;

/// Failures of a single outbound send.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// The connection is closing or closed.
    #[error("connection is closed")]
    Closed,

    /// The outbound queue is full; the peer is not draining fast enough.
    #[error("outbound queue is full")]
    QueueFull,

    /// The payload could not be serialized.
    #[error("failed to serialize outbound message: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// A message that breaks the envelope protocol. The `Display` text is sent
/// verbatim to the offending client inside an error envelope.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolViolation {
    #[error("Message is not valid JSON")]
    InvalidJson,

    #[error("Message is not a JSON object")]
    NotAnObject,

    #[error("Message is lacking a command property")]
    MissingCommand,

    #[error("Unknown command: {0}")]
    UnknownCommand(String),
}

/// Why a blocking receive returned without a command.
#[derive(Debug, Error)]
pub enum ReceiveError {
    /// Peer sent a close frame, the stream ended, or the connection was
    /// closed locally.
    #[error("connection closed")]
    Closed,

    #[error("transport error: {0}")]
    Transport(String),

    #[error(transparent)]
    Protocol(#[from] ProtocolViolation),
}

/// A registered command handler failed.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// The handler-specific payload did not match its schema.
    #[error("Invalid {command} payload: {reason}")]
    InvalidPayload { command: String, reason: String },

    #[error("{0}")]
    Failed(String),

    #[error("Handler for {0} panicked")]
    Panicked(String),
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("connection {0} is already registered")]
    Duplicate(ConnectionId),
}
