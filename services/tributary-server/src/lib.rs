//! Tributary Server Library
//!
//! This crate provides the core of the Tributary message relay: the
//! connection registry, per-connection command dispatch, broadcast fan-out
//! with dead-peer pruning, and the axum server that ties them to WebSocket
//! clients.

pub mod cli;
pub mod connection;
pub mod error;
pub mod relay;
pub mod server;

// Re-exports for convenience
pub use cli::config::Config;
pub use connection::handle::{Connection, ConnectionId, ConnectionState};
pub use connection::protocol::{Command, MessageEnvelope};
pub use error::{ConnectionError, HandlerError, ProtocolViolation, ReceiveError, RegistryError};
pub use relay::broadcast::{BroadcastReport, Broadcaster};
pub use relay::dispatcher::{DisconnectReason, Dispatcher, SessionSummary};
pub use relay::handler::{CommandHandler, HandlerContext, HandlerTable};
pub use relay::registry::Registry;
pub use server::{BoundServer, Server};
