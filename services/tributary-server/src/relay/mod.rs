//! Relay module
//!
//! The shared connection registry, the command handler table, the
//! per-connection dispatcher, and the broadcast fan-out.

pub mod broadcast;
pub mod dispatcher;
pub mod handler;
pub mod registry;
