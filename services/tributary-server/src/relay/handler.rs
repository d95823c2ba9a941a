//! Command Handlers
//!
//! Defines the handler interface and the immutable table that routes a
//! command name to its handler. The table is built once at startup and
//! shared by reference with every dispatcher.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use crate::connection::handle::Connection;
use crate::connection::protocol::Command;
use crate::error::HandlerError;
use crate::relay::registry::Registry;

/// What a handler gets to work with for one invocation
#[derive(Clone)]
pub struct HandlerContext {
    /// The connection that sent the command
    pub connection: Arc<Connection>,
    pub registry: Arc<Registry>,
}

/// Behavior bound to one command name
#[async_trait]
pub trait CommandHandler: Send + Sync {
    /// Command name this handler answers to (exact, case-sensitive)
    fn name(&self) -> &'static str;

    /// Handle one command. Errors end the sender's session.
    async fn handle(&self, ctx: &HandlerContext, command: &Command) -> Result<(), HandlerError>;
}

/// Immutable mapping from command name to handler
#[derive(Clone, Default)]
pub struct HandlerTable {
    handlers: HashMap<&'static str, Arc<dyn CommandHandler>>,
}

impl HandlerTable {
    pub fn builder() -> HandlerTableBuilder {
        HandlerTableBuilder::default()
    }

    /// Look up a handler by exact name
    pub fn get(&self, name: &str) -> Option<&Arc<dyn CommandHandler>> {
        self.handlers.get(name)
    }

    /// Registered command names, sorted
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.handlers.keys().copied().collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

/// Builder for HandlerTable
#[derive(Default)]
pub struct HandlerTableBuilder {
    handlers: HashMap<&'static str, Arc<dyn CommandHandler>>,
}

impl HandlerTableBuilder {
    /// Register a handler under its own name. A later registration with the
    /// same name replaces the earlier one.
    pub fn register<H: CommandHandler + 'static>(mut self, handler: H) -> Self {
        let handler: Arc<dyn CommandHandler> = Arc::new(handler);
        if self.handlers.insert(handler.name(), handler).is_some() {
            tracing::warn!("Command handler registered twice; keeping the latest");
        }
        self
    }

    pub fn build(self) -> HandlerTable {
        HandlerTable {
            handlers: self.handlers,
        }
    }
}
