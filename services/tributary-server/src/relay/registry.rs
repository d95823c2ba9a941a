//! Connection Registry
//!
//! The authoritative set of connections eligible for broadcast. All reads
//! and writes go through a `parking_lot::RwLock` whose guard never outlives
//! a single map operation; callers get a snapshot of `Arc`s and do their I/O
//! after the lock is released.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use crate::connection::handle::{Connection, ConnectionId};
use crate::error::RegistryError;

/// Thread-safe set of live connections
#[derive(Default)]
pub struct Registry {
    connections: RwLock<HashMap<ConnectionId, Arc<Connection>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection.
    pub fn add(&self, connection: Arc<Connection>) -> Result<(), RegistryError> {
        let id = connection.id();
        let mut connections = self.connections.write();
        if connections.contains_key(&id) {
            return Err(RegistryError::Duplicate(id));
        }
        connections.insert(id, connection);
        tracing::debug!(conn_id = %id, total = connections.len(), "Connection registered");
        Ok(())
    }

    /// Deregister a connection. Removing an absent id is a no-op.
    ///
    /// Returns whether the connection was present.
    pub fn remove(&self, id: ConnectionId) -> bool {
        let mut connections = self.connections.write();
        let removed = connections.remove(&id).is_some();
        if removed {
            tracing::debug!(conn_id = %id, total = connections.len(), "Connection deregistered");
        }
        removed
    }

    /// Point-in-time copy of the open members.
    ///
    /// Connections that were closed but whose owner has not yet removed
    /// them are left out.
    pub fn snapshot(&self) -> Vec<Arc<Connection>> {
        self.connections
            .read()
            .values()
            .filter(|c| c.is_open())
            .cloned()
            .collect()
    }

    /// Members that are still open. Unlike `len`, this leaves out
    /// connections closed by their writer but not yet removed.
    pub fn open_count(&self) -> usize {
        self.connections.read().values().filter(|c| c.is_open()).count()
    }

    #[cfg(test)]
    pub(crate) fn contains(&self, id: ConnectionId) -> bool {
        self.connections.read().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.connections.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.read().is_empty()
    }

    /// Remove and close every connection. Returns how many were closed.
    pub fn close_all(&self) -> usize {
        let drained: Vec<Arc<Connection>> = {
            let mut connections = self.connections.write();
            connections.drain().map(|(_, c)| c).collect()
        };
        for connection in &drained {
            connection.close();
        }
        drained.len()
    }
}
