//! Connection registry.
//!
//! One registry per transport tracks every live connection served under
//! that protocol. All operations run under a single mutex; broadcasts
//! iterate a point-in-time snapshot so no lock is held across writes.

use std::collections::HashMap;
use std::sync::Arc;

use cmdrelay_sdk::Protocol;
use parking_lot::Mutex;
use tracing::debug;

use crate::connection::Connection;

/// Live connections of one protocol, keyed by connection id.
#[derive(Debug)]
pub struct ConnectionRegistry {
    kind: Protocol,
    connections: Mutex<HashMap<String, Arc<Connection>>>,
}

impl ConnectionRegistry {
    /// Creates an empty registry for `kind`.
    #[must_use]
    pub fn new(kind: Protocol) -> Self {
        Self {
            kind,
            connections: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the protocol this registry serves.
    #[must_use]
    pub const fn kind(&self) -> Protocol {
        self.kind
    }

    /// Adds a connection.
    ///
    /// Returns false, leaving the registry untouched, if the connection has
    /// already closed.
    pub fn register(&self, connection: Arc<Connection>) -> bool {
        let mut connections = self.connections.lock();
        if connection.is_closed() {
            return false;
        }
        debug!(
            conn_id = %connection.id(),
            protocol = %self.kind,
            total = connections.len() + 1,
            "connection registered"
        );
        connections.insert(connection.id().to_string(), connection);
        true
    }

    /// Removes a connection by id.
    pub fn unregister(&self, id: &str) -> Option<Arc<Connection>> {
        let removed = self.connections.lock().remove(id);
        if removed.is_some() {
            debug!(conn_id = %id, protocol = %self.kind, "connection unregistered");
        }
        removed
    }

    /// Returns the connection with the given id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<Arc<Connection>> {
        self.connections.lock().get(id).cloned()
    }

    /// Returns every registered connection, ordered by id.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Arc<Connection>> {
        let mut connections: Vec<_> = self.connections.lock().values().cloned().collect();
        connections.sort_by(|a, b| a.id().cmp(b.id()));
        connections
    }

    /// Returns the number of registered connections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.connections.lock().len()
    }

    /// Returns true if no connection is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.connections.lock().is_empty()
    }

    /// Closes every registered connection and returns how many were closed.
    pub fn close_all(&self) -> usize {
        self.snapshot()
            .into_iter()
            .filter(|connection| connection.close())
            .count()
    }
}
