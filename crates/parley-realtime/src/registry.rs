//! Identity ⇄ connection map.
//!
//! Both directions live behind one lock so a register/unregister pair can
//! never leave them disagreeing. An identity with no entry is offline.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use parley_core::{ConnectionId, IdentityId};
use tracing::debug;

use crate::connection::ClientConnection;

#[derive(Default)]
struct RegistryState {
    by_identity: HashMap<IdentityId, HashMap<ConnectionId, Arc<ClientConnection>>>,
    by_connection: HashMap<ConnectionId, IdentityId>,
}

impl RegistryState {
    fn insert(&mut self, connection: Arc<ClientConnection>) {
        let identity = connection.identity.clone();
        let _ = self
            .by_connection
            .insert(connection.id.clone(), identity.clone());
        let _ = self
            .by_identity
            .entry(identity)
            .or_default()
            .insert(connection.id.clone(), connection);
    }

    fn remove(&mut self, connection_id: &ConnectionId) -> Option<Arc<ClientConnection>> {
        let identity = self.by_connection.remove(connection_id)?;
        let conns = self.by_identity.get_mut(&identity)?;
        let removed = conns.remove(connection_id);
        if conns.is_empty() {
            let _ = self.by_identity.remove(&identity);
        }
        removed
    }

    #[cfg(debug_assertions)]
    fn assert_consistent(&self) {
        let forward: usize = self.by_identity.values().map(HashMap::len).sum();
        debug_assert_eq!(forward, self.by_connection.len(), "connection maps diverged");
        for (identity, conns) in &self.by_identity {
            debug_assert!(!conns.is_empty(), "empty connection set kept for {identity}");
            for id in conns.keys() {
                debug_assert_eq!(self.by_connection.get(id), Some(identity));
            }
        }
    }
}

/// Live connections per identity.
#[derive(Default)]
pub struct ConnectionRegistry {
    state: RwLock<RegistryState>,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection under its owning identity.
    ///
    /// Re-registering a connection id replaces the previous entry.
    pub fn register(&self, connection: Arc<ClientConnection>) {
        let mut state = self.state.write();
        let _ = state.remove(&connection.id);
        state.insert(connection);
        #[cfg(debug_assertions)]
        state.assert_consistent();
    }

    /// Register unless `limit` connections are already live.
    ///
    /// The count and the insert happen under one write lock, so concurrent
    /// callers cannot overshoot the limit. Returns `false` when refused.
    pub fn try_register(&self, connection: Arc<ClientConnection>, limit: usize) -> bool {
        let mut state = self.state.write();
        if state.by_connection.len() >= limit && !state.by_connection.contains_key(&connection.id) {
            return false;
        }
        let _ = state.remove(&connection.id);
        state.insert(connection);
        #[cfg(debug_assertions)]
        state.assert_consistent();
        true
    }

    /// Remove a connection. Drops the identity entry when its last connection goes.
    pub fn unregister(&self, connection_id: &ConnectionId) -> Option<Arc<ClientConnection>> {
        let mut state = self.state.write();
        let removed = state.remove(connection_id);
        #[cfg(debug_assertions)]
        state.assert_consistent();
        if let Some(conn) = &removed {
            debug!(conn_id = %conn.id, identity = %conn.identity, "connection unregistered");
        }
        removed
    }

    /// Live connections of `identity` (empty when offline).
    pub fn connections_for(&self, identity: &IdentityId) -> Vec<Arc<ClientConnection>> {
        self.state
            .read()
            .by_identity
            .get(identity)
            .map(|conns| conns.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Whether `identity` has at least one live connection.
    pub fn is_online(&self, identity: &IdentityId) -> bool {
        self.state.read().by_identity.contains_key(identity)
    }

    /// Owner of a connection.
    pub fn identity_of(&self, connection_id: &ConnectionId) -> Option<IdentityId> {
        self.state.read().by_connection.get(connection_id).cloned()
    }

    /// Total live connections.
    pub fn connection_count(&self) -> usize {
        self.state.read().by_connection.len()
    }

    /// Number of identities with at least one live connection.
    pub fn online_identity_count(&self) -> usize {
        self.state.read().by_identity.len()
    }

    /// Close and remove every connection.
    pub fn drain(&self) -> Vec<Arc<ClientConnection>> {
        let mut state = self.state.write();
        state.by_connection.clear();
        let drained: Vec<_> = state
            .by_identity
            .drain()
            .flat_map(|(_, conns)| conns.into_values())
            .collect();
        drop(state);
        for conn in &drained {
            conn.close();
        }
        drained
    }
}
