//! Per-connection subscription sets.
//!
//! Written by connection handlers when a `subscribe` arrives, read by the tick
//! thread on every broadcast. A subscription is stored as an `Arc<HashSet>` and
//! replaced as a whole, so a reader either holds the old set or the new one.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use log::debug;
use price_common::{Result, StreamError, Symbol};

/// Identifier of a live connection. Never reused within a process.
pub type ConnectionId = u64;

/// Immutable set of symbols a connection wants.
pub type Subscription = Arc<HashSet<Symbol>>;

/// Thread-safe map from connection to its current subscription.
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    subscriptions: Mutex<HashMap<ConnectionId, Subscription>>,
}

impl SubscriptionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `id` with an empty subscription.
    pub fn open(&self, id: ConnectionId) -> Result<()> {
        self.subscriptions
            .lock()?
            .insert(id, Arc::new(HashSet::new()));
        Ok(())
    }

    /// Replace the subscription of `id` with `symbols`.
    ///
    /// Symbols are stored as-is; ones the catalog does not know simply never
    /// match a snapshot.
    pub fn set_subscription<I>(&self, id: ConnectionId, symbols: I) -> Result<usize>
    where
        I: IntoIterator<Item = Symbol>,
    {
        let set: HashSet<Symbol> = symbols.into_iter().collect();
        let size = set.len();
        let mut subscriptions = self.subscriptions.lock()?;
        let slot = subscriptions
            .get_mut(&id)
            .ok_or(StreamError::ConnectionNotFound(id))?;
        *slot = Arc::new(set);
        debug!("Connection {} now subscribed to {} symbols", id, size);
        Ok(size)
    }

    /// Current subscription of `id`.
    pub fn get(&self, id: ConnectionId) -> Result<Subscription> {
        self.subscriptions
            .lock()?
            .get(&id)
            .cloned()
            .ok_or(StreamError::ConnectionNotFound(id))
    }

    /// Forget `id`. Returns whether it was registered.
    pub fn remove(&self, id: ConnectionId) -> Result<bool> {
        Ok(self.subscriptions.lock()?.remove(&id).is_some())
    }

    /// Number of registered connections.
    pub fn len(&self) -> Result<usize> {
        Ok(self.subscriptions.lock()?.len())
    }
}
