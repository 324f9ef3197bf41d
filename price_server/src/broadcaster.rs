//! Subscription-aware fan-out of tick snapshots.
//!
//! Every live connection owns a bounded outbox drained by its writer thread.
//! The broadcaster never blocks: it `try_send`s one serialized update per
//! connection and detaches any connection whose outbox is full or closed.
//! Only the tick thread broadcasts, so each outbox receives ticks in order.
//! A detached outbox stops yielding immediately, even with lines still queued,
//! so the writer closes the socket instead of flushing stale prices.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};
use log::{debug, error, info, warn};
use price_common::protocol::{self, ServerMessage};
use price_common::{PriceMap, Result, StreamError, Symbol};

use crate::registry::{ConnectionId, SubscriptionRegistry};

/// Per-tick delivery counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Connections that were sent an update.
    pub delivered: usize,
    /// Connections whose subscription did not intersect the snapshot.
    pub skipped: usize,
    /// Connections detached because their outbox rejected the update.
    pub dropped: usize,
}

/// Restrict `snapshot` to the symbols in `subscription`.
pub fn intersect(snapshot: &PriceMap, subscription: &HashSet<Symbol>) -> PriceMap {
    if subscription.len() < snapshot.len() {
        subscription
            .iter()
            .filter_map(|symbol| snapshot.get(symbol).map(|price| (symbol.clone(), *price)))
            .collect()
    } else {
        snapshot
            .iter()
            .filter(|(symbol, _)| subscription.contains(*symbol))
            .map(|(symbol, price)| (symbol.clone(), *price))
            .collect()
    }
}

/// Receiving end of a connection's outbox, drained by its writer.
#[derive(Debug)]
pub struct Outbox {
    lines: Receiver<String>,
    detached: Arc<AtomicBool>,
}

impl Outbox {
    /// Block for the next line. `None` once the connection is detached.
    pub fn recv(&self) -> Option<String> {
        if self.is_detached() {
            return None;
        }
        let line = self.lines.recv().ok()?;
        if self.is_detached() {
            None
        } else {
            Some(line)
        }
    }

    #[cfg(test)]
    pub(crate) fn try_recv(&self) -> Option<String> {
        if self.is_detached() {
            return None;
        }
        self.lines.try_recv().ok()
    }

    #[cfg(test)]
    pub(crate) fn recv_timeout(&self, timeout: std::time::Duration) -> Option<String> {
        self.lines.recv_timeout(timeout).ok()
    }

    /// Whether the broadcaster has let go of this connection.
    pub fn is_detached(&self) -> bool {
        self.detached.load(Ordering::Acquire)
    }
}

struct OutboxSender {
    tx: Sender<String>,
    detached: Arc<AtomicBool>,
}

/// Owns the outboxes of all live connections.
pub struct Broadcaster {
    registry: Arc<SubscriptionRegistry>,
    outboxes: Mutex<HashMap<ConnectionId, OutboxSender>>,
    capacity: usize,
}

impl Broadcaster {
    /// Create a broadcaster whose outboxes hold up to `capacity` lines.
    pub fn new(registry: Arc<SubscriptionRegistry>, capacity: usize) -> Self {
        Self {
            registry,
            outboxes: Mutex::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// Register a connection with an empty subscription and return the
    /// receiving end of its outbox.
    pub fn attach(&self, id: ConnectionId) -> Result<Outbox> {
        let (tx, lines) = bounded(self.capacity);
        let detached = Arc::new(AtomicBool::new(false));
        self.registry.open(id)?;
        self.outboxes.lock()?.insert(
            id,
            OutboxSender {
                tx,
                detached: Arc::clone(&detached),
            },
        );
        Ok(Outbox { lines, detached })
    }

    /// Remove a connection and its subscription.
    ///
    /// The outbox stops yielding right away and its writer exits without
    /// draining what is still queued. Calling this for an already detached
    /// connection is a no-op.
    pub fn detach(&self, id: ConnectionId) -> Result<bool> {
        let removed = match self.outboxes.lock()?.remove(&id) {
            Some(outbox) => {
                outbox.detached.store(true, Ordering::Release);
                true
            }
            None => false,
        };
        self.registry.remove(id)?;
        if removed {
            info!(
                "Connection {} detached, {} subscribers remaining",
                id,
                self.registry.len()?
            );
        }
        Ok(removed)
    }

    /// Queue one line for a single connection, e.g. an error acknowledgment.
    ///
    /// A full or closed outbox detaches the connection.
    pub fn send_to(&self, id: ConnectionId, line: String) -> Result<()> {
        let tx = self
            .outboxes
            .lock()?
            .get(&id)
            .map(|outbox| outbox.tx.clone())
            .ok_or(StreamError::ConnectionNotFound(id))?;
        if let Err(e) = tx.try_send(line) {
            drop(tx);
            self.detach(id)?;
            return Err(StreamError::ChannelSend(format!("connection {}: {}", id, e)));
        }
        Ok(())
    }

    /// Send each connection the part of `snapshot` it is subscribed to.
    pub fn broadcast(&self, snapshot: &PriceMap) -> BroadcastReport {
        let mut report = BroadcastReport::default();
        let targets: Vec<(ConnectionId, Sender<String>)> = match self.outboxes.lock() {
            Ok(outboxes) => outboxes
                .iter()
                .map(|(id, outbox)| (*id, outbox.tx.clone()))
                .collect(),
            Err(e) => {
                error!("Outbox table unavailable: {}", e);
                return report;
            }
        };

        let mut failed = Vec::new();
        for (id, tx) in &targets {
            let subscription = match self.registry.get(*id) {
                Ok(subscription) => subscription,
                Err(_) => {
                    report.skipped += 1;
                    continue;
                }
            };
            let data = intersect(snapshot, &subscription);
            if data.is_empty() {
                report.skipped += 1;
                continue;
            }
            let line = match protocol::encode(&ServerMessage::Update { data }) {
                Ok(line) => line,
                Err(e) => {
                    error!("Failed to encode update for connection {}: {}", id, e);
                    continue;
                }
            };
            match tx.try_send(line) {
                Ok(()) => report.delivered += 1,
                Err(TrySendError::Full(_)) => {
                    warn!("Connection {} is not keeping up, dropping it", id);
                    failed.push(*id);
                }
                Err(TrySendError::Disconnected(_)) => {
                    debug!("Connection {} outbox closed", id);
                    failed.push(*id);
                }
            }
        }
        drop(targets);

        for id in failed {
            report.dropped += 1;
            if let Err(e) = self.detach(id) {
                error!("Failed to detach connection {}: {}", id, e);
            }
        }
        report
    }

    /// Number of attached connections.
    pub fn connection_count(&self) -> Result<usize> {
        Ok(self.outboxes.lock()?.len())
    }
}
