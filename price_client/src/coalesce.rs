//! Client-side coalescing of price updates.
//!
//! Incoming updates are merged into a pending map, last write wins per symbol.
//! The buffer itself has no clock: [`CoalescingBuffer::offer`] tells the caller
//! when a flush timer has to be armed, and [`CoalescingBuffer::take`] is called
//! when it fires. At most one flush is outstanding and an empty map is never
//! handed out.

use std::collections::HashSet;
use std::mem;

use price_common::{PriceMap, Symbol};

/// Pending per-symbol prices awaiting delivery.
#[derive(Debug, Default)]
pub struct CoalescingBuffer {
    pending: PriceMap,
    flush_scheduled: bool,
}

impl CoalescingBuffer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge the subscribed part of `update` into the pending map.
    ///
    /// Returns `true` when the caller must schedule a flush.
    pub fn offer(&mut self, update: PriceMap, subscribed: &HashSet<Symbol>) -> bool {
        for (symbol, price) in update {
            if subscribed.contains(&symbol) {
                self.pending.insert(symbol, price);
            }
        }
        if self.pending.is_empty() || self.flush_scheduled {
            return false;
        }
        self.flush_scheduled = true;
        true
    }

    /// Take everything pending. Re-enables scheduling for the next update.
    pub fn take(&mut self) -> Option<PriceMap> {
        self.flush_scheduled = false;
        if self.pending.is_empty() {
            None
        } else {
            Some(mem::take(&mut self.pending))
        }
    }

    /// Drop pending values for symbols that are no longer subscribed.
    pub fn retain(&mut self, subscribed: &HashSet<Symbol>) {
        self.pending.retain(|symbol, _| subscribed.contains(symbol));
    }

    /// Discard everything, including the scheduled flush.
    pub fn clear(&mut self) {
        self.pending.clear();
        self.flush_scheduled = false;
    }

    /// Number of symbols waiting for the next flush.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}
