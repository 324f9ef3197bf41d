//! Periodic tick driving snapshot production and broadcast.
//!
//! The `TickScheduler` runs a background thread that advances the `PriceBook`
//! on every tick of a `crossbeam_channel::tick` receiver and hands the snapshot
//! to the `Broadcaster`. Broadcasting only enqueues into per-connection outboxes,
//! so a slow client never delays the next tick. Ticks the thread could not
//! consume in time are dropped by the ticker rather than replayed.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Sender, bounded, select, tick};
use log::{debug, info, trace};
use price_common::Result;

use crate::broadcaster::Broadcaster;
use crate::model::price_book::PriceBook;
use crate::model::price_source::PriceSource;

/// Background tick loop.
pub struct TickScheduler;

/// Running scheduler; stops the thread when dropped.
pub struct SchedulerHandle {
    stop_tx: Sender<()>,
    thread: Option<JoinHandle<()>>,
}

impl TickScheduler {
    /// Start ticking every `interval`.
    pub fn start(
        mut book: PriceBook,
        source: Box<dyn PriceSource>,
        broadcaster: Arc<Broadcaster>,
        interval: Duration,
    ) -> Result<SchedulerHandle> {
        let (stop_tx, stop_rx) = bounded::<()>(1);

        let thread = thread::Builder::new()
            .name("tick-scheduler".to_string())
            .spawn(move || {
                info!("Tick scheduler started, interval {:?}", interval);
                let ticker = tick(interval);
                let mut ticks: u64 = 0;
                loop {
                    select! {
                        recv(stop_rx) -> _ => break,
                        recv(ticker) -> _ => {
                            ticks += 1;
                            let snapshot = book.advance(source.as_ref());
                            let report = broadcaster.broadcast(&snapshot);
                            trace!("Tick {}: {} symbols, {:?}", ticks, snapshot.len(), report);
                            if report.dropped > 0 {
                                debug!("Tick {} dropped {} connections", ticks, report.dropped);
                            }
                        }
                    }
                }
                info!("Tick scheduler stopped after {} ticks", ticks);
            })?;

        Ok(SchedulerHandle {
            stop_tx,
            thread: Some(thread),
        })
    }
}

impl SchedulerHandle {
    /// Signal the tick thread and wait for it to finish.
    pub fn stop(&mut self) {
        if let Some(thread) = self.thread.take() {
            let _ = self.stop_tx.try_send(());
            let _ = thread.join();
        }
    }
}

impl Drop for SchedulerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::price_book::tests::{ScriptedSource, catalog};
    use crate::registry::SubscriptionRegistry;
    use price_common::protocol::{Inbound, ServerMessage, decode_server};

    #[test]
    fn ticks_deliver_subscribed_prices() {
        let registry = Arc::new(SubscriptionRegistry::new());
        let broadcaster = Arc::new(Broadcaster::new(Arc::clone(&registry), 64));
        let rx = broadcaster.attach(1).unwrap();
        registry
            .set_subscription(1, vec!["AAPL".to_string()])
            .unwrap();

        let book = PriceBook::new(&catalog(&[("AAPL", 100.0), ("MSFT", 200.0)]), 2);
        let source = ScriptedSource::new(&[("AAPL", 100.50), ("MSFT", 199.80)]);
        let mut handle = TickScheduler::start(
            book,
            Box::new(source),
            Arc::clone(&broadcaster),
            Duration::from_millis(5),
        )
        .unwrap();

        let line = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        handle.stop();

        match decode_server(&line).unwrap() {
            Inbound::Message(ServerMessage::Update { data }) => {
                assert_eq!(data.len(), 1);
                assert_eq!(data["AAPL"], 100.5);
            }
            other => panic!("unexpected message {:?}", other),
        }
    }

    #[test]
    fn failing_symbol_does_not_stop_delivery() {
        let registry = Arc::new(SubscriptionRegistry::new());
        let broadcaster = Arc::new(Broadcaster::new(Arc::clone(&registry), 64));
        let rx = broadcaster.attach(1).unwrap();
        registry
            .set_subscription(1, vec!["AAPL".to_string(), "MSFT".to_string()])
            .unwrap();

        let book = PriceBook::new(&catalog(&[("AAPL", 100.0), ("MSFT", 200.0)]), 2);
        let source = ScriptedSource::new(&[("AAPL", 101.0)]);
        let _handle = TickScheduler::start(
            book,
            Box::new(source),
            Arc::clone(&broadcaster),
            Duration::from_millis(5),
        )
        .unwrap();

        for _ in 0..3 {
            let line = rx.recv_timeout(Duration::from_secs(2)).unwrap();
            assert_eq!(line, r#"{"type":"update","data":{"AAPL":101.0}}"#);
        }
    }

    #[test]
    fn stop_ends_the_thread() {
        let registry = Arc::new(SubscriptionRegistry::new());
        let broadcaster = Arc::new(Broadcaster::new(registry, 4));
        let book = PriceBook::new(&catalog(&[("AAPL", 100.0)]), 2);
        let mut handle = TickScheduler::start(
            book,
            Box::new(ScriptedSource::new(&[("AAPL", 1.0)])),
            broadcaster,
            Duration::from_millis(1),
        )
        .unwrap();
        handle.stop();
        assert!(handle.thread.is_none());
    }
}
