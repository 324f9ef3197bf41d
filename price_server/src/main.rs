//! Price streaming server.
//!
//! This binary accepts TCP subscribers and streams simulated prices to them.
//! Internally, it wires together four building blocks:
//!
//! - `TickScheduler`: advances a `PriceBook` from a `PriceSource` on a fixed
//!   period and hands each rounded snapshot to the broadcaster.
//! - `SubscriptionRegistry`: the set of symbols each connection asked for,
//!   replaced wholesale by every `subscribe` message.
//! - `Broadcaster`: intersects a snapshot with every subscription and queues
//!   the non-empty results into per-connection outboxes without blocking.
//! - `StreamListener`: accepts sockets and runs a reader and a writer thread per
//!   connection; malformed input is answered on that connection only.
//!
//! Network protocol (high-level):
//! - Bind address: `0.0.0.0:8080` by default (see `--bind`).
//! - One JSON document per line in both directions.
//! - Client sends `{"type":"subscribe","stocks":[...]}`; server answers every tick
//!   with `{"type":"update","data":{...}}` whenever the intersection is non-empty.
//!
//! Failing to load the catalog or to bind the listening socket is fatal; every
//! other error is confined to the connection or the symbol it concerns.
#![warn(missing_docs)]
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use log::info;
use price_common::{CatalogSource, FileCatalog, Result, StreamError};

use crate::args::Args;
use crate::broadcaster::Broadcaster;
use crate::listener::StreamListener;
use crate::model::price_book::PriceBook;
use crate::model::price_source::RandomWalk;
use crate::registry::SubscriptionRegistry;
use crate::scheduler::TickScheduler;

mod args;
mod broadcaster;
mod connection;
mod listener;
pub mod model;
mod registry;
mod scheduler;

fn main() -> Result<(), StreamError> {
    init_logger();
    let args = Args::parse();

    let catalog = FileCatalog::new(&args.catalog).fetch()?;
    info!(
        "Loaded {} symbols from {}",
        catalog.len(),
        args.catalog.display()
    );

    let registry = Arc::new(SubscriptionRegistry::new());
    let broadcaster = Arc::new(Broadcaster::new(
        Arc::clone(&registry),
        args.outbox_capacity,
    ));
    let listener = StreamListener::bind(
        &args.bind,
        Arc::clone(&broadcaster),
        Arc::clone(&registry),
        Duration::from_millis(args.write_timeout_ms),
    )?;

    let book = PriceBook::new(&catalog, args.precision);
    let _scheduler = TickScheduler::start(
        book,
        Box::new(RandomWalk::default()),
        Arc::clone(&broadcaster),
        Duration::from_millis(args.tick_interval_ms),
    )?;

    listener.run()
}

fn init_logger() {
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();
}
