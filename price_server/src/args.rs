//! Command-line arguments for the price server.
use std::path::PathBuf;

use clap::Parser;
use price_common::config::{
    DEFAULT_BIND_ADDRESS, DEFAULT_CATALOG_PATH, OUTBOX_CAPACITY, PRICE_PRECISION,
    TICK_INTERVAL_MS, WRITE_TIMEOUT_MS,
};

/// Parsed command-line arguments.
#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Address to listen on for subscribers.
    #[clap(long, default_value = DEFAULT_BIND_ADDRESS)]
    pub bind: String,

    /// JSON file mapping every known symbol to its initial price.
    #[clap(long, default_value = DEFAULT_CATALOG_PATH)]
    pub catalog: PathBuf,

    /// Period between price ticks, in milliseconds.
    #[clap(long, default_value_t = TICK_INTERVAL_MS, value_parser = clap::value_parser!(u64).range(1..))]
    pub tick_interval_ms: u64,

    /// Decimal places prices are rounded to on the wire.
    #[clap(long, default_value_t = PRICE_PRECISION, value_parser = clap::value_parser!(u32).range(0..=8))]
    pub precision: u32,

    /// Messages a connection may have queued before it is dropped as too slow.
    #[clap(long, default_value_t = OUTBOX_CAPACITY)]
    pub outbox_capacity: usize,

    /// Upper bound for a single socket write, in milliseconds.
    #[clap(long, default_value_t = WRITE_TIMEOUT_MS, value_parser = clap::value_parser!(u64).range(1..))]
    pub write_timeout_ms: u64,
}
