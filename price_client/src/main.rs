//! Price Client: connects to the price server, subscribes to a set of symbols
//! and prints coalesced price batches until Ctrl+C.
//!
//! Usage example (CLI):
//! ```bash
//! price_client --server 127.0.0.1:8080 --symbols AAPL,MSFT --path ./symbols.txt
//! ```
//!
//! The connection is kept alive by a `StreamSession`: when it drops, the client
//! reconnects with exponential backoff and re-sends its subscription. Updates
//! arriving faster than the coalescing window are merged so the console shows at
//! most one batch per window.
#![warn(missing_docs)]
mod args;
mod backoff;
mod coalesce;
mod consumer;
mod session;
mod state;
mod transport;

use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use log::{info, warn};
use price_common::catalog::parse_symbol_list;
use price_common::{CatalogSource, FileCatalog, Result, StreamError, Symbol};

use crate::args::Args;
use crate::consumer::ConsoleConsumer;
use crate::session::{SessionConfig, StreamSession};
use crate::transport::TcpConnector;

fn main() -> Result<(), StreamError> {
    init_logger();
    let args = Args::parse();

    let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded(1);
    ctrlc::set_handler(move || {
        info!("Ctrl+C received. Shutting down client...");
        let _ = shutdown_tx.try_send(());
    })
    .expect("Error setting Ctrl+C handler");

    let catalog = FileCatalog::new(&args.catalog).fetch()?;
    let symbols = requested_symbols(&args)?;
    for symbol in symbols.iter().filter(|s| !catalog.contains(s)) {
        warn!("{} is not in the catalog; subscribing anyway", symbol);
    }
    if symbols.is_empty() {
        warn!("No symbols requested; pass --symbols or --path to receive prices");
    } else {
        info!("Symbols: {:?}", symbols);
    }

    let config = SessionConfig {
        coalesce_window: Duration::from_millis(args.coalesce_window_ms),
        reconnect_base: Duration::from_millis(args.reconnect_base_ms),
        reconnect_cap: Duration::from_millis(args.reconnect_cap_ms),
        max_reconnect_attempts: args.max_reconnect_attempts,
    };
    let connector = TcpConnector::new(
        args.server.clone(),
        Duration::from_millis(args.connect_timeout_ms),
    );
    info!("Connecting to price server at {}", args.server);
    let session = StreamSession::start(connector, ConsoleConsumer::new(&catalog), config)?;
    session.subscribe(symbols)?;

    info!("Client is running. Press Ctrl+C to exit.");
    shutdown_rx
        .recv()
        .map_err(|e| StreamError::ChannelRecv(e.to_string()))?;
    session.stop();
    Ok(())
}

fn init_logger() {
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();
}

/// Symbols from `--symbols` followed by those in `--path`, de-duplicated.
fn requested_symbols(args: &Args) -> Result<Vec<Symbol>> {
    let mut text = args.symbols.join(",");
    if let Some(raw) = &args.path {
        let path = normalize_path(raw);
        let from_file = parse_symbol_list(BufReader::new(File::open(&path)?))?;
        text.push(',');
        text.push_str(&from_file.join(","));
    }
    parse_symbol_list(text.as_bytes())
}

/// Normalize a CLI-provided path string by trimming whitespace and matching quotes.
///
/// This allows passing Windows paths in quotes without breaking parsing.
fn normalize_path(raw: &str) -> PathBuf {
    let trimmed = raw.trim();
    let no_quotes = trimmed
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(trimmed);
    PathBuf::from(no_quotes)
}
