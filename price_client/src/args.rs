//! Command-line arguments for the price client.
//!
//! This module defines the CLI interface using `clap`. See `main` for end-to-end usage.
use std::path::PathBuf;

use clap::Parser;
use price_common::config::{
    COALESCE_WINDOW_MS, CONNECT_TIMEOUT_MS, DEFAULT_CATALOG_PATH, DEFAULT_SERVER_ADDRESS,
    RECONNECT_BASE_MS, RECONNECT_CAP_MS,
};

/// Parsed command-line arguments.
#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Address of the price server.
    #[clap(long, default_value = DEFAULT_SERVER_ADDRESS)]
    pub server: String,

    /// JSON file mapping every known symbol to its initial price.
    #[clap(long, default_value = DEFAULT_CATALOG_PATH)]
    pub catalog: PathBuf,

    /// Symbols to subscribe to, comma separated.
    #[clap(long, value_delimiter = ',')]
    pub symbols: Vec<String>,

    /// Path to a text file with symbols to subscribe to.
    /// Symbols may be separated by commas, spaces, or new lines.
    #[clap(long)]
    pub path: Option<String>,

    /// Window over which updates are merged before they are shown.
    #[clap(long, default_value_t = COALESCE_WINDOW_MS, value_parser = clap::value_parser!(u64).range(1..))]
    pub coalesce_window_ms: u64,

    /// Base delay of the reconnect backoff.
    #[clap(long, default_value_t = RECONNECT_BASE_MS, value_parser = clap::value_parser!(u64).range(1..))]
    pub reconnect_base_ms: u64,

    /// Longest single wait between reconnect attempts.
    #[clap(long, default_value_t = RECONNECT_CAP_MS, value_parser = clap::value_parser!(u64).range(1..))]
    pub reconnect_cap_ms: u64,

    /// Stop retrying after this many consecutive failures. Retries forever when omitted.
    #[clap(long)]
    pub max_reconnect_attempts: Option<u32>,

    /// Upper bound for establishing the TCP connection.
    #[clap(long, default_value_t = CONNECT_TIMEOUT_MS, value_parser = clap::value_parser!(u64).range(1..))]
    pub connect_timeout_ms: u64,
}
