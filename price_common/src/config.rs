//! Default tunables shared by the server and client binaries.
//!
//! The tick interval and the coalescing window are deliberately different:
//! the server publishes every `TICK_INTERVAL_MS` while the client hands at most
//! one batch per `COALESCE_WINDOW_MS` to its consumer. Raising the window lowers
//! render load at the cost of latency; lowering it does the opposite.

/// Default address the server listens on.
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8080";
/// Default address the client connects to.
pub const DEFAULT_SERVER_ADDRESS: &str = "127.0.0.1:8080";
/// Default path of the symbol catalog file.
pub const DEFAULT_CATALOG_PATH: &str = "stock_list.json";

/// Period between two ticks of the price scheduler.
pub const TICK_INTERVAL_MS: u64 = 25;
/// Number of decimal places prices are rounded to on the wire.
pub const PRICE_PRECISION: u32 = 2;
/// Capacity of a connection's outbound queue, in messages.
pub const OUTBOX_CAPACITY: usize = 256;
/// Upper bound for a single socket write on the server.
pub const WRITE_TIMEOUT_MS: u64 = 1000;

/// Longest line either side accepts before giving up on the peer.
pub const MAX_LINE_BYTES: usize = 64 * 1024;

/// Client-side coalescing window.
pub const COALESCE_WINDOW_MS: u64 = 100;
/// Base delay of the reconnect backoff.
pub const RECONNECT_BASE_MS: u64 = 1000;
/// Ceiling of the reconnect backoff.
pub const RECONNECT_CAP_MS: u64 = 30_000;
/// Upper bound for establishing a TCP connection.
pub const CONNECT_TIMEOUT_MS: u64 = 3000;

/// Round `price` to `precision` decimal places.
pub fn round_price(price: f64, precision: u32) -> f64 {
    let factor = 10f64.powi(precision as i32);
    (price * factor).round() / factor
}
