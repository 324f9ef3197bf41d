//! Domain models for the price server.
//!
//! - `price_source`: the price generation seam and the default random walk.
//! - `price_book`: last prices per symbol and rounded snapshot production.

pub mod price_book;
pub mod price_source;
