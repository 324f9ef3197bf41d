//!
//! Common types and utilities shared by the price server and client.
//!
//! This crate aggregates:
//! - `error`: unified error type `StreamError` used across the workspace.
//! - `result`: handy `Result<T, StreamError>` alias.
//! - `protocol`: JSON wire messages and the single decoding point for each direction.
//! - `catalog`: known-symbol catalog and symbol list parsing.
//! - `config`: default tunables and price rounding.
//! - `framing`: bounded newline-delimited reading of the byte stream.
#![warn(missing_docs)]
pub mod catalog;
pub mod config;
pub mod error;
pub mod framing;
pub mod protocol;
pub mod result;

pub use catalog::{CatalogSource, FileCatalog, SymbolCatalog};
pub use error::StreamError;
pub use protocol::{PriceMap, Symbol};
pub use result::Result;
