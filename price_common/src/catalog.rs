//! Known-symbol catalog and symbol list parsing.
//!
//! The catalog is a JSON object mapping every known symbol to its initial
//! price, e.g. `{"AAPL": 150.0, "MSFT": 300.0}`. The server seeds its price book
//! from it; the client fetches it once at startup to show initial prices.
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};

use log::debug;

use crate::error::StreamError;
use crate::protocol::{PriceMap, Symbol};
use crate::result::Result;

/// Source of the known-symbol catalog.
pub trait CatalogSource {
    /// Retrieves the full symbol → initial price mapping.
    fn fetch(&self) -> Result<SymbolCatalog>;
}

/// Immutable set of known symbols with their initial prices.
#[derive(Debug, Clone, PartialEq)]
pub struct SymbolCatalog {
    prices: PriceMap,
}

impl SymbolCatalog {
    /// Builds a catalog, rejecting empty catalogs and non-positive or non-finite prices.
    pub fn new(prices: PriceMap) -> Result<Self> {
        if prices.is_empty() {
            return Err(StreamError::Catalog("catalog contains no symbols".to_string()));
        }
        for (symbol, price) in &prices {
            if symbol.trim().is_empty() {
                return Err(StreamError::Catalog("empty symbol name".to_string()));
            }
            if !price.is_finite() || *price <= 0.0 {
                return Err(StreamError::Catalog(format!(
                    "invalid initial price {} for {}",
                    price, symbol
                )));
            }
        }
        Ok(Self { prices })
    }

    /// Parses a catalog from a JSON object.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let prices: PriceMap = serde_json::from_reader(reader)
            .map_err(|e| StreamError::Catalog(format!("malformed catalog: {}", e)))?;
        Self::new(prices)
    }

    /// Known symbols in sorted order.
    pub fn symbols(&self) -> impl Iterator<Item = &Symbol> {
        self.prices.keys()
    }

    /// Initial price of `symbol`, if known.
    pub fn initial_price(&self, symbol: &str) -> Option<f64> {
        self.prices.get(symbol).copied()
    }

    /// Whether `symbol` is part of the catalog.
    pub fn contains(&self, symbol: &str) -> bool {
        self.prices.contains_key(symbol)
    }

    /// Full symbol → initial price mapping.
    pub fn prices(&self) -> &PriceMap {
        &self.prices
    }

    /// Number of known symbols.
    pub fn len(&self) -> usize {
        self.prices.len()
    }

    /// Always `false` for a constructed catalog; provided for API completeness.
    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }
}

/// Catalog stored as a JSON file on disk.
#[derive(Debug, Clone)]
pub struct FileCatalog {
    path: PathBuf,
}

impl FileCatalog {
    /// Creates a source reading from `path`.
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl CatalogSource for FileCatalog {
    fn fetch(&self) -> Result<SymbolCatalog> {
        debug!("Loading symbol catalog from {:?}", self.path);
        let file = File::open(&self.path).map_err(|e| {
            StreamError::Catalog(format!("cannot open {}: {}", self.path.display(), e))
        })?;
        SymbolCatalog::from_reader(BufReader::new(file))
    }
}

/// Parses a list of symbols separated by commas, whitespace or new lines.
///
/// Symbols are opaque and kept exactly as written; duplicates are dropped
/// while keeping first-seen order.
pub fn parse_symbol_list<R: BufRead>(reader: R) -> Result<Vec<Symbol>> {
    let mut symbols: Vec<Symbol> = Vec::new();
    for line in reader.lines() {
        let line = line?;
        for token in line.split(|c: char| c == ',' || c.is_whitespace()) {
            let symbol = token.trim();
            if !symbol.is_empty() && !symbols.iter().any(|known| known == symbol) {
                symbols.push(symbol.to_string());
            }
        }
    }
    Ok(symbols)
}
