//! Last known price per symbol and per-tick snapshot production.

use log::warn;
use price_common::config::round_price;
use price_common::{PriceMap, SymbolCatalog};

use crate::model::price_source::{PriceSource, PriceSourceError};

/// Unrounded last price of every known symbol.
///
/// Prices evolve from the full-precision value; only the snapshot handed to
/// the broadcaster is rounded to `precision` decimals.
#[derive(Debug, Clone)]
pub struct PriceBook {
    prices: PriceMap,
    precision: u32,
}

impl PriceBook {
    /// Seed the book with the catalog's initial prices.
    pub fn new(catalog: &SymbolCatalog, precision: u32) -> Self {
        Self {
            prices: catalog.prices().clone(),
            precision,
        }
    }

    /// Pull one new price per symbol from `source` and return the rounded snapshot.
    ///
    /// A symbol whose source call fails keeps its previous price and is absent
    /// from the returned snapshot.
    pub fn advance(&mut self, source: &dyn PriceSource) -> PriceMap {
        let precision = self.precision;
        let mut snapshot = PriceMap::new();

        for (symbol, price) in self.prices.iter_mut() {
            let next = source.next(symbol, *price).and_then(|next| {
                if next.is_finite() {
                    Ok(next)
                } else {
                    Err(PriceSourceError::NonFinite {
                        symbol: symbol.clone(),
                        price: next,
                    })
                }
            });
            match next {
                Ok(next) => {
                    *price = next;
                    snapshot.insert(symbol.clone(), round_price(next, precision));
                }
                Err(e) => warn!("Skipping {} this tick: {}", symbol, e),
            }
        }
        snapshot
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::HashMap;

    /// Returns fixed prices; symbols without an entry fail.
    pub(crate) struct ScriptedSource {
        prices: HashMap<String, f64>,
    }

    impl ScriptedSource {
        pub(crate) fn new(prices: &[(&str, f64)]) -> Self {
            Self {
                prices: prices.iter().map(|(s, p)| (s.to_string(), *p)).collect(),
            }
        }
    }

    impl PriceSource for ScriptedSource {
        fn next(&self, symbol: &str, _previous: f64) -> Result<f64, PriceSourceError> {
            self.prices
                .get(symbol)
                .copied()
                .ok_or_else(|| PriceSourceError::Unavailable(symbol.to_string()))
        }
    }

    /// Adds a fixed amount to the previous price.
    struct Drift(f64);

    impl PriceSource for Drift {
        fn next(&self, _symbol: &str, previous: f64) -> Result<f64, PriceSourceError> {
            Ok(previous + self.0)
        }
    }

    pub(crate) fn catalog(prices: &[(&str, f64)]) -> SymbolCatalog {
        SymbolCatalog::new(prices.iter().map(|(s, p)| (s.to_string(), *p)).collect()).unwrap()
    }

    #[test]
    fn snapshot_covers_every_symbol() {
        let mut book = PriceBook::new(&catalog(&[("AAPL", 100.0), ("MSFT", 200.0)]), 2);
        let source = ScriptedSource::new(&[("AAPL", 100.50), ("MSFT", 199.80)]);

        let snapshot = book.advance(&source);
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot["AAPL"], 100.5);
        assert_eq!(snapshot["MSFT"], 199.8);
    }

    #[test]
    fn failing_symbol_is_omitted_and_keeps_price() {
        let mut book = PriceBook::new(&catalog(&[("AAPL", 100.0), ("MSFT", 200.0)]), 2);
        let source = ScriptedSource::new(&[("AAPL", 101.0)]);

        let snapshot = book.advance(&source);
        assert_eq!(snapshot.keys().collect::<Vec<_>>(), ["AAPL"]);

        let next = book.advance(&Drift(1.0));
        assert_eq!(next["MSFT"], 201.0);
        assert_eq!(next["AAPL"], 102.0);
    }

    #[test]
    fn wire_price_is_rounded_but_book_is_not() {
        let mut book = PriceBook::new(&catalog(&[("AAPL", 100.0)]), 2);
        let source = ScriptedSource::new(&[("AAPL", 100.123_456)]);

        let snapshot = book.advance(&source);
        assert_eq!(snapshot["AAPL"], 100.12);

        // 100.123456 + 0.004 rounds up only if the unrounded price was kept.
        let next = book.advance(&Drift(0.004));
        assert_eq!(next["AAPL"], 100.13);
    }

    #[test]
    fn nan_from_source_is_skipped() {
        let mut book = PriceBook::new(&catalog(&[("AAPL", 100.0)]), 2);
        let source = ScriptedSource::new(&[("AAPL", f64::NAN)]);

        assert!(book.advance(&source).is_empty());
        assert_eq!(book.advance(&Drift(0.5))["AAPL"], 100.5);
    }
}
