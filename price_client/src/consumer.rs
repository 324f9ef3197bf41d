//! Console rendering of the price stream.
use std::collections::HashMap;

use chrono::Local;
use log::{error, info, warn};
use price_common::{PriceMap, Symbol, SymbolCatalog};

use crate::session::{ConnectionStatus, PriceConsumer};

/// Logs every flushed batch together with the change since the last one.
///
/// Reference prices start at the catalog's initial values, so the first
/// batch already shows a meaningful change.
pub struct ConsoleConsumer {
    last: HashMap<Symbol, f64>,
}

impl ConsoleConsumer {
    /// Seed reference prices from `catalog`.
    pub fn new(catalog: &SymbolCatalog) -> Self {
        Self {
            last: catalog
                .prices()
                .iter()
                .map(|(symbol, price)| (symbol.clone(), *price))
                .collect(),
        }
    }

    fn change(&mut self, symbol: &Symbol, price: f64) -> Option<f64> {
        self.last
            .insert(symbol.clone(), price)
            .map(|previous| price - previous)
    }
}

impl PriceConsumer for ConsoleConsumer {
    fn on_update(&mut self, prices: PriceMap) {
        let at = Local::now().format("%H:%M:%S%.3f");
        for (symbol, price) in &prices {
            match self.change(symbol, *price) {
                Some(delta) => info!("[{}] {:<6} {:>10.2} ({:+.2})", at, symbol, price, delta),
                None => info!("[{}] {:<6} {:>10.2}", at, symbol, price),
            }
        }
    }

    fn on_connection_status(&mut self, status: ConnectionStatus) {
        let message = status.message.as_deref().unwrap_or("");
        match (status.connected, status.will_retry) {
            (true, _) => info!("Connected to price server {}", message),
            (false, true) => warn!("{}", message),
            (false, false) => error!("{} Restart the client to try again.", message),
        }
    }

    fn on_error(&mut self, message: &str) {
        warn!("Server reported: {}", message);
    }
}
