//! Price source seam and the default random-walk implementation.
//!
//! The scheduler calls [`PriceSource::next`] once per known symbol per tick.
//! A source reports a failure for a symbol through `PriceSourceError`; the
//! scheduler then leaves that symbol out of the tick instead of stopping.

use rand::Rng;
use thiserror::Error;

/// Failure to produce a price for a single symbol.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PriceSourceError {
    /// The source has no price for the symbol this tick.
    #[error("price unavailable for {0}")]
    Unavailable(String),

    /// The source produced NaN or an infinite value.
    #[error("non-finite price {price} for {symbol}")]
    NonFinite {
        /// Symbol the value was produced for.
        symbol: String,
        /// Offending value.
        price: f64,
    },
}

/// Maps a symbol and its previous price to the next price.
pub trait PriceSource: Send {
    /// Produce the next price for `symbol`, given the last unrounded price.
    fn next(&self, symbol: &str, previous: f64) -> Result<f64, PriceSourceError>;
}

/// Uniform random walk: each tick moves the price by up to `max_step` (relative)
/// in either direction, never below `floor`.
#[derive(Debug, Clone)]
pub struct RandomWalk {
    max_step: f64,
    floor: f64,
}

impl RandomWalk {
    /// Creates a walk with the given relative step and minimum price.
    pub fn new(max_step: f64, floor: f64) -> Self {
        Self { max_step, floor }
    }
}

impl Default for RandomWalk {
    fn default() -> Self {
        Self::new(0.01, 0.01)
    }
}

impl PriceSource for RandomWalk {
    fn next(&self, symbol: &str, previous: f64) -> Result<f64, PriceSourceError> {
        let mut rng = rand::rng();
        let change: f64 = rng.random_range(-self.max_step..self.max_step);
        let price = (previous * (1.0 + change)).max(self.floor);
        if price.is_finite() {
            Ok(price)
        } else {
            Err(PriceSourceError::NonFinite {
                symbol: symbol.to_string(),
                price,
            })
        }
    }
}
