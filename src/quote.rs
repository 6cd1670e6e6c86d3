//! Quote: one market's best bid and ask at a point in market time

use std::fmt;

use crate::{MarketId, MarketTime, Price, Quantity};

/// Best bid/ask of one market, with the quantity resting at each price.
///
/// A missing side is `None`. Quotes are recomputed after every
/// book-changing operation, never patched.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Quote {
    pub market: MarketId,
    pub bid: Option<Price>,
    pub bid_quantity: Quantity,
    pub ask: Option<Price>,
    pub ask_quantity: Quantity,
    /// When the quote was computed
    pub time: MarketTime,
}

impl Quote {
    /// A quote with neither side, before the market has done anything.
    pub fn empty(market: MarketId) -> Self {
        Self {
            market,
            bid: None,
            bid_quantity: 0,
            ask: None,
            ask_quantity: 0,
            time: MarketTime::default(),
        }
    }

    /// `ask - bid`, or infinity when either side is missing.
    pub fn spread(&self) -> f64 {
        match (self.bid, self.ask) {
            (Some(bid), Some(ask)) => ask.as_f64() - bid.as_f64(),
            _ => f64::INFINITY,
        }
    }

    /// Midpoint of bid and ask, or NaN when either side is missing.
    pub fn midquote(&self) -> f64 {
        match (self.bid, self.ask) {
            (Some(bid), Some(ask)) => (bid.as_f64() + ask.as_f64()) / 2.0,
            _ => f64::NAN,
        }
    }

    #[inline]
    pub fn is_defined(&self) -> bool {
        self.bid.is_some() && self.ask.is_some()
    }
}

impl fmt::Display for Quote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (", self.market)?;
        match self.bid {
            Some(bid) => write!(f, "Bid: {} @ {}", self.bid_quantity, bid)?,
            None => write!(f, "Bid: -")?,
        }
        match self.ask {
            Some(ask) => write!(f, ", Ask: {} @ {})", self.ask_quantity, ask),
            None => write!(f, ", Ask: -)"),
        }
    }
}
