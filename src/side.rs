//! Order side: Buy or Sell, and the price comparisons that depend on it

use std::fmt;

use crate::{MarketTime, Price};

/// Side of an order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// Returns the opposite side.
    #[inline]
    pub fn opposite(self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }

    /// Whether an opposing price is acceptable to an order of this side
    /// limited at `limit`.
    ///
    /// A buy at 10 crosses a sell at 9 or 10; a sell at 10 crosses a buy at
    /// 10 or 11.
    #[inline]
    pub fn crosses(self, limit: Price, opposing: Price) -> bool {
        match self {
            Side::Buy => opposing <= limit,
            Side::Sell => opposing >= limit,
        }
    }

    /// Whether `a` has strictly higher priority than `b` on this side:
    /// a better price, or the same price submitted earlier.
    #[inline]
    pub fn outranks(self, a: (Price, MarketTime), b: (Price, MarketTime)) -> bool {
        let better_price = match self {
            Side::Buy => a.0 > b.0,
            Side::Sell => a.0 < b.0,
        };
        better_price || (a.0 == b.0 && a.1 < b.1)
    }

    /// The better of two prices from this side's point of view
    /// (higher for buys, lower for sells).
    #[inline]
    pub fn better(self, a: Price, b: Price) -> Price {
        match self {
            Side::Buy => a.max(b),
            Side::Sell => a.min(b),
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}
