//! Transaction: one trade produced by a clear

use std::fmt;

use crate::{AgentId, MarketId, MarketTime, OrderId, OrderRef, Price, Quantity};

/// A trade between a buy and a sell order, stamped with the market time of
/// the clear that produced it. Immutable once created.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Transaction {
    pub market: MarketId,
    pub buyer: AgentId,
    pub seller: AgentId,
    pub buy_order: OrderId,
    pub sell_order: OrderId,
    pub quantity: Quantity,
    pub price: Price,
    /// Execution point
    pub time: MarketTime,
}

impl Transaction {
    #[inline]
    pub fn buy_ref(&self) -> OrderRef {
        OrderRef::new(self.market, self.buy_order)
    }

    #[inline]
    pub fn sell_ref(&self) -> OrderRef {
        OrderRef::new(self.market, self.sell_order)
    }

    /// Price × quantity, in price units.
    #[inline]
    pub fn notional(&self) -> i64 {
        self.price.0.saturating_mul(self.quantity as i64)
    }
}

impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} @ {}: {} sold {} to {} at {}",
            self.market, self.time, self.seller, self.quantity, self.buyer, self.price
        )
    }
}
