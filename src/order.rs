//! Order representation and its unmatched/matched counters

use crate::{AgentId, MarketId, MarketTime, OrderId, OrderRef, Price, Quantity, Side};

/// An order resting in (or retired from) a market's four-heap.
///
/// Everything but the two counters is fixed at submission. The counters are
/// only touched by the matching engine: `unmatched` is quantity with no
/// counterparty yet, `matched` is quantity paired with crossing interest that
/// will trade on the next clear.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Order {
    /// Slot in the owning market's arena
    pub id: OrderId,
    /// Market that accepted the order
    pub market: MarketId,
    /// Agent that submitted the order
    pub agent: AgentId,
    pub side: Side,
    /// Limit price (max for buy, min for sell)
    pub price: Price,
    /// Submission point: kernel tick plus market sequence
    pub submitted: MarketTime,
    /// Quantity when submitted
    pub original_quantity: Quantity,
    pub(crate) unmatched: Quantity,
    pub(crate) matched: Quantity,
    executed: Quantity,
    withdrawn: Quantity,
}

impl Order {
    /// Create an order with its whole quantity unmatched.
    pub fn new(
        market: MarketId,
        agent: AgentId,
        side: Side,
        price: Price,
        quantity: Quantity,
        submitted: MarketTime,
    ) -> Self {
        Self {
            id: OrderId(0),
            market,
            agent,
            side,
            price,
            submitted,
            original_quantity: quantity,
            unmatched: quantity,
            matched: 0,
            executed: 0,
            withdrawn: 0,
        }
    }

    /// Simulation-wide handle of this order.
    #[inline]
    pub fn handle(&self) -> OrderRef {
        OrderRef::new(self.market, self.id)
    }

    /// Quantity with no counterparty yet.
    #[inline]
    pub fn unmatched(&self) -> Quantity {
        self.unmatched
    }

    /// Quantity paired and awaiting the next clear.
    #[inline]
    pub fn matched(&self) -> Quantity {
        self.matched
    }

    /// Outstanding quantity: `unmatched + matched`.
    #[inline]
    pub fn quantity(&self) -> Quantity {
        self.unmatched + self.matched
    }

    /// Quantity that has traded.
    #[inline]
    pub fn executed(&self) -> Quantity {
        self.executed
    }

    /// Quantity that has been withdrawn.
    #[inline]
    pub fn withdrawn(&self) -> Quantity {
        self.withdrawn
    }

    /// An inert order has nothing outstanding and never will again.
    #[inline]
    pub fn is_inert(&self) -> bool {
        self.quantity() == 0
    }

    // === Counter transitions (matching engine only) ===

    pub(crate) fn match_units(&mut self, quantity: Quantity) {
        debug_assert!(quantity <= self.unmatched);
        self.unmatched -= quantity;
        self.matched += quantity;
    }

    pub(crate) fn unmatch_units(&mut self, quantity: Quantity) {
        debug_assert!(quantity <= self.matched);
        self.matched -= quantity;
        self.unmatched += quantity;
    }

    pub(crate) fn withdraw_unmatched(&mut self, quantity: Quantity) {
        debug_assert!(quantity <= self.unmatched);
        self.unmatched -= quantity;
        self.withdrawn += quantity;
    }

    pub(crate) fn withdraw_matched(&mut self, quantity: Quantity) {
        debug_assert!(quantity <= self.matched);
        self.matched -= quantity;
        self.withdrawn += quantity;
    }

    pub(crate) fn execute(&mut self, quantity: Quantity) {
        debug_assert!(quantity <= self.matched);
        self.matched -= quantity;
        self.executed += quantity;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Tick;

    fn make_order(quantity: Quantity) -> Order {
        Order::new(
            MarketId(0),
            AgentId(1),
            Side::Buy,
            Price(100_000),
            quantity,
            MarketTime::new(Tick(1), 1),
        )
    }

    fn conserved(order: &Order) -> bool {
        order.original_quantity
            == order.unmatched() + order.matched() + order.executed() + order.withdrawn()
    }

    #[test]
    fn new_order_is_fully_unmatched() {
        let order = make_order(10);
        assert_eq!(order.unmatched(), 10);
        assert_eq!(order.matched(), 0);
        assert_eq!(order.quantity(), 10);
        assert!(!order.is_inert());
    }

    #[test]
    fn match_and_unmatch() {
        let mut order = make_order(10);
        order.match_units(4);
        assert_eq!((order.unmatched(), order.matched()), (6, 4));
        order.unmatch_units(1);
        assert_eq!((order.unmatched(), order.matched()), (7, 3));
        assert_eq!(order.quantity(), 10);
        assert!(conserved(&order));
    }

    #[test]
    fn execution_and_withdrawal_drain_to_inert() {
        let mut order = make_order(10);
        order.match_units(6);
        order.execute(6);
        order.withdraw_unmatched(4);
        assert!(order.is_inert());
        assert_eq!(order.executed(), 6);
        assert_eq!(order.withdrawn(), 4);
        assert!(conserved(&order));
    }

    #[test]
    fn handle_names_market_and_slot() {
        let mut order = make_order(1);
        order.id = OrderId(12);
        assert_eq!(order.handle(), OrderRef::new(MarketId(0), OrderId(12)));
    }
}
