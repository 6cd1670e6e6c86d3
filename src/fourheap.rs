//! FourHeap: price-time matching with constant-time quotes.
//!
//! Orders are split across four priority queues:
//! - unmatched buys, best (highest price, earliest) first
//! - matched buys, worst (lowest price, earliest) first
//! - unmatched sells, best (lowest price, earliest) first
//! - matched sells, worst (highest price, earliest) first
//!
//! Matched quantity is quantity that would trade if the book cleared now.
//! Keeping the matched set maximal on every insert and withdraw means the bid
//! and ask can be read off the heap tops, and a clear only has to pair the
//! matched sets off against each other.
//!
//! The heaps hold handles into an order arena, never the orders themselves.
//! Orders stay in the arena after they go inert so that history lookups keep
//! working.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::error::{Error, Result};
use crate::{MarketId, MarketTime, Order, OrderId, OrderRef, Price, Quantity, Side};

/// A buy and a sell paired off by a clear, with the quantity they trade.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MatchedPair {
    pub buy: OrderId,
    pub sell: OrderId,
    pub quantity: Quantity,
}

// === Heap entries ===

/// Heap entry. `rank` is the price, negated for heaps that surface the
/// lowest price first, so every heap is a max-heap on (rank, -time).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Ranked {
    rank: i64,
    time: MarketTime,
    id: OrderId,
    price: Price,
}

impl Ord for Ranked {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank
            .cmp(&other.rank)
            .then_with(|| other.time.cmp(&self.time))
            .then_with(|| other.id.cmp(&self.id))
    }
}

impl PartialOrd for Ranked {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Clone, Debug)]
struct Heap {
    entries: BinaryHeap<Ranked>,
    high_first: bool,
}

impl Heap {
    fn new(high_first: bool) -> Self {
        Self {
            entries: BinaryHeap::new(),
            high_first,
        }
    }

    fn push(&mut self, order: &Order) {
        let rank = if self.high_first {
            order.price.0
        } else {
            order.price.0.saturating_neg()
        };
        self.entries.push(Ranked {
            rank,
            time: order.submitted,
            id: order.id,
            price: order.price,
        });
    }

    #[inline]
    fn peek(&self) -> Option<(OrderId, Price)> {
        self.entries.peek().map(|e| (e.id, e.price))
    }

    #[inline]
    fn peek_price(&self) -> Option<Price> {
        self.entries.peek().map(|e| e.price)
    }

    #[inline]
    fn pop(&mut self) {
        self.entries.pop();
    }

    /// O(n): rebuilds the heap without `id`.
    fn remove(&mut self, id: OrderId) {
        self.entries.retain(|e| e.id != id);
    }

    fn ids(&self) -> impl Iterator<Item = OrderId> + '_ {
        self.entries.iter().map(|e| e.id)
    }

    fn clear(&mut self) {
        self.entries.clear();
    }
}

/// The four heaps seen from one side: the inserted or withdrawn order's own
/// heaps and the opposing ones.
struct Sides<'a> {
    own_unmatched: &'a mut Heap,
    own_matched: &'a mut Heap,
    other_unmatched: &'a mut Heap,
    other_matched: &'a mut Heap,
}

// === FourHeap ===

/// The matching engine of one market.
#[derive(Clone, Debug)]
pub struct FourHeap {
    market: MarketId,
    /// Every order ever inserted, indexed by `OrderId`
    orders: Vec<Order>,
    buy_unmatched: Heap,
    buy_matched: Heap,
    sell_unmatched: Heap,
    sell_matched: Heap,
    /// Outstanding quantity over all orders
    size: Quantity,
}

impl FourHeap {
    /// Create an empty engine for `market`.
    pub fn new(market: MarketId) -> Self {
        Self {
            market,
            orders: Vec::new(),
            buy_unmatched: Heap::new(true),
            buy_matched: Heap::new(false),
            sell_unmatched: Heap::new(false),
            sell_matched: Heap::new(true),
            size: 0,
        }
    }

    fn split(&mut self, side: Side) -> (&mut [Order], Sides<'_>) {
        let FourHeap {
            orders,
            buy_unmatched,
            buy_matched,
            sell_unmatched,
            sell_matched,
            ..
        } = self;
        let sides = match side {
            Side::Buy => Sides {
                own_unmatched: buy_unmatched,
                own_matched: buy_matched,
                other_unmatched: sell_unmatched,
                other_matched: sell_matched,
            },
            Side::Sell => Sides {
                own_unmatched: sell_unmatched,
                own_matched: sell_matched,
                other_unmatched: buy_unmatched,
                other_matched: buy_matched,
            },
        };
        (orders.as_mut_slice(), sides)
    }

    fn unknown(&self, id: OrderId) -> Error {
        Error::UnknownOrder(OrderRef::new(self.market, id))
    }

    // === Insert ===

    /// Insert a fresh order and return its handle. O(log n) heap work.
    ///
    /// The order first pairs with crossing unmatched interest on the other
    /// side, then displaces strictly lower-priority matched orders on its own
    /// side, alternating until neither applies. Whatever is left rests
    /// unmatched.
    pub fn insert(&mut self, mut order: Order) -> Result<OrderId> {
        if order.original_quantity == 0 {
            return Err(Error::NonPositiveQuantity);
        }
        let id = OrderId(self.orders.len());
        order.id = id;
        order.market = self.market;
        order.unmatched = order.original_quantity;
        order.matched = 0;
        let side = order.side;
        let key = (order.price, order.submitted);
        self.size += order.original_quantity;
        self.orders.push(order);

        let (orders, heaps) = self.split(side);
        let me = id.0;
        while orders[me].unmatched > 0 {
            // Pair with the best crossing opposing order, unless a worse
            // matched order on our own side should be displaced instead.
            if let Some((other, other_price)) = heaps.other_unmatched.peek() {
                let crosses = side.crosses(key.0, other_price)
                    && heaps
                        .own_matched
                        .peek_price()
                        .is_none_or(|worst| side.crosses(worst, other_price));
                if crosses {
                    let other = other.0;
                    if orders[other].matched == 0 {
                        heaps.other_matched.push(&orders[other]);
                    }
                    let quantity = orders[me].unmatched.min(orders[other].unmatched);
                    orders[me].match_units(quantity);
                    orders[other].match_units(quantity);
                    if orders[other].unmatched == 0 {
                        heaps.other_unmatched.pop();
                    }
                    continue;
                }
            }

            // Take the place of our side's worst matched order.
            if let Some((worst, _)) = heaps.own_matched.peek() {
                let worst = worst.0;
                let worst_key = (orders[worst].price, orders[worst].submitted);
                if side.outranks(key, worst_key) {
                    if orders[worst].unmatched == 0 {
                        heaps.own_unmatched.push(&orders[worst]);
                    }
                    let quantity = orders[me].unmatched.min(orders[worst].matched);
                    orders[worst].unmatch_units(quantity);
                    orders[me].match_units(quantity);
                    if orders[worst].matched == 0 {
                        heaps.own_matched.pop();
                    }
                    continue;
                }
            }
            break;
        }

        if orders[me].unmatched > 0 {
            heaps.own_unmatched.push(&orders[me]);
        }
        if orders[me].matched > 0 {
            heaps.own_matched.push(&orders[me]);
        }
        Ok(id)
    }

    // === Withdraw ===

    /// Withdraw `quantity` from an order. O(n) because of heap removal.
    ///
    /// Unmatched quantity goes first. Matched quantity is released by handing
    /// its counterparty to the best crossing unmatched order on the same side
    /// when one exists, otherwise by unmatching the opposing side's worst
    /// matched order.
    pub fn withdraw(&mut self, id: OrderId, quantity: Quantity) -> Result<()> {
        let held = self.orders.get(id.0).ok_or_else(|| self.unknown(id))?.quantity();
        if quantity == 0 {
            return Err(Error::NonPositiveQuantity);
        }
        if quantity > held {
            return Err(Error::WithdrawExceedsOrder {
                requested: quantity,
                held,
            });
        }
        self.size -= quantity;

        let side = self.orders[id.0].side;
        let (orders, heaps) = self.split(side);
        let me = id.0;
        let mut remaining = quantity;

        if orders[me].unmatched > 0 {
            let take = remaining.min(orders[me].unmatched);
            orders[me].withdraw_unmatched(take);
            remaining -= take;
            if orders[me].unmatched == 0 {
                heaps.own_unmatched.remove(id);
            }
        }

        while remaining > 0 {
            // Hand our counterparty to a same-side order that still crosses
            // the opposing side's worst matched price.
            if let (Some((sub, sub_price)), Some(worst_opposing)) =
                (heaps.own_unmatched.peek(), heaps.other_matched.peek_price())
            {
                if side.crosses(sub_price, worst_opposing) {
                    let sub = sub.0;
                    if orders[sub].matched == 0 {
                        heaps.own_matched.push(&orders[sub]);
                    }
                    let quantity = remaining.min(orders[sub].unmatched);
                    orders[sub].match_units(quantity);
                    orders[me].withdraw_matched(quantity);
                    remaining -= quantity;
                    if orders[sub].unmatched == 0 {
                        heaps.own_unmatched.pop();
                    }
                    continue;
                }
            }

            // Otherwise release the opposing side's worst matched order.
            let Some((other, _)) = heaps.other_matched.peek() else {
                break;
            };
            let other = other.0;
            if orders[other].unmatched == 0 {
                heaps.other_unmatched.push(&orders[other]);
            }
            let quantity = remaining.min(orders[other].matched);
            orders[other].unmatch_units(quantity);
            orders[me].withdraw_matched(quantity);
            remaining -= quantity;
            if orders[other].matched == 0 {
                heaps.other_matched.pop();
            }
        }
        debug_assert_eq!(remaining, 0, "matched quantity without counterparty");

        if orders[me].matched == 0 {
            heaps.own_matched.remove(id);
        }
        Ok(())
    }

    // === Clear ===

    /// Pair off every matched buy against every matched sell, in priority
    /// order on both sides. O(m log m) in the number of matched orders.
    ///
    /// Empties both matched heaps. Returns no pairs when nothing crosses.
    pub fn clear(&mut self) -> Vec<MatchedPair> {
        let mut buys: Vec<OrderId> = self.buy_matched.ids().collect();
        let mut sells: Vec<OrderId> = self.sell_matched.ids().collect();
        self.buy_matched.clear();
        self.sell_matched.clear();

        let orders = &mut self.orders;
        let priority = |side: Side, a: &Order, b: &Order| {
            if side.outranks((a.price, a.submitted), (b.price, b.submitted)) {
                Ordering::Less
            } else if side.outranks((b.price, b.submitted), (a.price, a.submitted)) {
                Ordering::Greater
            } else {
                a.id.cmp(&b.id)
            }
        };
        buys.sort_by(|a, b| priority(Side::Buy, &orders[a.0], &orders[b.0]));
        sells.sort_by(|a, b| priority(Side::Sell, &orders[a.0], &orders[b.0]));

        let mut pairs = Vec::new();
        let (mut b, mut s) = (0, 0);
        while b < buys.len() && s < sells.len() {
            let (buy, sell) = (buys[b], sells[s]);
            let quantity = orders[buy.0].matched.min(orders[sell.0].matched);
            orders[buy.0].execute(quantity);
            orders[sell.0].execute(quantity);
            self.size -= 2 * quantity;
            pairs.push(MatchedPair {
                buy,
                sell,
                quantity,
            });
            if orders[buy.0].matched == 0 {
                b += 1;
            }
            if orders[sell.0].matched == 0 {
                s += 1;
            }
        }
        debug_assert!(b == buys.len() && s == sells.len(), "matched sides out of balance");
        pairs
    }

    // === Quotes ===

    /// Highest price a sell could be submitted at and still trade:
    /// the better of the worst matched sell and the best unmatched buy.
    #[inline]
    pub fn bid_quote(&self) -> Option<Price> {
        match (self.sell_matched.peek_price(), self.buy_unmatched.peek_price()) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        }
    }

    /// Lowest price a buy could be submitted at and still trade:
    /// the better of the worst matched buy and the best unmatched sell.
    #[inline]
    pub fn ask_quote(&self) -> Option<Price> {
        match (self.buy_matched.peek_price(), self.sell_unmatched.peek_price()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    // === Queries ===

    /// Market this engine belongs to.
    pub fn market(&self) -> MarketId {
        self.market
    }

    /// Outstanding quantity over all orders, matched and unmatched.
    #[inline]
    pub fn size(&self) -> Quantity {
        self.size
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Look up any order ever inserted, including inert ones.
    #[inline]
    pub fn order(&self, id: OrderId) -> Option<&Order> {
        self.orders.get(id.0)
    }

    /// Whether the order is still live in the book.
    pub fn contains(&self, id: OrderId) -> bool {
        self.order(id).is_some_and(|o| !o.is_inert())
    }

    /// Number of orders ever inserted.
    pub fn order_count(&self) -> usize {
        self.orders.len()
    }

    /// Orders holding matched quantity on `side`, in no particular order.
    pub fn matched_orders(&self, side: Side) -> impl Iterator<Item = &Order> + '_ {
        let heap = match side {
            Side::Buy => &self.buy_matched,
            Side::Sell => &self.sell_matched,
        };
        heap.ids().map(move |id| &self.orders[id.0])
    }

    /// Orders holding unmatched quantity on `side`, in no particular order.
    pub fn unmatched_orders(&self, side: Side) -> impl Iterator<Item = &Order> + '_ {
        let heap = match side {
            Side::Buy => &self.buy_unmatched,
            Side::Sell => &self.sell_unmatched,
        };
        heap.ids().map(move |id| &self.orders[id.0])
    }

    /// Total matched quantity on `side`.
    pub fn matched_quantity(&self, side: Side) -> Quantity {
        self.matched_orders(side).map(|o| o.matched).sum()
    }

    /// Check the ordering invariants between the four heaps: no crossing
    /// interest left unmatched, matched buys above matched sells, balanced
    /// matched quantity, bid not above ask. O(n); meant for tests.
    pub fn is_consistent(&self) -> bool {
        let bin = self.matched_orders(Side::Buy).map(|o| o.price).min();
        let sin = self.matched_orders(Side::Sell).map(|o| o.price).max();
        let bout = self.unmatched_orders(Side::Buy).map(|o| o.price).max();
        let sout = self.unmatched_orders(Side::Sell).map(|o| o.price).min();

        let le = |a: Option<Price>, b: Option<Price>| match (a, b) {
            (Some(a), Some(b)) => a <= b,
            _ => true,
        };
        let strictly_below = |a: Option<Price>, b: Option<Price>| match (a, b) {
            (Some(a), Some(b)) => a < b,
            _ => true,
        };
        le(sin, bin)
            && le(bout, bin)
            && le(sin, sout)
            && strictly_below(bout, sout)
            && le(self.bid_quote(), self.ask_quote())
            && self.matched_quantity(Side::Buy) == self.matched_quantity(Side::Sell)
    }
}
