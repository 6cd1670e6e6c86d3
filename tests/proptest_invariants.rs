//! Property-based tests for matching-engine and kernel invariants.
//!
//! These tests use proptest to verify that key invariants hold
//! across randomly generated scenarios.

use marketsim::{
    AgentId, FourHeap, MarketId, MarketTime, Order, OrderId, Price, Quantity, Scheduler, Side,
    Tick,
};
use proptest::prelude::*;

const M: MarketId = MarketId(0);

#[derive(Clone, Debug)]
enum Op {
    Insert(Side, i64, Quantity),
    /// Withdraw from the order at `index % order_count`
    Withdraw(usize, Quantity),
    Clear,
}

/// Generate a side
fn side_strategy() -> impl Strategy<Value = Side> {
    prop_oneof![Just(Side::Buy), Just(Side::Sell)]
}

/// Prices in a narrow band so that orders cross often
fn price_strategy() -> impl Strategy<Value = i64> {
    90i64..=110
}

fn quantity_strategy() -> impl Strategy<Value = Quantity> {
    1u64..=10
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        6 => (side_strategy(), price_strategy(), quantity_strategy())
            .prop_map(|(side, price, qty)| Op::Insert(side, price, qty)),
        3 => (0usize..1000, quantity_strategy()).prop_map(|(i, qty)| Op::Withdraw(i, qty)),
        1 => Just(Op::Clear),
    ]
}

struct Book {
    heap: FourHeap,
    sequence: u64,
}

impl Book {
    fn new() -> Self {
        Self {
            heap: FourHeap::new(M),
            sequence: 0,
        }
    }

    fn insert(&mut self, side: Side, price: i64, quantity: Quantity) -> OrderId {
        self.sequence += 1;
        let time = MarketTime::new(Tick::ZERO, self.sequence);
        self.heap
            .insert(Order::new(M, AgentId(0), side, Price(price), quantity, time))
            .unwrap()
    }

    fn apply(&mut self, op: &Op) {
        match *op {
            Op::Insert(side, price, qty) => {
                self.insert(side, price, qty);
            }
            Op::Withdraw(index, qty) => {
                let count = self.heap.order_count();
                if count == 0 {
                    return;
                }
                let id = OrderId(index % count);
                let held = self.heap.order(id).unwrap().quantity();
                if held > 0 {
                    self.heap.withdraw(id, qty.min(held)).unwrap();
                }
            }
            Op::Clear => {
                self.heap.clear();
            }
        }
    }

    /// Everything observable about the book's state that depends only on
    /// the set of live orders.
    fn summary(&self) -> (Option<Price>, Option<Price>, Quantity, Quantity) {
        (
            self.heap.bid_quote(),
            self.heap.ask_quote(),
            self.heap.matched_quantity(Side::Buy),
            self.heap.size(),
        )
    }

    fn outstanding(&self) -> Quantity {
        (0..self.heap.order_count())
            .filter_map(|i| self.heap.order(OrderId(i)))
            .map(Order::quantity)
            .sum()
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    // ========================================================================
    // FOUR-HEAP INVARIANTS
    // ========================================================================

    /// Heap ordering invariants hold after every operation
    #[test]
    fn four_heap_stays_consistent(ops in prop::collection::vec(op_strategy(), 1..80)) {
        let mut book = Book::new();
        for op in &ops {
            book.apply(op);
            prop_assert!(book.heap.is_consistent(), "inconsistent after {:?}", op);
            prop_assert_eq!(book.heap.size(), book.outstanding());
        }
    }

    /// Quotes never cross
    #[test]
    fn quotes_never_cross(ops in prop::collection::vec(op_strategy(), 1..80)) {
        let mut book = Book::new();
        for op in &ops {
            book.apply(op);
            if let (Some(bid), Some(ask)) = (book.heap.bid_quote(), book.heap.ask_quote()) {
                prop_assert!(bid <= ask, "bid {} above ask {}", bid, ask);
            }
        }
    }

    /// Matched quantity is the same on both sides and never exceeds what
    /// is outstanding on either side
    #[test]
    fn matched_sides_balance(ops in prop::collection::vec(op_strategy(), 1..80)) {
        let mut book = Book::new();
        for op in &ops {
            book.apply(op);
            let buy = book.heap.matched_quantity(Side::Buy);
            prop_assert_eq!(buy, book.heap.matched_quantity(Side::Sell));
            prop_assert!(2 * buy <= book.heap.size());
        }
    }

    /// Inserting an order and withdrawing all of it leaves the book as it was
    #[test]
    fn insert_then_withdraw_restores(
        ops in prop::collection::vec(op_strategy(), 0..60),
        side in side_strategy(),
        price in price_strategy(),
        qty in quantity_strategy(),
    ) {
        let mut book = Book::new();
        for op in &ops {
            book.apply(op);
        }
        let before = book.summary();
        let id = book.insert(side, price, qty);
        book.heap.withdraw(id, qty).unwrap();

        prop_assert_eq!(book.summary(), before);
        prop_assert!(book.heap.is_consistent());
        prop_assert!(book.heap.order(id).unwrap().is_inert());
    }

    // ========================================================================
    // CLEARING
    // ========================================================================

    /// A clear trades exactly the matched quantity, pairs only crossing
    /// orders and leaves nothing matched
    #[test]
    fn clear_exhausts_matches(ops in prop::collection::vec(op_strategy(), 1..80)) {
        let mut book = Book::new();
        for op in &ops {
            book.apply(op);
        }
        let matched = book.heap.matched_quantity(Side::Buy);
        let size = book.heap.size();
        let pairs = book.heap.clear();

        let traded: Quantity = pairs.iter().map(|p| p.quantity).sum();
        prop_assert_eq!(traded, matched);
        prop_assert_eq!(book.heap.size(), size - 2 * matched);
        prop_assert_eq!(book.heap.matched_quantity(Side::Buy), 0);
        prop_assert_eq!(book.heap.matched_quantity(Side::Sell), 0);
        prop_assert!(book.heap.is_consistent());
        for pair in &pairs {
            let buy = book.heap.order(pair.buy).unwrap();
            let sell = book.heap.order(pair.sell).unwrap();
            prop_assert!(pair.quantity > 0);
            prop_assert!(buy.price >= sell.price);
        }

        // Nothing left crosses
        let best_buy = book.heap.unmatched_orders(Side::Buy).map(|o| o.price).max();
        let best_sell = book.heap.unmatched_orders(Side::Sell).map(|o| o.price).min();
        if let (Some(b), Some(s)) = (best_buy, best_sell) {
            prop_assert!(b < s);
        }
    }

    // ========================================================================
    // SCHEDULING KERNEL
    // ========================================================================

    /// Same-tick batches interleave in any order, but each batch runs in the
    /// order it was scheduled
    #[test]
    fn batches_keep_internal_order(
        sizes in prop::collection::vec(1usize..6, 1..8),
        seed in any::<u64>(),
    ) {
        let mut sched: Scheduler<(usize, usize)> = Scheduler::with_seed(seed);
        for (batch, &n) in sizes.iter().enumerate() {
            sched.schedule_batch(Tick(5), (0..n).map(|i| (batch, i)));
        }
        let mut seen = vec![Vec::new(); sizes.len()];
        while let Some((now, (batch, i))) = sched.pop_next() {
            prop_assert_eq!(now, Tick(5));
            seen[batch].push(i);
        }
        for (batch, &n) in sizes.iter().enumerate() {
            prop_assert_eq!(&seen[batch], &(0..n).collect::<Vec<_>>());
        }
    }

    /// Ticks come out in non-decreasing order, immediate first
    #[test]
    fn ticks_are_monotonic(ticks in prop::collection::vec(-1i64..50, 1..40), seed in any::<u64>()) {
        let mut sched = Scheduler::with_seed(seed);
        for (n, &t) in ticks.iter().enumerate() {
            sched.schedule(Tick::new(t), n);
        }
        let mut last = Tick::IMMEDIATE;
        let mut count = 0;
        while let Some((now, _)) = sched.pop_next() {
            prop_assert!(now >= last);
            last = now;
            count += 1;
        }
        prop_assert_eq!(count, ticks.len());
    }

    /// The same seed reproduces the same interleaving
    #[test]
    fn same_seed_same_interleaving(
        sizes in prop::collection::vec(1usize..4, 2..10),
        seed in any::<u64>(),
    ) {
        let run = || {
            let mut sched = Scheduler::with_seed(seed);
            for (batch, &n) in sizes.iter().enumerate() {
                sched.schedule_batch(Tick(1), (0..n).map(|i| (batch, i)));
            }
            std::iter::from_fn(|| sched.pop_next()).collect::<Vec<_>>()
        };
        prop_assert_eq!(run(), run());
    }
}

#[cfg(feature = "config")]
proptest! {
    #![proptest_config(ProptestConfig::with_cases(8))]

    /// A whole simulation is reproducible from its seed. TOML integers are
    /// signed; negative seeds cover the upper half of the `u64` range
    #[test]
    fn simulation_is_deterministic(seed in any::<i64>()) {
        use marketsim::{MemorySink, SimConfig};

        let config = SimConfig::from_toml(&format!(
            r#"
[simulation]
seed = {seed}
length = 3000
sip_latency = 5

[[markets]]
kind = "cda"
quote_latency = 0

[[markets]]
kind = "call"
clear_interval = 100

[agents.zi]
count = 12
arrival_rate = 0.02
reentry_rate = 0.01
range_max = 2000
expiry = 400
"#
        ))
        .unwrap();
        prop_assert_eq!(config.seed(), seed as u64);

        let run = || {
            let mut sim = config.build(MemorySink::new()).unwrap();
            sim.run_until(config.length()).unwrap();
            sim.into_sink()
        };
        let (a, b) = (run(), run());
        prop_assert!(!a.is_empty());
        prop_assert_eq!(a.observations(), b.observations());
    }
}
