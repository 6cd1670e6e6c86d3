//! Clearing rules: assign a transaction price to each matched pair.

use std::fmt;

use crate::{FourHeap, MatchedPair, Price};

/// Round `n` to the nearest multiple of `quanta`, ties to the even multiple.
///
/// `quantize(5, 10) == 0`, `quantize(15, 10) == 20`. A non-positive
/// `quanta` returns `n` unchanged.
pub fn quantize(n: i64, quanta: i64) -> i64 {
    if quanta <= 0 {
        return n;
    }
    let (steps, rest) = (n.div_euclid(quanta), n.rem_euclid(quanta));
    let up = quanta - rest;
    let steps = if rest > up || (rest == up && steps % 2 != 0) {
        steps + 1
    } else {
        steps
    };
    steps.saturating_mul(quanta)
}

/// Prices the pairs produced by one clear.
///
/// Implementations receive the pairs in clearing order and the engine that
/// produced them (for order lookups), and return one price per pair.
pub trait ClearingRule: fmt::Debug {
    fn pricing(&self, pairs: &[MatchedPair], book: &FourHeap) -> Vec<Price>;
}

/// Each pair trades at the price of whichever order arrived first.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EarliestPrice {
    pub tick_size: i64,
}

impl EarliestPrice {
    pub fn new(tick_size: i64) -> Self {
        Self { tick_size }
    }
}

impl ClearingRule for EarliestPrice {
    fn pricing(&self, pairs: &[MatchedPair], book: &FourHeap) -> Vec<Price> {
        pairs
            .iter()
            .filter_map(|pair| {
                let buy = book.order(pair.buy)?;
                let sell = book.order(pair.sell)?;
                let earlier = if buy.submitted < sell.submitted { buy } else { sell };
                Some(earlier.price.quantize(self.tick_size))
            })
            .collect()
    }
}

/// Every pair in a clear trades at one price between the lowest matched buy
/// and the highest matched sell: `ratio * min_buy + (1 - ratio) * max_sell`.
///
/// `ratio = 1` clears at the buyers' limit, `ratio = 0` at the sellers'.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct UniformPrice {
    pub ratio: f64,
    pub tick_size: i64,
}

impl UniformPrice {
    pub fn new(ratio: f64, tick_size: i64) -> Self {
        Self { ratio, tick_size }
    }
}

impl ClearingRule for UniformPrice {
    fn pricing(&self, pairs: &[MatchedPair], book: &FourHeap) -> Vec<Price> {
        let buys = pairs.iter().filter_map(|p| book.order(p.buy)).map(|o| o.price);
        let sells = pairs.iter().filter_map(|p| book.order(p.sell)).map(|o| o.price);
        let (Some(min_buy), Some(max_sell)) = (buys.min(), sells.max()) else {
            return Vec::new();
        };
        let price = Price::from_f64(
            min_buy.as_f64() * self.ratio + max_sell.as_f64() * (1.0 - self.ratio),
        )
        .quantize(self.tick_size);
        vec![price; pairs.len()]
    }
}
