//! Securities information processor: the cross-market best-bid-offer view

use std::fmt;

use log::{info, warn};
use rustc_hash::FxHashMap;

use crate::{Latency, MarketId, Price, Quantity, Quote, Transaction};

/// Best bid and best ask across every market the aggregator has heard from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BestBidOffer {
    pub bid: Option<Price>,
    pub bid_quantity: Quantity,
    pub bid_market: Option<MarketId>,
    pub ask: Option<Price>,
    pub ask_quantity: Quantity,
    pub ask_market: Option<MarketId>,
}

impl BestBidOffer {
    /// `ask - bid`; infinity if either side is missing or the view is
    /// crossed (markets are not linked, so that can happen).
    pub fn spread(&self) -> f64 {
        match (self.bid, self.ask) {
            (Some(bid), Some(ask)) if ask >= bid => ask.as_f64() - bid.as_f64(),
            _ => f64::INFINITY,
        }
    }

    /// Whether the best bid is above the best ask.
    pub fn is_crossed(&self) -> bool {
        matches!((self.bid, self.ask), (Some(bid), Some(ask)) if ask < bid)
    }

    /// Best bid, or `NEG_INF` when there is none.
    pub fn bid_or_neg_inf(&self) -> Price {
        self.bid.unwrap_or(Price::NEG_INF)
    }

    /// Best ask, or `INF` when there is none.
    pub fn ask_or_inf(&self) -> Price {
        self.ask.unwrap_or(Price::INF)
    }
}

impl fmt::Display for BestBidOffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.bid, self.bid_market) {
            (Some(bid), Some(m)) => write!(f, "(BestBid: {} @ {} from {m}", self.bid_quantity, bid)?,
            _ => write!(f, "(BestBid: -")?,
        }
        match (self.ask, self.ask_market) {
            (Some(ask), Some(m)) => write!(f, ", BestAsk: {} @ {} from {m})", self.ask_quantity, ask),
            _ => write!(f, ", BestAsk: -)"),
        }
    }
}

/// Latency-delayed aggregator of every market's quotes and trades.
#[derive(Clone, Debug, Default)]
pub struct Sip {
    latency: Latency,
    quotes: FxHashMap<MarketId, Quote>,
    transactions: Vec<Transaction>,
    view: BestBidOffer,
}

impl Sip {
    pub fn new(latency: Latency) -> Self {
        Self {
            latency,
            ..Self::default()
        }
    }

    #[inline]
    pub fn latency(&self) -> Latency {
        self.latency
    }

    /// Current cross-market view.
    #[inline]
    pub fn best_bid_offer(&self) -> &BestBidOffer {
        &self.view
    }

    /// Latest quote received from `market`.
    pub fn quote(&self, market: MarketId) -> Option<&Quote> {
        self.quotes.get(&market)
    }

    /// Every trade received, ordered by execution time.
    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    /// Apply a quote and recompute the view. Returns false (and changes
    /// nothing) when the quote is not newer than the one held for its market.
    pub(crate) fn apply_quote(&mut self, quote: Quote) -> bool {
        if let Some(held) = self.quotes.get(&quote.market) {
            if held.time >= quote.time {
                warn!("SIP dropped stale quote {quote} from {}", quote.time);
                return false;
            }
        }
        info!("{} -> SIP quote {quote}", quote.market);
        self.quotes.insert(quote.market, quote);
        self.recompute();
        true
    }

    fn recompute(&mut self) {
        let mut view = BestBidOffer::default();
        for quote in self.quotes.values() {
            if let Some(ask) = quote.ask {
                let better = match (view.ask, view.ask_market) {
                    (Some(best), Some(m)) => ask < best || (ask == best && quote.market < m),
                    _ => true,
                };
                if better {
                    view.ask = Some(ask);
                    view.ask_quantity = quote.ask_quantity;
                    view.ask_market = Some(quote.market);
                }
            }
            if let Some(bid) = quote.bid {
                let better = match (view.bid, view.bid_market) {
                    (Some(best), Some(m)) => bid > best || (bid == best && quote.market < m),
                    _ => true,
                };
                if better {
                    view.bid = Some(bid);
                    view.bid_quantity = quote.bid_quantity;
                    view.bid_market = Some(quote.market);
                }
            }
        }
        self.view = view;
    }

    /// Merge one clear's trades into the history at their execution time.
    pub(crate) fn apply_transactions(&mut self, batch: &[Transaction]) {
        insert_by_time(&mut self.transactions, batch);
    }
}

/// Insert `batch` (one clear, sharing one execution time) after every held
/// trade that executed no later than it.
pub(crate) fn insert_by_time(history: &mut Vec<Transaction>, batch: &[Transaction]) {
    let Some(first) = batch.first() else {
        return;
    };
    let at = history.partition_point(|t| t.time <= first.time);
    history.splice(at..at, batch.iter().copied());
}
