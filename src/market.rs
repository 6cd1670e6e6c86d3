//! Market: one four-heap, one clearing rule and the dissemination of what
//! happens to them.
//!
//! A market never calls into relays or agents directly. Everything it wants
//! to happen elsewhere is scheduled as a [`Command`], so latency and ordering
//! stay under the kernel's control.

use std::rc::Rc;

use log::{debug, info};
use rustc_hash::FxHashMap;

use crate::clearing::{ClearingRule, EarliestPrice, UniformPrice};
use crate::command::{Command, Endpoint, OrderRequest};
use crate::error::{Error, Result};
use crate::observe::{Observation, ObservationSink};
use crate::scheduler::Scheduler;
use crate::sip::BestBidOffer;
use crate::{
    FourHeap, Latency, MarketId, MarketTime, Order, OrderId, OrderRef, Price, Quantity, Quote,
    RelayId, Side, Tick, Transaction,
};

/// Clearing cadence of a market.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MarketKind {
    /// Continuous double auction: clears after every submission
    Continuous,
    /// Call auction: clears every `interval` ticks
    Call { interval: Tick },
}

/// Construction parameters of a market.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MarketSpec {
    pub kind: MarketKind,
    /// Latency of the market's own quote relay
    pub quote_latency: Latency,
    /// Latency of the market's own transaction relay
    pub transaction_latency: Latency,
    /// Price granularity of clearing prices
    pub tick_size: i64,
    /// Uniform-price ratio of a call market, in `[0, 1]`
    pub pricing_policy: f64,
}

impl MarketSpec {
    pub const DEFAULT_TICK_SIZE: i64 = 1;
    pub const DEFAULT_PRICING_POLICY: f64 = 0.5;
    pub const DEFAULT_CLEAR_INTERVAL: i64 = 1000;

    /// Continuous market with immediate relays.
    pub fn continuous() -> Self {
        Self {
            kind: MarketKind::Continuous,
            quote_latency: Latency::Immediate,
            transaction_latency: Latency::Immediate,
            tick_size: Self::DEFAULT_TICK_SIZE,
            pricing_policy: Self::DEFAULT_PRICING_POLICY,
        }
    }

    /// Call market clearing every `interval` ticks.
    pub fn call(interval: i64) -> Self {
        Self {
            kind: MarketKind::Call {
                interval: Tick(interval),
            },
            ..Self::continuous()
        }
    }

    /// Same latency for quotes and transactions.
    pub fn with_latency(mut self, latency: Latency) -> Self {
        self.quote_latency = latency;
        self.transaction_latency = latency;
        self
    }

    pub fn with_quote_latency(mut self, latency: Latency) -> Self {
        self.quote_latency = latency;
        self
    }

    pub fn with_transaction_latency(mut self, latency: Latency) -> Self {
        self.transaction_latency = latency;
        self
    }

    pub fn with_tick_size(mut self, tick_size: i64) -> Self {
        self.tick_size = tick_size;
        self
    }

    pub fn with_pricing_policy(mut self, ratio: f64) -> Self {
        self.pricing_policy = ratio;
        self
    }

    /// Check construction preconditions.
    pub fn validate(&self) -> Result<()> {
        if let MarketKind::Call { interval } = self.kind {
            if interval.0 <= 0 {
                return Err(Error::InvalidClearInterval(interval.0));
            }
            if !(0.0..=1.0).contains(&self.pricing_policy) {
                return Err(Error::InvalidPricingPolicy(self.pricing_policy));
            }
        }
        if self.tick_size <= 0 {
            return Err(Error::Config(format!(
                "tick size must be positive, got {}",
                self.tick_size
            )));
        }
        Ok(())
    }

    /// Earliest-price for continuous markets, uniform-price for call markets.
    pub fn clearing_rule(&self) -> Box<dyn ClearingRule> {
        match self.kind {
            MarketKind::Continuous => Box::new(EarliestPrice::new(self.tick_size)),
            MarketKind::Call { .. } => {
                Box::new(UniformPrice::new(self.pricing_policy, self.tick_size))
            }
        }
    }
}

impl Default for MarketSpec {
    fn default() -> Self {
        Self::continuous()
    }
}

/// A market.
#[derive(Debug)]
pub struct Market {
    id: MarketId,
    kind: MarketKind,
    book: FourHeap,
    rule: Box<dyn ClearingRule>,
    /// Strictly increasing; breaks same-tick ties
    sequence: u64,
    quote: Quote,
    /// Outstanding buy quantity per price
    bid_tally: FxHashMap<Price, Quantity>,
    /// Outstanding sell quantity per price
    ask_tally: FxHashMap<Price, Quantity>,
    transactions: Vec<Transaction>,
    quote_relay: RelayId,
    transaction_relay: RelayId,
    quote_endpoints: Vec<Endpoint>,
    transaction_endpoints: Vec<Endpoint>,
}

impl Market {
    /// Create a market from `spec` whose primary relays are already
    /// registered under the given ids. The aggregator is always an endpoint.
    pub(crate) fn new(
        id: MarketId,
        spec: &MarketSpec,
        quote_relay: RelayId,
        transaction_relay: RelayId,
    ) -> Result<Self> {
        spec.validate()?;
        Ok(Self {
            id,
            kind: spec.kind,
            book: FourHeap::new(id),
            rule: spec.clearing_rule(),
            sequence: 0,
            quote: Quote::empty(id),
            bid_tally: FxHashMap::default(),
            ask_tally: FxHashMap::default(),
            transactions: Vec::new(),
            quote_relay,
            transaction_relay,
            quote_endpoints: vec![Endpoint::Sip, Endpoint::Relay(quote_relay)],
            transaction_endpoints: vec![Endpoint::Sip, Endpoint::Relay(transaction_relay)],
        })
    }

    /// Replace the clearing rule.
    pub fn set_clearing_rule(&mut self, rule: Box<dyn ClearingRule>) {
        self.rule = rule;
    }

    pub(crate) fn add_quote_endpoint(&mut self, endpoint: Endpoint) {
        self.quote_endpoints.push(endpoint);
    }

    pub(crate) fn add_transaction_endpoint(&mut self, endpoint: Endpoint) {
        self.transaction_endpoints.push(endpoint);
    }

    fn tally_mut(&mut self, side: Side) -> &mut FxHashMap<Price, Quantity> {
        match side {
            Side::Buy => &mut self.bid_tally,
            Side::Sell => &mut self.ask_tally,
        }
    }

    fn untally(&mut self, side: Side, price: Price, quantity: Quantity) {
        let tally = self.tally_mut(side);
        if let Some(held) = tally.get_mut(&price) {
            *held = held.saturating_sub(quantity);
            if *held == 0 {
                tally.remove(&price);
            }
        }
    }

    // === Operations ===

    /// Accept an order stamped with the current tick and the next sequence
    /// number.
    ///
    /// Schedules the expiry withdrawal if the order has one, and an
    /// immediate clear in a continuous market.
    pub(crate) fn submit(
        &mut self,
        scheduler: &mut Scheduler<Command>,
        request: &OrderRequest,
    ) -> Result<OrderRef> {
        if request.quantity == 0 {
            return Err(Error::NonPositiveQuantity);
        }
        self.sequence += 1;
        let now = scheduler.now();
        let order = Order::new(
            self.id,
            request.agent,
            request.side,
            request.price,
            request.quantity,
            MarketTime::new(now, self.sequence),
        );
        let id = self.book.insert(order)?;
        *self.tally_mut(request.side).entry(request.price).or_default() += request.quantity;
        let handle = OrderRef::new(self.id, id);
        info!(
            "{}: {} {} {} @ {} as {handle}",
            self.id, request.agent, request.side, request.quantity, request.price
        );

        if let Some(deadline) = request.expiry.deadline(now) {
            scheduler.schedule(
                deadline,
                Command::WithdrawOrder {
                    order: handle,
                    quantity: request.quantity,
                },
            );
        }
        if self.kind == MarketKind::Continuous {
            scheduler.schedule_immediate(Command::Clear { market: self.id });
        }
        Ok(handle)
    }

    /// Withdraw up to `quantity` from an order and return how much was
    /// actually withdrawn. Withdrawing from an inert order does nothing.
    pub(crate) fn withdraw(
        &mut self,
        scheduler: &mut Scheduler<Command>,
        sink: &mut dyn ObservationSink,
        id: OrderId,
        quantity: Quantity,
    ) -> Result<Quantity> {
        let order = self
            .book
            .order(id)
            .ok_or(Error::UnknownOrder(OrderRef::new(self.id, id)))?;
        let (side, price, held) = (order.side, order.price, order.quantity());
        self.sequence += 1;
        let quantity = quantity.min(held);
        if quantity == 0 {
            return Ok(0);
        }
        self.book.withdraw(id, quantity)?;
        self.untally(side, price, quantity);
        debug!("{}: withdrew {quantity} from {id}", self.id);

        if self.kind == MarketKind::Continuous {
            let sends = self.refresh_quote(scheduler.now(), sink);
            scheduler.schedule_batch(Tick::IMMEDIATE, sends);
        }
        Ok(quantity)
    }

    /// Clear the book, price the pairs and disseminate the resulting trades
    /// followed by the new quote, as one ordered immediate batch.
    ///
    /// A call market then schedules its next clear.
    pub(crate) fn clear(
        &mut self,
        scheduler: &mut Scheduler<Command>,
        sink: &mut dyn ObservationSink,
    ) -> Rc<[Transaction]> {
        self.sequence += 1;
        let now = scheduler.now();
        let time = MarketTime::new(now, self.sequence);

        let pairs = self.book.clear();
        let prices = self.rule.pricing(&pairs, &self.book);
        let mut fresh = Vec::with_capacity(pairs.len());
        for (pair, price) in pairs.iter().zip(prices) {
            let (Some(buy), Some(sell)) = (self.book.order(pair.buy), self.book.order(pair.sell))
            else {
                continue;
            };
            let transaction = Transaction {
                market: self.id,
                buyer: buy.agent,
                seller: sell.agent,
                buy_order: pair.buy,
                sell_order: pair.sell,
                quantity: pair.quantity,
                price,
                time,
            };
            let (buy_price, sell_price) = (buy.price, sell.price);
            self.untally(Side::Buy, buy_price, pair.quantity);
            self.untally(Side::Sell, sell_price, pair.quantity);
            info!("{transaction}");
            sink.observe(&Observation::Transaction(transaction));
            fresh.push(transaction);
        }
        self.transactions.extend_from_slice(&fresh);
        let fresh: Rc<[Transaction]> = fresh.into();

        let mut sends = Vec::new();
        if !fresh.is_empty() {
            sends.extend(self.transaction_endpoints.iter().map(|&endpoint| {
                Command::SendTransactions {
                    endpoint,
                    transactions: Rc::clone(&fresh),
                }
            }));
        }
        sends.extend(self.refresh_quote(now, sink));
        scheduler.schedule_batch(Tick::IMMEDIATE, sends);

        if let MarketKind::Call { interval } = self.kind {
            scheduler.schedule(now + interval, Command::Clear { market: self.id });
        }
        fresh
    }

    /// Recompute the quote from the book and return the commands that send
    /// it to every quote endpoint.
    fn refresh_quote(&mut self, now: Tick, sink: &mut dyn ObservationSink) -> Vec<Command> {
        let bid = self.book.bid_quote();
        let ask = self.book.ask_quote();
        let count = |tally: &FxHashMap<Price, Quantity>, price: Option<Price>| {
            price.and_then(|p| tally.get(&p).copied()).unwrap_or(0)
        };
        self.quote = Quote {
            market: self.id,
            bid,
            bid_quantity: count(&self.bid_tally, bid),
            ask,
            ask_quantity: count(&self.ask_tally, ask),
            time: MarketTime::new(now, self.sequence),
        };
        debug_assert!(
            !matches!((bid, ask), (Some(b), Some(a)) if b > a),
            "{} crossed quote {}",
            self.id,
            self.quote
        );
        info!("{}", self.quote);
        sink.observe(&Observation::Quote(self.quote));
        self.quote_endpoints
            .iter()
            .map(|&endpoint| Command::SendQuote {
                endpoint,
                quote: self.quote,
            })
            .collect()
    }

    /// Where a routed order should go given the aggregator's view.
    ///
    /// A buy goes to the market with the best ask when that ask beats this
    /// market's own ask (or this market has none) and the buy's limit is
    /// strictly above it. Sells mirror this on the bid side. Otherwise the
    /// order stays here.
    pub fn route(&self, request: &OrderRequest, view: &BestBidOffer) -> MarketId {
        let elsewhere = match request.side {
            Side::Buy => match (view.ask, view.ask_market) {
                (Some(best), Some(market))
                    if self.quote.ask.is_none_or(|local| best < local)
                        && request.price > best =>
                {
                    Some(market)
                }
                _ => None,
            },
            Side::Sell => match (view.bid, view.bid_market) {
                (Some(best), Some(market))
                    if self.quote.bid.is_none_or(|local| best > local)
                        && request.price < best =>
                {
                    Some(market)
                }
                _ => None,
            },
        };
        match elsewhere {
            Some(market) if market != self.id => {
                info!(
                    "Routing {} {} {} @ {} from {} {} to {market} {view}",
                    request.agent, request.side, request.quantity, request.price, self.id, self.quote
                );
                market
            }
            _ => self.id,
        }
    }

    // === Queries ===

    #[inline]
    pub fn id(&self) -> MarketId {
        self.id
    }

    #[inline]
    pub fn kind(&self) -> MarketKind {
        self.kind
    }

    /// Quote as of the last book-changing operation.
    #[inline]
    pub fn quote(&self) -> &Quote {
        &self.quote
    }

    /// Every trade this market produced, in execution order.
    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    /// Any order ever submitted here.
    pub fn order(&self, id: OrderId) -> Option<&Order> {
        self.book.order(id)
    }

    pub fn book(&self) -> &FourHeap {
        &self.book
    }

    /// Last sequence number used.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Outstanding quantity resting at `price` on `side`.
    pub fn depth_at(&self, side: Side, price: Price) -> Quantity {
        let tally = match side {
            Side::Buy => &self.bid_tally,
            Side::Sell => &self.ask_tally,
        };
        tally.get(&price).copied().unwrap_or(0)
    }

    /// The market's own quote relay.
    pub fn quote_relay(&self) -> RelayId {
        self.quote_relay
    }

    /// The market's own transaction relay.
    pub fn transaction_relay(&self) -> RelayId {
        self.transaction_relay
    }

    pub fn quote_endpoints(&self) -> &[Endpoint] {
        &self.quote_endpoints
    }

    pub fn transaction_endpoints(&self) -> &[Endpoint] {
        &self.transaction_endpoints
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observe::MemorySink;
    use crate::{AgentId, Expiry};

    fn market(spec: MarketSpec) -> Market {
        Market::new(MarketId(0), &spec, RelayId(0), RelayId(1)).unwrap()
    }

    fn request(side: Side, price: i64, quantity: Quantity) -> OrderRequest {
        OrderRequest {
            agent: AgentId(1),
            market: MarketId(0),
            side,
            price: Price(price),
            quantity,
            expiry: Expiry::Never,
        }
    }

    fn drain(sched: &mut Scheduler<Command>) -> Vec<Command> {
        std::iter::from_fn(|| sched.pop_next().map(|(_, c)| c)).collect()
    }

    #[test]
    fn call_market_needs_positive_interval() {
        let err = Market::new(MarketId(0), &MarketSpec::call(0), RelayId(0), RelayId(1));
        assert!(matches!(err, Err(Error::InvalidClearInterval(0))));
        let err = MarketSpec::call(10).with_pricing_policy(1.5).validate();
        assert!(matches!(err, Err(Error::InvalidPricingPolicy(_))));
    }

    #[test]
    fn continuous_submit_schedules_clear() {
        let mut m = market(MarketSpec::continuous());
        let mut sched = Scheduler::with_seed(0);
        let handle = m.submit(&mut sched, &request(Side::Buy, 100, 2)).unwrap();

        assert_eq!(handle, OrderRef::new(MarketId(0), OrderId(0)));
        assert_eq!(m.sequence(), 1);
        assert_eq!(m.depth_at(Side::Buy, Price(100)), 2);
        let cmds = drain(&mut sched);
        assert!(matches!(cmds[..], [Command::Clear { market: MarketId(0) }]));
    }

    #[test]
    fn call_submit_does_not_clear() {
        let mut m = market(MarketSpec::call(100));
        let mut sched = Scheduler::with_seed(0);
        m.submit(&mut sched, &request(Side::Buy, 100, 2)).unwrap();
        assert!(sched.is_empty());
    }

    #[test]
    fn zero_quantity_is_rejected() {
        let mut m = market(MarketSpec::continuous());
        let mut sched = Scheduler::with_seed(0);
        let err = m.submit(&mut sched, &request(Side::Buy, 100, 0));
        assert!(matches!(err, Err(Error::NonPositiveQuantity)));
        assert_eq!(m.sequence(), 0);
    }

    #[test]
    fn expiry_schedules_withdrawal() {
        let mut m = market(MarketSpec::call(100));
        let mut sched = Scheduler::with_seed(0);
        let mut req = request(Side::Sell, 100, 3);
        req.expiry = Expiry::After(Tick(50));
        let handle = m.submit(&mut sched, &req).unwrap();

        assert_eq!(sched.peek_tick(), Some(Tick(50)));
        let cmds = drain(&mut sched);
        assert!(matches!(
            cmds[..],
            [Command::WithdrawOrder { order, quantity: 3 }] if order == handle
        ));
    }

    #[test]
    fn clear_disseminates_trades_then_quote() {
        let mut m = market(MarketSpec::continuous());
        let mut sched = Scheduler::with_seed(0);
        let mut sink = MemorySink::new();
        m.submit(&mut sched, &request(Side::Buy, 7, 3)).unwrap();
        m.submit(&mut sched, &request(Side::Sell, 5, 3)).unwrap();
        sched.clear();

        let trades = m.clear(&mut sched, &mut sink);
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].quantity, 3);
        assert_eq!(trades[0].price, Price(7));
        assert_eq!(trades[0].time, MarketTime::new(Tick::ZERO, 3));
        assert_eq!(m.transactions().len(), 1);
        assert_eq!(m.quote().bid, None);
        assert_eq!(m.quote().ask, None);
        assert_eq!(m.depth_at(Side::Buy, Price(7)), 0);

        let kinds: Vec<&'static str> = drain(&mut sched)
            .iter()
            .map(|c| match c {
                Command::SendTransactions { .. } => "tx",
                Command::SendQuote { .. } => "quote",
                _ => "other",
            })
            .collect();
        assert_eq!(kinds, vec!["tx", "tx", "quote", "quote"]);
        assert_eq!(sink.transactions().count(), 1);
        assert_eq!(sink.quotes().count(), 1);
    }

    #[test]
    fn empty_clear_only_sends_quote() {
        let mut m = market(MarketSpec::continuous());
        let mut sched = Scheduler::with_seed(0);
        let trades = m.clear(&mut sched, &mut MemorySink::new());
        assert!(trades.is_empty());
        let cmds = drain(&mut sched);
        assert_eq!(cmds.len(), 2);
        assert!(cmds.iter().all(|c| matches!(c, Command::SendQuote { .. })));
    }

    #[test]
    fn call_clear_schedules_next_clear() {
        let mut m = market(MarketSpec::call(100));
        let mut sched = Scheduler::with_seed(0);
        m.clear(&mut sched, &mut MemorySink::new());
        assert_eq!(sched.len(), 3);
        let mut ticks = Vec::new();
        while let Some(tick) = sched.peek_tick() {
            ticks.push(tick);
            sched.pop_next();
        }
        assert_eq!(ticks.last(), Some(&Tick(100)));
    }

    #[test]
    fn withdraw_clamps_and_ignores_inert() {
        let mut m = market(MarketSpec::continuous());
        let mut sched = Scheduler::with_seed(0);
        let mut sink = MemorySink::new();
        let handle = m.submit(&mut sched, &request(Side::Buy, 100, 2)).unwrap();

        assert_eq!(m.withdraw(&mut sched, &mut sink, handle.order, 5).unwrap(), 2);
        assert!(m.order(handle.order).unwrap().is_inert());
        assert_eq!(m.depth_at(Side::Buy, Price(100)), 0);
        assert_eq!(m.withdraw(&mut sched, &mut sink, handle.order, 1).unwrap(), 0);
        assert!(matches!(
            m.withdraw(&mut sched, &mut sink, OrderId(9), 1),
            Err(Error::UnknownOrder(_))
        ));
    }

    #[test]
    fn quote_quantity_comes_from_tally() {
        let mut m = market(MarketSpec::call(100));
        let mut sched = Scheduler::with_seed(0);
        m.submit(&mut sched, &request(Side::Buy, 100, 2)).unwrap();
        m.submit(&mut sched, &request(Side::Buy, 100, 3)).unwrap();
        m.submit(&mut sched, &request(Side::Sell, 110, 4)).unwrap();
        m.clear(&mut sched, &mut MemorySink::new());
        let q = m.quote();
        assert_eq!((q.bid, q.bid_quantity), (Some(Price(100)), 5));
        assert_eq!((q.ask, q.ask_quantity), (Some(Price(110)), 4));
    }

    #[test]
    fn routing_follows_better_market() {
        let m = market(MarketSpec::continuous());
        let view = BestBidOffer {
            bid: Some(Price(90)),
            bid_quantity: 1,
            bid_market: Some(MarketId(2)),
            ask: Some(Price(95)),
            ask_quantity: 1,
            ask_market: Some(MarketId(3)),
        };
        // No local quote: the aggregator's ask is better
        assert_eq!(m.route(&request(Side::Buy, 100, 1), &view), MarketId(3));
        // Limit does not cross the aggregator's ask
        assert_eq!(m.route(&request(Side::Buy, 95, 1), &view), MarketId(0));
        assert_eq!(m.route(&request(Side::Sell, 80, 1), &view), MarketId(2));
        assert_eq!(m.route(&request(Side::Sell, 90, 1), &view), MarketId(0));
        assert_eq!(m.route(&request(Side::Buy, 100, 1), &BestBidOffer::default()), MarketId(0));
    }
}
