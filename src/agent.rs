//! Agents: the strategies that drive order flow.
//!
//! An agent never touches a market directly. When the kernel invokes it, it
//! gets an [`AgentContext`] with a read-only view of the world as that agent
//! is allowed to see it, and asks for work by queuing [`Command`]s. The
//! simulation schedules those once the agent returns.

use crate::command::{Command, OrderRequest};
use crate::market::Market;
use crate::relay::QuoteRelay;
use crate::{
    AgentId, BestBidOffer, Expiry, MarketId, Order, OrderRef, Price, Quantity, Quote, Side, Sip,
    Tick, Transaction,
};

/// A trading strategy.
pub trait Agent {
    /// Label used in logs and summaries.
    fn name(&self) -> &str;

    /// Called once when the agent enters. Runs the strategy right away
    /// unless overridden.
    fn arrive(&mut self, ctx: &mut AgentContext<'_>) {
        ctx.act_now();
    }

    /// Run the strategy.
    fn act(&mut self, ctx: &mut AgentContext<'_>);

    /// One of the agent's orders traded.
    fn on_transaction(&mut self, _transaction: &Transaction) {}
}

/// What an agent sees and may request while it runs.
pub struct AgentContext<'a> {
    id: AgentId,
    now: Tick,
    markets: &'a [Market],
    quote_relays: &'a [QuoteRelay],
    sip: &'a Sip,
    active: &'a [OrderRef],
    immediate: Vec<Command>,
    delayed: Vec<(Tick, Command)>,
}

impl<'a> AgentContext<'a> {
    pub(crate) fn new(
        id: AgentId,
        now: Tick,
        markets: &'a [Market],
        quote_relays: &'a [QuoteRelay],
        sip: &'a Sip,
        active: &'a [OrderRef],
    ) -> Self {
        Self {
            id,
            now,
            markets,
            quote_relays,
            sip,
            active,
            immediate: Vec::new(),
            delayed: Vec::new(),
        }
    }

    // === View ===

    #[inline]
    pub fn id(&self) -> AgentId {
        self.id
    }

    #[inline]
    pub fn now(&self) -> Tick {
        self.now
    }

    /// Every market in the simulation.
    pub fn market_ids(&self) -> impl Iterator<Item = MarketId> + '_ {
        self.markets.iter().map(Market::id)
    }

    /// A market's quote as delivered by its primary quote relay, so it
    /// lags the market by that relay's latency.
    pub fn quote(&self, market: MarketId) -> Option<&'a Quote> {
        let relay = self.markets.get(market.index())?.quote_relay();
        self.quote_relays.get(relay.index()).map(QuoteRelay::quote)
    }

    /// The aggregator's cross-market view.
    pub fn best_bid_offer(&self) -> &'a BestBidOffer {
        self.sip.best_bid_offer()
    }

    /// Orders this agent has resting, oldest first.
    pub fn active_orders(&self) -> &'a [OrderRef] {
        self.active
    }

    pub fn order(&self, handle: OrderRef) -> Option<&'a Order> {
        self.markets.get(handle.market.index())?.order(handle.order)
    }

    // === Requests ===

    fn request(
        &self,
        market: MarketId,
        side: Side,
        price: Price,
        quantity: Quantity,
        expiry: Expiry,
    ) -> OrderRequest {
        OrderRequest {
            agent: self.id,
            market,
            side,
            price,
            quantity,
            expiry,
        }
    }

    /// Submit a limit order to `market`.
    pub fn submit(
        &mut self,
        market: MarketId,
        side: Side,
        price: Price,
        quantity: Quantity,
        expiry: Expiry,
    ) {
        let request = self.request(market, side, price, quantity, expiry);
        self.immediate.push(Command::SubmitOrder(request));
    }

    /// Submit a limit order to `market`, or to whichever market the
    /// aggregator says will fill it at a better price.
    pub fn submit_routed(
        &mut self,
        market: MarketId,
        side: Side,
        price: Price,
        quantity: Quantity,
        expiry: Expiry,
    ) {
        let request = self.request(market, side, price, quantity, expiry);
        self.immediate.push(Command::SubmitRoutedOrder(request));
    }

    /// Withdraw up to `quantity` from one of the agent's orders.
    pub fn withdraw(&mut self, order: OrderRef, quantity: Quantity) {
        self.immediate.push(Command::WithdrawOrder { order, quantity });
    }

    /// Withdraw everything the agent has resting.
    pub fn withdraw_all(&mut self) {
        for &handle in self.active {
            let quantity = self.order(handle).map_or(0, Order::quantity);
            if quantity > 0 {
                self.immediate.push(Command::WithdrawOrder {
                    order: handle,
                    quantity,
                });
            }
        }
    }

    /// Run the strategy again, before anything else pending.
    pub fn act_now(&mut self) {
        self.immediate.push(Command::AgentStrategy { agent: self.id });
    }

    /// Run the strategy again `delay` ticks from now.
    pub fn reenter_after(&mut self, delay: Tick) {
        let at = self.now + delay;
        self.delayed.push((at, Command::AgentStrategy { agent: self.id }));
    }

    /// Requests in the order they were made: the immediate ones form one
    /// batch, the rest carry their own tick.
    pub(crate) fn into_requests(self) -> (Vec<Command>, Vec<(Tick, Command)>) {
        (self.immediate, self.delayed)
    }
}

/// An agent that never trades.
#[derive(Clone, Debug, Default)]
pub struct NoOpAgent;

impl Agent for NoOpAgent {
    fn name(&self) -> &str {
        "noop"
    }

    fn arrive(&mut self, _ctx: &mut AgentContext<'_>) {}

    fn act(&mut self, _ctx: &mut AgentContext<'_>) {}
}
