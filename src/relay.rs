//! Quote and transaction relays: latency-delayed copies of one market's
//! information, as seen from some destination.

use log::warn;
use rustc_hash::FxHashSet;

use crate::sip::insert_by_time;
use crate::{AgentId, Latency, MarketId, Quote, RelayId, Transaction};

/// Latest quote of one market, delayed by a fixed latency.
///
/// A relay with a subscriber invokes that agent's strategy as soon as a
/// fresh quote lands (a trader watching a private feed).
#[derive(Clone, Debug)]
pub struct QuoteRelay {
    id: RelayId,
    market: MarketId,
    latency: Latency,
    subscriber: Option<AgentId>,
    quote: Quote,
}

impl QuoteRelay {
    pub fn new(id: RelayId, market: MarketId, latency: Latency, subscriber: Option<AgentId>) -> Self {
        Self {
            id,
            market,
            latency,
            subscriber,
            quote: Quote::empty(market),
        }
    }

    pub fn id(&self) -> RelayId {
        self.id
    }

    pub fn market(&self) -> MarketId {
        self.market
    }

    pub fn latency(&self) -> Latency {
        self.latency
    }

    pub fn subscriber(&self) -> Option<AgentId> {
        self.subscriber
    }

    /// Latest quote applied.
    pub fn quote(&self) -> &Quote {
        &self.quote
    }

    /// Replace the held quote unless `quote` is not newer.
    pub(crate) fn apply(&mut self, quote: Quote) -> bool {
        debug_assert_eq!(quote.market, self.market, "quote from another market");
        if quote.time <= self.quote.time {
            warn!("{} dropped stale quote from {}", self.id, quote.time);
            return false;
        }
        self.quote = quote;
        true
    }
}

/// Who a transaction relay tells about fills.
#[derive(Clone, Debug)]
pub enum Audience {
    /// Both counterparties of every trade, except agents that follow the
    /// market through a private relay of their own
    Counterparties { private: FxHashSet<AgentId> },
    /// Only this agent, for trades it took part in
    Agent(AgentId),
}

impl Audience {
    /// Whether `agent` should hear about its fills through this relay.
    pub fn includes(&self, agent: AgentId) -> bool {
        match self {
            Audience::Counterparties { private } => !private.contains(&agent),
            Audience::Agent(only) => *only == agent,
        }
    }
}

/// Trade history of one market, delayed by a fixed latency.
#[derive(Clone, Debug)]
pub struct TransactionRelay {
    id: RelayId,
    market: MarketId,
    latency: Latency,
    audience: Audience,
    transactions: Vec<Transaction>,
}

impl TransactionRelay {
    pub fn new(id: RelayId, market: MarketId, latency: Latency, audience: Audience) -> Self {
        Self {
            id,
            market,
            latency,
            audience,
            transactions: Vec::new(),
        }
    }

    pub fn id(&self) -> RelayId {
        self.id
    }

    pub fn market(&self) -> MarketId {
        self.market
    }

    pub fn latency(&self) -> Latency {
        self.latency
    }

    pub fn audience(&self) -> &Audience {
        &self.audience
    }

    /// Trades received so far, ordered by execution time.
    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    pub(crate) fn apply(&mut self, batch: &[Transaction]) {
        insert_by_time(&mut self.transactions, batch);
    }

    pub(crate) fn exclude(&mut self, agent: AgentId) {
        if let Audience::Counterparties { private } = &mut self.audience {
            private.insert(agent);
        }
    }
}
