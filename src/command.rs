//! Commands: the closed set of actions the kernel can schedule.

use std::fmt;
use std::rc::Rc;

use crate::{AgentId, MarketId, OrderRef, Price, Quantity, Quote, RelayId, Side, Tick, Transaction};

/// Delivery delay of a relay.
///
/// `Immediate` delivers in the immediate class, before any other pending
/// work. `Delay(Tick::ZERO)` delivers at the current tick but in random order
/// among that tick's other batches.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Latency {
    #[default]
    Immediate,
    Delay(Tick),
}

impl Latency {
    /// Negative tick counts mean immediate.
    pub fn from_ticks(ticks: i64) -> Self {
        if ticks < 0 {
            Latency::Immediate
        } else {
            Latency::Delay(Tick(ticks))
        }
    }

    /// Tick at which something sent at `now` arrives.
    #[inline]
    pub fn deliver_at(self, now: Tick) -> Tick {
        match self {
            Latency::Immediate => Tick::IMMEDIATE,
            Latency::Delay(delay) => now + delay,
        }
    }
}

impl fmt::Display for Latency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Latency::Immediate => write!(f, "immediate"),
            Latency::Delay(delay) => write!(f, "{delay}"),
        }
    }
}

/// How long an order rests before it is withdrawn.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Expiry {
    #[default]
    Never,
    After(Tick),
}

impl Expiry {
    /// Negative tick counts mean never.
    pub fn from_ticks(ticks: i64) -> Self {
        if ticks < 0 {
            Expiry::Never
        } else {
            Expiry::After(Tick(ticks))
        }
    }

    /// Tick of the automatic withdrawal for an order submitted at `now`.
    #[inline]
    pub fn deadline(self, now: Tick) -> Option<Tick> {
        match self {
            Expiry::Never => None,
            Expiry::After(duration) => Some(now + duration),
        }
    }
}

/// Destination of a quote or transaction dissemination.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// A quote relay for quote commands, a transaction relay for
    /// transaction commands
    Relay(RelayId),
    /// The simulation-wide aggregator
    Sip,
}

/// Parameters of an order submission.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OrderRequest {
    pub agent: AgentId,
    pub market: MarketId,
    pub side: Side,
    pub price: Price,
    pub quantity: Quantity,
    pub expiry: Expiry,
}

/// A schedulable action, bound to the entity it acts on.
#[derive(Clone, Debug)]
pub enum Command {
    /// Agent enters the simulation
    AgentArrival { agent: AgentId },
    /// Agent runs its strategy
    AgentStrategy { agent: AgentId },
    /// Submit to the named market
    SubmitOrder(OrderRequest),
    /// Submit to whichever market the best-bid-offer view says is better
    SubmitRoutedOrder(OrderRequest),
    /// Withdraw up to `quantity` from an order
    WithdrawOrder { order: OrderRef, quantity: Quantity },
    /// Clear a market
    Clear { market: MarketId },
    /// Hand a quote to an endpoint, which applies its own latency
    SendQuote { endpoint: Endpoint, quote: Quote },
    /// Hand one clear's transactions to an endpoint
    SendTransactions {
        endpoint: Endpoint,
        transactions: Rc<[Transaction]>,
    },
    /// Latency elapsed: apply the quote at the endpoint
    DeliverQuote { endpoint: Endpoint, quote: Quote },
    /// Latency elapsed: apply the transactions at the endpoint
    DeliverTransactions {
        endpoint: Endpoint,
        transactions: Rc<[Transaction]>,
    },
}
