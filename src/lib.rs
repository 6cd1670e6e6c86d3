//! # marketsim
//!
//! A deterministic discrete-event simulator of securities markets.
//!
//! ## Features
//!
//! - **Four-heap matching engine**: constant-time quotes, maximal matched set
//!   kept up to date on every insert and withdraw
//! - **Continuous and call markets**: earliest-price and uniform-price clearing
//! - **Latency-bound market data**: quote and transaction relays per
//!   destination, plus a cross-market best-bid-offer aggregator
//! - **Seeded scheduling kernel**: same-tick batches run in a random but
//!   reproducible order; zero-latency work runs depth-first before anything else
//! - **Integer prices**: sub-units of a thousandth of a dollar
//!
//! ## Quick Start
//!
//! ```
//! use marketsim::{
//!     Expiry, MarketSpec, MemorySink, NoOpAgent, OrderRequest, Price, Side, Simulation, Tick,
//! };
//!
//! let mut sim = Simulation::new(1, Default::default(), MemorySink::new());
//! let market = sim.add_market(MarketSpec::continuous()).unwrap();
//! let buyer = sim.add_agent(NoOpAgent, Tick::ZERO);
//! let seller = sim.add_agent(NoOpAgent, Tick::ZERO);
//!
//! sim.submit(OrderRequest {
//!     agent: buyer,
//!     market,
//!     side: Side::Buy,
//!     price: Price(101_000),
//!     quantity: 5,
//!     expiry: Expiry::Never,
//! })
//! .unwrap();
//! sim.submit(OrderRequest {
//!     agent: seller,
//!     market,
//!     side: Side::Sell,
//!     price: Price(100_000),
//!     quantity: 2,
//!     expiry: Expiry::Never,
//! })
//! .unwrap();
//!
//! // The continuous market cleared as soon as the sell arrived
//! let trades = sim.market(market).unwrap().transactions();
//! assert_eq!(trades.len(), 1);
//! assert_eq!(trades[0].price, Price(101_000)); // the earlier order's price
//! assert_eq!(sim.quote(market).unwrap().bid, Some(Price(101_000)));
//! assert_eq!(sim.sink().transactions().count(), 1);
//! ```
//!
//! ## The Four-Heap
//!
//! The engine can be used on its own:
//!
//! ```
//! use marketsim::{AgentId, FourHeap, MarketId, MarketTime, Order, Price, Side, Tick};
//!
//! let m = MarketId(0);
//! let at = |seq| MarketTime::new(Tick::ZERO, seq);
//! let mut book = FourHeap::new(m);
//!
//! book.insert(Order::new(m, AgentId(0), Side::Buy, Price(110), 2, at(1))).unwrap();
//! book.insert(Order::new(m, AgentId(1), Side::Sell, Price(100), 1, at(2))).unwrap();
//!
//! // One unit is matched; a sell at 110 would still trade against the rest
//! assert_eq!(book.bid_quote(), Some(Price(110)));
//! assert_eq!(book.matched_quantity(Side::Buy), 1);
//!
//! let pairs = book.clear();
//! assert_eq!(pairs.len(), 1);
//! assert_eq!(pairs[0].quantity, 1);
//! ```
//!
//! ## Call Markets and Latency
//!
//! A call market clears every `interval` ticks, starting immediately. Relays
//! deliver what a market publishes after their latency; `Latency::Immediate`
//! and `Latency::Delay(Tick::ZERO)` are different things (depth-first now
//! versus randomly ordered within the current tick).
//!
//! ```
//! use marketsim::{Latency, MarketSpec, Simulation, Tick};
//!
//! let mut sim = Simulation::without_sink(3, Latency::Delay(Tick(50)));
//! let call = sim
//!     .add_market(MarketSpec::call(100).with_latency(Latency::Delay(Tick(10))))
//!     .unwrap();
//! sim.run_until(Tick(1_000)).unwrap();
//!
//! // Clears at 0, 100, ..., 1000: one quote per clear
//! assert_eq!(sim.market(call).unwrap().sequence(), 11);
//! ```

mod agent;
mod background;
mod clearing;
mod command;
#[cfg(feature = "config")]
mod config;
mod error;
mod event;
mod fourheap;
mod market;
mod observe;
mod order;
mod quote;
mod relay;
mod scheduler;
mod side;
mod simulation;
mod sip;
mod transaction;
mod types;

// Re-export public API
pub use agent::{Agent, AgentContext, NoOpAgent};
pub use background::{ExpInterarrivals, ZiAgent, ZiParams};
pub use clearing::{ClearingRule, EarliestPrice, UniformPrice, quantize};
pub use command::{Command, Endpoint, Expiry, Latency, OrderRequest};
#[cfg(feature = "config")]
pub use config::{
    AgentsConfig, MarketConfig, MarketKindConfig, SimConfig, SimulationConfig, ZiConfig,
};
pub use error::{Error, Result};
pub use event::{Event, EventQueue};
pub use fourheap::{FourHeap, MatchedPair};
pub use market::{Market, MarketKind, MarketSpec};
pub use observe::{MemorySink, NullSink, Observation, ObservationSink};
#[cfg(feature = "jsonl")]
pub use observe::{JsonLinesSink, read_observations};
pub use order::Order;
pub use quote::Quote;
pub use relay::{Audience, QuoteRelay, TransactionRelay};
pub use scheduler::Scheduler;
pub use side::Side;
pub use simulation::Simulation;
pub use sip::{BestBidOffer, Sip};
pub use transaction::Transaction;
pub use types::{AgentId, MarketId, MarketTime, OrderId, OrderRef, Price, Quantity, RelayId, Tick};
