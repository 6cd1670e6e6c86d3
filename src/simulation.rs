//! Simulation: the entity arenas plus the command dispatcher that binds the
//! scheduling kernel to them.
//!
//! Entities refer to each other by index (`MarketId`, `RelayId`, `AgentId`,
//! `OrderRef`), never by pointer. Every command names the entity it acts on
//! and is resolved here, at execution time.
//!
//! # Example
//!
//! ```
//! use marketsim::{
//!     Expiry, MarketSpec, MemorySink, NoOpAgent, OrderRequest, Price, Side, Simulation, Tick,
//! };
//!
//! let mut sim = Simulation::new(7, Default::default(), MemorySink::new());
//! let market = sim.add_market(MarketSpec::continuous()).unwrap();
//! let alice = sim.add_agent(NoOpAgent, Tick::ZERO);
//! let bob = sim.add_agent(NoOpAgent, Tick::ZERO);
//!
//! let order = |agent, side, price| OrderRequest {
//!     agent,
//!     market,
//!     side,
//!     price: Price(price),
//!     quantity: 3,
//!     expiry: Expiry::Never,
//! };
//! sim.submit(order(alice, Side::Buy, 7)).unwrap();
//! sim.submit(order(bob, Side::Sell, 5)).unwrap();
//!
//! let trades = sim.market(market).unwrap().transactions();
//! assert_eq!(trades.len(), 1);
//! assert_eq!(trades[0].quantity, 3);
//! ```

use std::rc::Rc;

use log::{debug, info};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rustc_hash::FxHashSet;

use crate::agent::{Agent, AgentContext};
use crate::command::{Command, Endpoint, OrderRequest};
use crate::error::{Error, Result};
use crate::market::{Market, MarketKind, MarketSpec};
use crate::observe::{NullSink, Observation, ObservationSink};
use crate::relay::{Audience, QuoteRelay, TransactionRelay};
use crate::scheduler::Scheduler;
use crate::{
    AgentId, BestBidOffer, Latency, MarketId, Order, OrderRef, Quantity, Quote, RelayId, Sip,
    Tick, Transaction,
};

struct AgentSlot {
    agent: Box<dyn Agent>,
    /// Orders not yet known to be inert, in submission order
    active: Vec<OrderRef>,
}

/// Everything the dispatcher mutates, kept apart from the kernel so both can
/// be borrowed at once.
struct World<S> {
    markets: Vec<Market>,
    quote_relays: Vec<QuoteRelay>,
    transaction_relays: Vec<TransactionRelay>,
    sip: Sip,
    agents: Vec<AgentSlot>,
    sink: S,
}

/// A complete simulated market system.
pub struct Simulation<S: ObservationSink = NullSink> {
    seed: u64,
    scheduler: Scheduler<Command>,
    world: World<S>,
}

impl Simulation<NullSink> {
    /// Simulation that reports nowhere.
    pub fn without_sink(seed: u64, sip_latency: Latency) -> Self {
        Self::new(seed, sip_latency, NullSink)
    }
}

impl<S: ObservationSink> Simulation<S> {
    /// Create an empty simulation at tick zero.
    ///
    /// `seed` fixes the order of same-tick batches and the generators handed
    /// out by [`agent_rng`](Self::agent_rng).
    pub fn new(seed: u64, sip_latency: Latency, sink: S) -> Self {
        Self {
            seed,
            scheduler: Scheduler::new(ChaCha8Rng::seed_from_u64(seed)),
            world: World {
                markets: Vec::new(),
                quote_relays: Vec::new(),
                transaction_relays: Vec::new(),
                sip: Sip::new(sip_latency),
                agents: Vec::new(),
                sink,
            },
        }
    }

    // === Construction ===

    /// Add a market together with its primary quote and transaction relays.
    ///
    /// A call market's first clear is scheduled immediately.
    pub fn add_market(&mut self, spec: MarketSpec) -> Result<MarketId> {
        spec.validate()?;
        let world = &mut self.world;
        let id = MarketId(world.markets.len());

        let quote_relay = RelayId(world.quote_relays.len());
        world
            .quote_relays
            .push(QuoteRelay::new(quote_relay, id, spec.quote_latency, None));
        let transaction_relay = RelayId(world.transaction_relays.len());
        world.transaction_relays.push(TransactionRelay::new(
            transaction_relay,
            id,
            spec.transaction_latency,
            Audience::Counterparties {
                private: FxHashSet::default(),
            },
        ));

        world
            .markets
            .push(Market::new(id, &spec, quote_relay, transaction_relay)?);
        if let MarketKind::Call { .. } = spec.kind {
            self.scheduler.schedule_immediate(Command::Clear { market: id });
        }
        info!(
            "{id}: {:?} market, quote latency {}, transaction latency {}",
            spec.kind, spec.quote_latency, spec.transaction_latency
        );
        Ok(id)
    }

    /// Attach an extra quote relay to `market`. A subscriber's strategy runs
    /// whenever a fresh quote reaches the relay.
    pub fn add_quote_relay(
        &mut self,
        market: MarketId,
        latency: Latency,
        subscriber: Option<AgentId>,
    ) -> Result<RelayId> {
        if let Some(agent) = subscriber {
            self.world.check_agent(agent)?;
        }
        let world = &mut self.world;
        let target = world
            .markets
            .get_mut(market.index())
            .ok_or(Error::UnknownMarket(market))?;
        let id = RelayId(world.quote_relays.len());
        world
            .quote_relays
            .push(QuoteRelay::new(id, market, latency, subscriber));
        target.add_quote_endpoint(Endpoint::Relay(id));
        Ok(id)
    }

    /// Attach a private transaction relay that tells only `agent` about its
    /// fills in `market`. The market's primary relay stops notifying it.
    pub fn add_transaction_relay(
        &mut self,
        market: MarketId,
        latency: Latency,
        agent: AgentId,
    ) -> Result<RelayId> {
        self.world.check_agent(agent)?;
        let world = &mut self.world;
        let target = world
            .markets
            .get_mut(market.index())
            .ok_or(Error::UnknownMarket(market))?;
        let id = RelayId(world.transaction_relays.len());
        world.transaction_relays.push(TransactionRelay::new(
            id,
            market,
            latency,
            Audience::Agent(agent),
        ));
        target.add_transaction_endpoint(Endpoint::Relay(id));
        if let Some(primary) = world
            .transaction_relays
            .get_mut(target.transaction_relay().index())
        {
            primary.exclude(agent);
        }
        Ok(id)
    }

    /// Register an agent that arrives at `arrival`.
    ///
    /// # Panics
    ///
    /// Panics if `arrival` is a finite tick already in the past.
    pub fn add_agent<A: Agent + 'static>(&mut self, agent: A, arrival: Tick) -> AgentId {
        self.add_boxed_agent(Box::new(agent), arrival)
    }

    pub fn add_boxed_agent(&mut self, agent: Box<dyn Agent>, arrival: Tick) -> AgentId {
        let id = AgentId(self.world.agents.len());
        debug!("{id} {} arrives at {arrival}", agent.name());
        self.world.agents.push(AgentSlot {
            agent,
            active: Vec::new(),
        });
        self.scheduler
            .schedule(arrival, Command::AgentArrival { agent: id });
        id
    }

    /// Independent generator derived from the simulation seed. Stream 0
    /// belongs to the kernel.
    pub fn agent_rng(&self, stream: u64) -> ChaCha8Rng {
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        rng.set_stream(stream);
        rng
    }

    // === Direct operations ===
    //
    // Each runs the operation now, then drains the immediate work it caused
    // (clears, relay deliveries, agent reactions).

    /// Submit to the named market on behalf of `request.agent`.
    pub fn submit(&mut self, request: OrderRequest) -> Result<OrderRef> {
        let handle = self.world.submit(&mut self.scheduler, &request)?;
        self.drain_immediate()?;
        Ok(handle)
    }

    /// Submit to the named market or to the market the aggregator says is
    /// better. The handle shows where the order went.
    pub fn submit_routed(&mut self, request: OrderRequest) -> Result<OrderRef> {
        let handle = self.world.submit_routed(&mut self.scheduler, request)?;
        self.drain_immediate()?;
        Ok(handle)
    }

    /// Withdraw up to `quantity` from an order; returns the amount withdrawn.
    pub fn withdraw(&mut self, order: OrderRef, quantity: Quantity) -> Result<Quantity> {
        let withdrawn = self.world.withdraw(&mut self.scheduler, order, quantity)?;
        self.drain_immediate()?;
        Ok(withdrawn)
    }

    /// Clear a market now and return the trades. A call market also
    /// schedules its next clear.
    pub fn clear(&mut self, market: MarketId) -> Result<Vec<Transaction>> {
        let trades = self.world.clear(&mut self.scheduler, market)?;
        self.drain_immediate()?;
        Ok(trades.to_vec())
    }

    // === Running ===

    /// Schedule an arbitrary command.
    ///
    /// # Panics
    ///
    /// Panics if `tick` is a finite tick already in the past.
    pub fn schedule(&mut self, tick: Tick, command: Command) {
        self.scheduler.schedule(tick, command);
    }

    /// Run the next pending command. Returns false when nothing was pending.
    pub fn execute_next(&mut self) -> Result<bool> {
        let world = &mut self.world;
        let mut outcome = Ok(());
        let ran = self.scheduler.execute_next(|scheduler, now, command| {
            outcome = world.dispatch(scheduler, now, command);
        });
        outcome.map(|()| ran)
    }

    /// Run commands until none remain at or before `until`.
    pub fn drain_until(&mut self, until: Tick) -> Result<()> {
        while self.scheduler.has_pending_until(until) {
            self.execute_next()?;
        }
        Ok(())
    }

    /// Run every immediate command, including any they cause.
    pub fn drain_immediate(&mut self) -> Result<()> {
        self.drain_until(Tick::IMMEDIATE)
    }

    /// Run the simulation through tick `end` inclusive.
    pub fn run_until(&mut self, end: Tick) -> Result<()> {
        self.drain_until(end)?;
        info!(
            "Stopped at {} with {} pending commands",
            self.scheduler.now(),
            self.scheduler.len()
        );
        Ok(())
    }

    // === Queries ===

    #[inline]
    pub fn now(&self) -> Tick {
        self.scheduler.now()
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Number of pending commands.
    pub fn pending(&self) -> usize {
        self.scheduler.len()
    }

    pub fn market(&self, id: MarketId) -> Option<&Market> {
        self.world.markets.get(id.index())
    }

    pub fn markets(&self) -> &[Market] {
        &self.world.markets
    }

    /// A market's current quote, without relay latency.
    pub fn quote(&self, id: MarketId) -> Option<&Quote> {
        self.market(id).map(Market::quote)
    }

    pub fn quote_relay(&self, id: RelayId) -> Option<&QuoteRelay> {
        self.world.quote_relays.get(id.index())
    }

    pub fn transaction_relay(&self, id: RelayId) -> Option<&TransactionRelay> {
        self.world.transaction_relays.get(id.index())
    }

    pub fn sip(&self) -> &Sip {
        &self.world.sip
    }

    pub fn best_bid_offer(&self) -> &BestBidOffer {
        self.world.sip.best_bid_offer()
    }

    pub fn agent(&self, id: AgentId) -> Option<&dyn Agent> {
        self.world.agents.get(id.index()).map(|slot| &*slot.agent)
    }

    pub fn agent_count(&self) -> usize {
        self.world.agents.len()
    }

    /// Orders the simulation still considers active for `agent`.
    pub fn agent_orders(&self, id: AgentId) -> Option<&[OrderRef]> {
        self.world
            .agents
            .get(id.index())
            .map(|slot| slot.active.as_slice())
    }

    pub fn order(&self, handle: OrderRef) -> Option<&Order> {
        self.market(handle.market)?.order(handle.order)
    }

    pub fn sink(&self) -> &S {
        &self.world.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.world.sink
    }

    pub fn into_sink(self) -> S {
        self.world.sink
    }
}

impl<S: ObservationSink> World<S> {
    fn check_agent(&self, agent: AgentId) -> Result<()> {
        if agent.index() < self.agents.len() {
            Ok(())
        } else {
            Err(Error::UnknownAgent(agent))
        }
    }

    fn dispatch(
        &mut self,
        scheduler: &mut Scheduler<Command>,
        now: Tick,
        command: Command,
    ) -> Result<()> {
        match command {
            Command::AgentArrival { agent } => {
                self.sink.observe(&Observation::Arrival { agent, tick: now });
                self.invoke(scheduler, now, agent, true)
            }
            Command::AgentStrategy { agent } => self.invoke(scheduler, now, agent, false),
            Command::SubmitOrder(request) => self.submit(scheduler, &request).map(drop),
            Command::SubmitRoutedOrder(request) => {
                self.submit_routed(scheduler, request).map(drop)
            }
            Command::WithdrawOrder { order, quantity } => {
                self.withdraw(scheduler, order, quantity).map(drop)
            }
            Command::Clear { market } => self.clear(scheduler, market).map(drop),
            Command::SendQuote { endpoint, quote } => {
                let latency = self.quote_latency(endpoint)?;
                scheduler.schedule(
                    latency.deliver_at(now),
                    Command::DeliverQuote { endpoint, quote },
                );
                Ok(())
            }
            Command::SendTransactions {
                endpoint,
                transactions,
            } => {
                let latency = self.transaction_latency(endpoint)?;
                scheduler.schedule(
                    latency.deliver_at(now),
                    Command::DeliverTransactions {
                        endpoint,
                        transactions,
                    },
                );
                Ok(())
            }
            Command::DeliverQuote { endpoint, quote } => {
                self.deliver_quote(scheduler, now, endpoint, quote)
            }
            Command::DeliverTransactions {
                endpoint,
                transactions,
            } => self.deliver_transactions(endpoint, &transactions),
        }
    }

    /// Run an agent's arrival or strategy and schedule what it asked for.
    fn invoke(
        &mut self,
        scheduler: &mut Scheduler<Command>,
        now: Tick,
        id: AgentId,
        arriving: bool,
    ) -> Result<()> {
        let AgentSlot { agent, active } = self
            .agents
            .get_mut(id.index())
            .ok_or(Error::UnknownAgent(id))?;
        let mut ctx = AgentContext::new(
            id,
            now,
            &self.markets,
            &self.quote_relays,
            &self.sip,
            active,
        );
        if arriving {
            agent.arrive(&mut ctx);
        } else {
            agent.act(&mut ctx);
        }
        let (immediate, delayed) = ctx.into_requests();
        scheduler.schedule_batch(Tick::IMMEDIATE, immediate);
        for (tick, command) in delayed {
            scheduler.schedule(tick, command);
        }
        Ok(())
    }

    fn submit(
        &mut self,
        scheduler: &mut Scheduler<Command>,
        request: &OrderRequest,
    ) -> Result<OrderRef> {
        let slot = self
            .agents
            .get_mut(request.agent.index())
            .ok_or(Error::UnknownAgent(request.agent))?;
        let market = self
            .markets
            .get_mut(request.market.index())
            .ok_or(Error::UnknownMarket(request.market))?;
        let handle = market.submit(scheduler, request)?;
        slot.active.push(handle);
        Ok(handle)
    }

    fn submit_routed(
        &mut self,
        scheduler: &mut Scheduler<Command>,
        request: OrderRequest,
    ) -> Result<OrderRef> {
        let home = self
            .markets
            .get(request.market.index())
            .ok_or(Error::UnknownMarket(request.market))?;
        let market = home.route(&request, self.sip.best_bid_offer());
        self.submit(scheduler, &OrderRequest { market, ..request })
    }

    fn withdraw(
        &mut self,
        scheduler: &mut Scheduler<Command>,
        handle: OrderRef,
        quantity: Quantity,
    ) -> Result<Quantity> {
        let market = self
            .markets
            .get_mut(handle.market.index())
            .ok_or(Error::UnknownMarket(handle.market))?;
        let withdrawn = market.withdraw(scheduler, &mut self.sink, handle.order, quantity)?;
        if let Some(order) = market.order(handle.order).filter(|o| o.is_inert()) {
            if let Some(slot) = self.agents.get_mut(order.agent.index()) {
                slot.active.retain(|h| *h != handle);
            }
        }
        Ok(withdrawn)
    }

    fn clear(
        &mut self,
        scheduler: &mut Scheduler<Command>,
        market: MarketId,
    ) -> Result<Rc<[Transaction]>> {
        let target = self
            .markets
            .get_mut(market.index())
            .ok_or(Error::UnknownMarket(market))?;
        Ok(target.clear(scheduler, &mut self.sink))
    }

    fn quote_latency(&self, endpoint: Endpoint) -> Result<Latency> {
        match endpoint {
            Endpoint::Sip => Ok(self.sip.latency()),
            Endpoint::Relay(id) => self
                .quote_relays
                .get(id.index())
                .map(QuoteRelay::latency)
                .ok_or(Error::UnknownRelay(id)),
        }
    }

    fn transaction_latency(&self, endpoint: Endpoint) -> Result<Latency> {
        match endpoint {
            Endpoint::Sip => Ok(self.sip.latency()),
            Endpoint::Relay(id) => self
                .transaction_relays
                .get(id.index())
                .map(TransactionRelay::latency)
                .ok_or(Error::UnknownRelay(id)),
        }
    }

    fn deliver_quote(
        &mut self,
        scheduler: &mut Scheduler<Command>,
        now: Tick,
        endpoint: Endpoint,
        quote: Quote,
    ) -> Result<()> {
        match endpoint {
            Endpoint::Sip => {
                if self.sip.apply_quote(quote) {
                    let view = *self.sip.best_bid_offer();
                    self.sink
                        .observe(&Observation::BestBidOffer { tick: now, view });
                }
            }
            Endpoint::Relay(id) => {
                let relay = self
                    .quote_relays
                    .get_mut(id.index())
                    .ok_or(Error::UnknownRelay(id))?;
                debug!("{id} <- {quote}");
                if relay.apply(quote) {
                    if let Some(agent) = relay.subscriber() {
                        scheduler.schedule_immediate(Command::AgentStrategy { agent });
                    }
                }
            }
        }
        Ok(())
    }

    fn deliver_transactions(&mut self, endpoint: Endpoint, batch: &[Transaction]) -> Result<()> {
        let id = match endpoint {
            Endpoint::Sip => {
                self.sip.apply_transactions(batch);
                return Ok(());
            }
            Endpoint::Relay(id) => id,
        };
        let relay = self
            .transaction_relays
            .get_mut(id.index())
            .ok_or(Error::UnknownRelay(id))?;
        debug!("{id} <- {} transactions", batch.len());
        relay.apply(batch);

        let audience = relay.audience();
        for transaction in batch {
            let parties = [
                (transaction.buyer, transaction.buy_ref()),
                (transaction.seller, transaction.sell_ref()),
            ];
            for (agent, handle) in parties {
                if !audience.includes(agent) {
                    continue;
                }
                let Some(slot) = self.agents.get_mut(agent.index()) else {
                    continue;
                };
                let inert = self
                    .markets
                    .get(handle.market.index())
                    .and_then(|m| m.order(handle.order))
                    .is_some_and(Order::is_inert);
                if inert {
                    slot.active.retain(|h| *h != handle);
                }
                // A self-trade is reported once
                let repeat =
                    handle == transaction.sell_ref() && transaction.seller == transaction.buyer;
                if !repeat {
                    slot.agent.on_transaction(transaction);
                }
            }
        }
        Ok(())
    }
}
