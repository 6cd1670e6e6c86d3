//! Zero-intelligence background traders

use log::info;
use rand::Rng;
use rand_chacha::ChaCha8Rng;

use crate::agent::{Agent, AgentContext};
use crate::{AgentId, Expiry, MarketId, Price, Side, Tick, Transaction};

/// Exponentially distributed waits, rounded up to whole ticks.
///
/// A rate of zero yields nothing, i.e. "never again". So does a rate that is
/// not a finite positive number.
#[derive(Clone, Debug)]
pub struct ExpInterarrivals {
    rate: f64,
    rng: ChaCha8Rng,
}

impl ExpInterarrivals {
    pub fn new(rate: f64, rng: ChaCha8Rng) -> Self {
        Self { rate, rng }
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }
}

impl Iterator for ExpInterarrivals {
    type Item = Tick;

    fn next(&mut self) -> Option<Tick> {
        if !(self.rate > 0.0 && self.rate.is_finite()) {
            return None;
        }
        // 1 - u is in (0, 1], so the log is finite
        let u: f64 = self.rng.r#gen();
        let wait = -(1.0 - u).ln() / self.rate;
        Some(Tick(wait.ceil() as i64))
    }
}

/// Parameters shared by every zero-intelligence trader of a population.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ZiParams {
    /// Constant fundamental value the limit prices are drawn around
    pub fundamental: Price,
    /// Smallest distance from the agent's value
    pub range_min: i64,
    /// Largest distance from the agent's value
    pub range_max: i64,
    /// Price granularity of submitted limits
    pub tick_size: i64,
    /// Each agent's own value is the fundamental plus an offset drawn
    /// uniformly from `[-private_value_range, private_value_range]`
    pub private_value_range: i64,
    pub expiry: Expiry,
    /// Withdraw resting orders before each new submission
    pub withdraw_orders: bool,
}

impl Default for ZiParams {
    fn default() -> Self {
        Self {
            fundamental: Price(100_000),
            range_min: 0,
            range_max: 5_000,
            tick_size: 1,
            private_value_range: 0,
            expiry: Expiry::Never,
            withdraw_orders: false,
        }
    }
}

/// Submits one routed single-unit limit order per wake-up.
///
/// The side is a coin flip. A buy is priced uniformly in
/// `[value - range_max, value - range_min]`, a sell in
/// `[value + range_min, value + range_max]`, then clamped at zero and rounded
/// to the agent's tick size. `value` is the agent's own valuation, fixed when
/// it is created.
#[derive(Clone, Debug)]
pub struct ZiAgent {
    name: String,
    id: Option<AgentId>,
    market: MarketId,
    params: ZiParams,
    value: Price,
    rng: ChaCha8Rng,
    reentry: ExpInterarrivals,
    position: i64,
    cash: i64,
}

impl ZiAgent {
    pub fn new(
        name: impl Into<String>,
        market: MarketId,
        params: ZiParams,
        mut rng: ChaCha8Rng,
        reentry: ExpInterarrivals,
    ) -> Self {
        let range = params.private_value_range.abs();
        let value = Price(params.fundamental.0 + rng.gen_range(-range..=range));
        Self {
            name: name.into(),
            id: None,
            market,
            params,
            value,
            rng,
            reentry,
            position: 0,
            cash: 0,
        }
    }

    /// Home market; orders may be routed elsewhere.
    pub fn market(&self) -> MarketId {
        self.market
    }

    pub fn params(&self) -> &ZiParams {
        &self.params
    }

    /// Valuation the limit prices are drawn around.
    pub fn value(&self) -> Price {
        self.value
    }

    /// Net shares held.
    pub fn position(&self) -> i64 {
        self.position
    }

    /// Net cash in price units.
    pub fn cash(&self) -> i64 {
        self.cash
    }

    fn draw_price(&mut self, side: Side) -> Price {
        let ZiParams {
            range_min,
            range_max,
            tick_size,
            ..
        } = self.params;
        let (lo, hi) = (range_min.min(range_max) as f64, range_min.max(range_max) as f64);
        let offset = lo + self.rng.r#gen::<f64>() * (hi - lo);
        let raw = match side {
            Side::Buy => self.value.as_f64() - offset,
            Side::Sell => self.value.as_f64() + offset,
        };
        Price::from_f64(raw).nonnegative().quantize(tick_size)
    }
}

impl Agent for ZiAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn act(&mut self, ctx: &mut AgentContext<'_>) {
        if let Some(wait) = self.reentry.next() {
            ctx.reenter_after(wait);
        }
        if self.params.withdraw_orders {
            ctx.withdraw_all();
        }
        let side = if self.rng.gen_bool(0.5) {
            Side::Buy
        } else {
            Side::Sell
        };
        let price = self.draw_price(side);
        info!("{} ({}) ZI {side} 1 @ {price}", self.name, ctx.id());
        ctx.submit_routed(self.market, side, price, 1, self.params.expiry);
    }

    fn arrive(&mut self, ctx: &mut AgentContext<'_>) {
        self.id = Some(ctx.id());
        ctx.act_now();
    }

    fn on_transaction(&mut self, transaction: &Transaction) {
        let quantity = transaction.quantity as i64;
        let notional = transaction.price.0.saturating_mul(quantity);
        // A self-trade takes both branches and nets out
        if Some(transaction.buyer) == self.id {
            self.position += quantity;
            self.cash -= notional;
        }
        if Some(transaction.seller) == self.id {
            self.position -= quantity;
            self.cash += notional;
        }
    }
}
