//! TOML configuration loading, validation and simulation assembly.

use std::path::Path;

use serde::Deserialize;

use crate::background::{ExpInterarrivals, ZiAgent, ZiParams};
use crate::error::{Error, Result};
use crate::market::MarketSpec;
use crate::observe::ObservationSink;
use crate::simulation::Simulation;
use crate::{Expiry, Latency, MarketId, Price, Tick};

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SimConfig {
    #[serde(default)]
    pub simulation: SimulationConfig,
    pub markets: Vec<MarketConfig>,
    #[serde(default)]
    pub agents: AgentsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SimulationConfig {
    /// TOML integers are signed, so the seed is read as `i64` and its bits
    /// reinterpreted: `-1` is `u64::MAX`, `i64::MIN` is `2^63`
    #[serde(default)]
    pub seed: i64,
    /// Last tick simulated
    #[serde(default = "default_length")]
    pub length: i64,
    /// Ticks; negative means immediate
    #[serde(default = "default_latency")]
    pub sip_latency: i64,
}

fn default_length() -> i64 {
    60_000
}
fn default_latency() -> i64 {
    -1
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            length: default_length(),
            sip_latency: default_latency(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarketKindConfig {
    /// Continuous double auction
    Cda,
    Call,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MarketConfig {
    pub kind: MarketKindConfig,
    #[serde(default = "default_latency")]
    pub quote_latency: i64,
    #[serde(default = "default_latency")]
    pub transaction_latency: i64,
    #[serde(default = "default_tick_size")]
    pub tick_size: i64,
    #[serde(default = "default_pricing_policy")]
    pub pricing_policy: f64,
    #[serde(default = "default_clear_interval")]
    pub clear_interval: i64,
}

fn default_tick_size() -> i64 {
    MarketSpec::DEFAULT_TICK_SIZE
}
fn default_pricing_policy() -> f64 {
    MarketSpec::DEFAULT_PRICING_POLICY
}
fn default_clear_interval() -> i64 {
    MarketSpec::DEFAULT_CLEAR_INTERVAL
}

impl MarketConfig {
    pub fn spec(&self) -> MarketSpec {
        let spec = match self.kind {
            MarketKindConfig::Cda => MarketSpec::continuous(),
            MarketKindConfig::Call => MarketSpec::call(self.clear_interval),
        };
        spec.with_quote_latency(Latency::from_ticks(self.quote_latency))
            .with_transaction_latency(Latency::from_ticks(self.transaction_latency))
            .with_tick_size(self.tick_size)
            .with_pricing_policy(self.pricing_policy)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AgentsConfig {
    pub zi: Option<ZiConfig>,
}

/// Zero-intelligence background population, spread round-robin over the
/// markets.
#[derive(Debug, Clone, Deserialize)]
pub struct ZiConfig {
    pub count: usize,
    /// Arrivals per tick; 0 puts every arrival at tick zero
    #[serde(default = "default_arrival_rate")]
    pub arrival_rate: f64,
    /// Re-entries per tick; 0 means each agent acts once
    #[serde(default = "default_reentry_rate")]
    pub reentry_rate: f64,
    #[serde(default = "default_fundamental")]
    pub fundamental: i64,
    #[serde(default)]
    pub range_min: i64,
    #[serde(default = "default_range_max")]
    pub range_max: i64,
    #[serde(default = "default_tick_size")]
    pub tick_size: i64,
    #[serde(default)]
    pub private_value_range: i64,
    /// Ticks; negative means never
    #[serde(default = "default_latency")]
    pub expiry: i64,
    #[serde(default)]
    pub withdraw_orders: bool,
}

fn default_arrival_rate() -> f64 {
    0.075
}
fn default_reentry_rate() -> f64 {
    0.005
}
fn default_fundamental() -> i64 {
    100_000
}
fn default_range_max() -> i64 {
    5_000
}

impl ZiConfig {
    pub fn params(&self) -> ZiParams {
        ZiParams {
            fundamental: Price(self.fundamental),
            range_min: self.range_min,
            range_max: self.range_max,
            tick_size: self.tick_size,
            private_value_range: self.private_value_range,
            expiry: Expiry::from_ticks(self.expiry),
            withdraw_orders: self.withdraw_orders,
        }
    }
}

impl SimConfig {
    /// Load config from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| Error::ConfigRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_toml(&contents)
    }

    /// Parse and validate config text.
    pub fn from_toml(text: &str) -> Result<Self> {
        let config: SimConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate config invariants.
    pub fn validate(&self) -> Result<()> {
        if self.markets.is_empty() {
            return Err(Error::Config("at least one market is required".into()));
        }
        if self.simulation.length < 0 {
            return Err(Error::Config("length must be >= 0".into()));
        }
        for market in &self.markets {
            market.spec().validate()?;
        }
        if let Some(zi) = &self.agents.zi {
            let rate_ok = |rate: f64| rate >= 0.0 && rate.is_finite();
            if !(rate_ok(zi.arrival_rate) && rate_ok(zi.reentry_rate)) {
                return Err(Error::Config("agent rates must be finite and >= 0".into()));
            }
            if zi.range_min < 0 || zi.range_max < zi.range_min {
                return Err(Error::Config(
                    "ZI range must satisfy 0 <= range_min <= range_max".into(),
                ));
            }
            if zi.private_value_range < 0 {
                return Err(Error::Config("ZI private_value_range must be >= 0".into()));
            }
            if zi.tick_size <= 0 {
                return Err(Error::Config("ZI tick_size must be > 0".into()));
            }
        }
        Ok(())
    }

    /// Simulation seed over the full `u64` range.
    pub fn seed(&self) -> u64 {
        self.simulation.seed as u64
    }

    /// Store a `u64` seed in its TOML representation.
    pub fn set_seed(&mut self, seed: u64) {
        self.simulation.seed = seed as i64;
    }

    pub fn length(&self) -> Tick {
        Tick(self.simulation.length)
    }

    /// Assemble the markets and agents into a ready-to-run simulation.
    pub fn build<S: ObservationSink>(&self, sink: S) -> Result<Simulation<S>> {
        self.validate()?;
        let mut sim = Simulation::new(
            self.seed(),
            Latency::from_ticks(self.simulation.sip_latency),
            sink,
        );
        let mut markets = Vec::with_capacity(self.markets.len());
        for market in &self.markets {
            markets.push(sim.add_market(market.spec())?);
        }

        if let Some(zi) = &self.agents.zi {
            Self::add_zi_agents(&mut sim, zi, &markets);
        }
        Ok(sim)
    }

    fn add_zi_agents<S: ObservationSink>(
        sim: &mut Simulation<S>,
        zi: &ZiConfig,
        markets: &[MarketId],
    ) {
        // Stream 0 drives the kernel, 1 the arrivals, then two per agent
        let mut arrivals = ExpInterarrivals::new(zi.arrival_rate, sim.agent_rng(1));
        let mut arrival = Tick::ZERO;
        for (n, &market) in (0..zi.count).zip(markets.iter().cycle()) {
            let stream = 2 + 2 * n as u64;
            let agent = ZiAgent::new(
                format!("zi{n}"),
                market,
                zi.params(),
                sim.agent_rng(stream),
                ExpInterarrivals::new(zi.reentry_rate, sim.agent_rng(stream + 1)),
            );
            sim.add_agent(agent, arrival);
            if let Some(wait) = arrivals.next() {
                arrival = arrival + wait;
            }
        }
    }
}
