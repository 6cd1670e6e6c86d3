//! Error types for the simulator.

#[cfg(feature = "config")]
use std::path::PathBuf;

use crate::{AgentId, MarketId, OrderRef, Quantity, RelayId};

/// Precondition failures and I/O errors.
///
/// A precondition failure during a run is fatal to that run: the simulator
/// does not retry or roll back.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("order quantity must be greater than zero")]
    NonPositiveQuantity,

    #[error("cannot withdraw {requested} from an order holding {held}")]
    WithdrawExceedsOrder { requested: Quantity, held: Quantity },

    #[error("unknown market {0}")]
    UnknownMarket(MarketId),

    #[error("unknown agent {0}")]
    UnknownAgent(AgentId),

    #[error("unknown order {0}")]
    UnknownOrder(OrderRef),

    #[error("unknown relay {0}")]
    UnknownRelay(RelayId),

    #[error("call market clear interval must be positive, got {0}")]
    InvalidClearInterval(i64),

    #[error("pricing policy must lie in [0, 1], got {0}")]
    InvalidPricingPolicy(f64),

    #[error("config error: {0}")]
    Config(String),

    #[cfg(feature = "config")]
    #[error("failed to read config file {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[cfg(feature = "config")]
    #[error("failed to parse config: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[cfg(feature = "jsonl")]
    #[error("failed to encode observation: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
