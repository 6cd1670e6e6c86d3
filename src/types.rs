//! Core types: Tick, Price, Quantity, MarketTime and entity identifiers

use std::fmt;
use std::ops::Add;

/// Discrete simulated time.
///
/// Ticks are totally ordered. The reserved [`Tick::IMMEDIATE`] value sorts
/// before every finite tick: it is not a point on the timeline but the class
/// of zero-latency work that runs before anything else pending.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Tick(pub i64);

impl Tick {
    /// Zero-latency sentinel. Never advances the clock.
    pub const IMMEDIATE: Tick = Tick(-1);
    pub const ZERO: Tick = Tick(0);
    pub const MAX: Tick = Tick(i64::MAX);

    /// Create a tick. Negative values collapse to [`Tick::IMMEDIATE`].
    #[inline]
    pub fn new(ticks: i64) -> Self {
        if ticks < 0 { Tick::IMMEDIATE } else { Tick(ticks) }
    }

    #[inline]
    pub fn is_immediate(self) -> bool {
        self == Tick::IMMEDIATE
    }

    /// Raw tick count (`-1` for immediate).
    #[inline]
    pub fn ticks(self) -> i64 {
        self.0
    }
}

impl Add for Tick {
    type Output = Tick;

    /// Immediate is the additive identity; finite sums saturate.
    fn add(self, rhs: Tick) -> Tick {
        match (self.is_immediate(), rhs.is_immediate()) {
            (true, _) => rhs,
            (_, true) => self,
            _ => Tick(self.0.saturating_add(rhs.0)),
        }
    }
}

impl fmt::Display for Tick {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_immediate() {
            write!(f, "immediate")
        } else {
            write!(f, "{}t", self.0)
        }
    }
}

/// Price in currency sub-units ("ticks of price", distinct from time ticks).
///
/// One unit is a thousandth of a dollar, so `Price(100_000)` is $100.00.
/// `INF`/`NEG_INF` stand for "no quote" where a comparable value is needed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Price(pub i64);

impl Price {
    pub const ZERO: Price = Price(0);
    pub const INF: Price = Price(i64::MAX);
    // MIN + 1 so that negating NEG_INF gives INF
    pub const NEG_INF: Price = Price(i64::MIN + 1);

    /// Sub-units per dollar.
    pub const UNITS_PER_DOLLAR: i64 = 1000;

    /// Round a fractional price to the nearest unit, ties to even.
    ///
    /// Values at or beyond the representable range saturate to the
    /// infinite sentinels.
    pub fn from_f64(value: f64) -> Price {
        if value >= i64::MAX as f64 {
            Price::INF
        } else if value <= Price::NEG_INF.0 as f64 {
            Price::NEG_INF
        } else {
            Price(value.round_ties_even() as i64)
        }
    }

    /// Round to the nearest multiple of `tick_size` (ties to even multiple).
    ///
    /// A non-positive tick size leaves the price unchanged.
    #[inline]
    pub fn quantize(self, tick_size: i64) -> Price {
        Price(crate::clearing::quantize(self.0, tick_size))
    }

    /// Clamp negative prices to zero.
    #[inline]
    pub fn nonnegative(self) -> Price {
        self.max(Price::ZERO)
    }

    #[inline]
    pub fn is_infinite(self) -> bool {
        self == Price::INF || self == Price::NEG_INF
    }

    #[inline]
    pub fn as_f64(self) -> f64 {
        self.0 as f64
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Price::INF {
            return write!(f, "+inf");
        }
        if *self == Price::NEG_INF {
            return write!(f, "-inf");
        }
        let abs = self.0.unsigned_abs();
        let dollars = abs / Price::UNITS_PER_DOLLAR as u64;
        let mut frac = abs % Price::UNITS_PER_DOLLAR as u64;
        let mut digits = 3;
        while digits > 2 && frac % 10 == 0 {
            frac /= 10;
            digits -= 1;
        }
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(f, "{sign}${dollars}.{frac:0digits$}")
    }
}

/// Quantity of shares. Submitted quantities must be positive.
pub type Quantity = u64;

/// Total order over every action taken inside one market.
///
/// The tick comes from the scheduling kernel; the sequence is the market's
/// own strictly increasing counter and breaks same-tick ties.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MarketTime {
    pub tick: Tick,
    pub sequence: u64,
}

impl MarketTime {
    #[inline]
    pub fn new(tick: Tick, sequence: u64) -> Self {
        Self { tick, sequence }
    }
}

impl fmt::Display for MarketTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.tick, self.sequence)
    }
}

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
        #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
        pub struct $name(pub usize);

        impl $name {
            #[inline]
            pub fn index(self) -> usize {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        }
    };
}

entity_id!(
    /// Index of a market in the simulation.
    MarketId,
    "M"
);
entity_id!(
    /// Index of an agent in the simulation.
    AgentId,
    "A"
);
entity_id!(
    /// Stable handle of an order inside its market's arena.
    OrderId,
    "O"
);
entity_id!(
    /// Index of a quote or transaction relay.
    RelayId,
    "R"
);

/// Simulation-wide handle to an order: the market that owns it plus the
/// order's slot in that market's arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct OrderRef {
    pub market: MarketId,
    pub order: OrderId,
}

impl OrderRef {
    #[inline]
    pub fn new(market: MarketId, order: OrderId) -> Self {
        Self { market, order }
    }
}

impl fmt::Display for OrderRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.market, self.order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn immediate_sorts_first() {
        assert!(Tick::IMMEDIATE < Tick::ZERO);
        assert!(Tick::IMMEDIATE < Tick(1_000_000));
        assert_eq!(Tick::new(-7), Tick::IMMEDIATE);
    }

    #[test]
    fn tick_addition() {
        assert_eq!(Tick(5) + Tick(10), Tick(15));
        assert_eq!(Tick::IMMEDIATE + Tick(10), Tick(10));
        assert_eq!(Tick(10) + Tick::IMMEDIATE, Tick(10));
        assert_eq!(Tick::MAX + Tick(1), Tick::MAX);
    }

    #[test]
    fn tick_display() {
        assert_eq!(format!("{}", Tick(42)), "42t");
        assert_eq!(format!("{}", Tick::IMMEDIATE), "immediate");
    }

    #[test]
    fn price_display() {
        assert_eq!(format!("{}", Price(100_000)), "$100.00");
        assert_eq!(format!("{}", Price(100_500)), "$100.50");
        assert_eq!(format!("{}", Price(100_505)), "$100.505");
        assert_eq!(format!("{}", Price(-2_500)), "-$2.50");
        assert_eq!(format!("{}", Price::INF), "+inf");
        assert_eq!(format!("{}", Price::NEG_INF), "-inf");
    }

    #[test]
    fn price_from_f64_rounds_half_even() {
        assert_eq!(Price::from_f64(104.5), Price(104));
        assert_eq!(Price::from_f64(105.5), Price(106));
        assert_eq!(Price::from_f64(-0.4), Price(0));
        assert_eq!(Price::from_f64(f64::INFINITY), Price::INF);
    }

    #[test]
    fn price_nonnegative() {
        assert_eq!(Price(-5).nonnegative(), Price::ZERO);
        assert_eq!(Price(5).nonnegative(), Price(5));
    }

    #[test]
    fn market_time_orders_by_tick_then_sequence() {
        let a = MarketTime::new(Tick(100), 9);
        let b = MarketTime::new(Tick(105), 1);
        let c = MarketTime::new(Tick(105), 2);
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn id_display() {
        assert_eq!(format!("{}", MarketId(1)), "M1");
        assert_eq!(format!("{}", AgentId(3)), "A3");
        assert_eq!(format!("{}", OrderRef::new(MarketId(0), OrderId(7))), "M0/O7");
    }
}
