//! Observation sinks: where quotes, transactions, arrivals and best-bid-offer
//! updates are reported.
//!
//! The simulation owns one sink and threads it into every market and relay
//! operation that reports. Storage and format are up to the sink.
//!
//! With the `jsonl` feature, [`JsonLinesSink`] writes one JSON object per
//! line and [`read_observations`] loads such a file back.

use crate::{AgentId, BestBidOffer, Quote, Tick, Transaction};

/// One reported fact.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(tag = "kind", rename_all = "snake_case")
)]
pub enum Observation {
    /// An agent entered the simulation
    Arrival { agent: AgentId, tick: Tick },
    /// A market recomputed its quote
    Quote(Quote),
    /// A clear produced a trade
    Transaction(Transaction),
    /// The aggregator recomputed the cross-market view
    BestBidOffer { tick: Tick, view: BestBidOffer },
}

/// Receives observations as they happen.
pub trait ObservationSink {
    fn observe(&mut self, observation: &Observation);
}

impl<S: ObservationSink + ?Sized> ObservationSink for Box<S> {
    fn observe(&mut self, observation: &Observation) {
        (**self).observe(observation);
    }
}

/// Discards everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullSink;

impl ObservationSink for NullSink {
    #[inline]
    fn observe(&mut self, _observation: &Observation) {}
}

/// Keeps every observation in memory, in report order.
#[derive(Clone, Debug, Default)]
pub struct MemorySink {
    observations: Vec<Observation>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observations(&self) -> &[Observation] {
        &self.observations
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    pub fn transactions(&self) -> impl Iterator<Item = &Transaction> + '_ {
        self.observations.iter().filter_map(|o| match o {
            Observation::Transaction(t) => Some(t),
            _ => None,
        })
    }

    pub fn quotes(&self) -> impl Iterator<Item = &Quote> + '_ {
        self.observations.iter().filter_map(|o| match o {
            Observation::Quote(q) => Some(q),
            _ => None,
        })
    }

    pub fn best_bid_offers(&self) -> impl Iterator<Item = &BestBidOffer> + '_ {
        self.observations.iter().filter_map(|o| match o {
            Observation::BestBidOffer { view, .. } => Some(view),
            _ => None,
        })
    }

    pub fn clear(&mut self) {
        self.observations.clear();
    }
}

impl ObservationSink for MemorySink {
    fn observe(&mut self, observation: &Observation) {
        self.observations.push(observation.clone());
    }
}

#[cfg(feature = "jsonl")]
pub use jsonl::{JsonLinesSink, read_observations};

#[cfg(feature = "jsonl")]
mod jsonl {
    use std::io::{self, BufRead, BufWriter, Write};

    use super::{Observation, ObservationSink};
    use crate::error::{Error, Result};

    /// Writes each observation as one JSON object per line.
    ///
    /// `observe` cannot fail, so the first write error is kept and returned
    /// by [`JsonLinesSink::finish`]; later observations are dropped.
    #[derive(Debug)]
    pub struct JsonLinesSink<W: Write> {
        writer: BufWriter<W>,
        written: usize,
        error: Option<Error>,
    }

    impl<W: Write> JsonLinesSink<W> {
        pub fn new(writer: W) -> Self {
            Self {
                writer: BufWriter::new(writer),
                written: 0,
                error: None,
            }
        }

        /// Number of observations written so far.
        pub fn written(&self) -> usize {
            self.written
        }

        fn write(&mut self, observation: &Observation) -> Result<()> {
            let json = serde_json::to_string(observation)?;
            writeln!(self.writer, "{json}")?;
            Ok(())
        }

        /// Flush and return the underlying writer, or the first error hit.
        pub fn finish(mut self) -> Result<W> {
            if let Some(err) = self.error.take() {
                return Err(err);
            }
            self.writer
                .into_inner()
                .map_err(|e| Error::Io(e.into_error()))
        }
    }

    impl<W: Write> ObservationSink for JsonLinesSink<W> {
        fn observe(&mut self, observation: &Observation) {
            if self.error.is_some() {
                return;
            }
            match self.write(observation) {
                Ok(()) => self.written += 1,
                Err(err) => {
                    log::error!("observation sink stopped: {err}");
                    self.error = Some(err);
                }
            }
        }
    }

    /// Load observations from JSON Lines. Empty lines are skipped.
    pub fn read_observations<R: BufRead>(reader: R) -> Result<Vec<Observation>> {
        let mut observations = Vec::new();
        for (line_num, line) in reader.lines().enumerate() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let observation = serde_json::from_str(line).map_err(|e| {
                Error::Io(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("line {}: {}", line_num + 1, e),
                ))
            })?;
            observations.push(observation);
        }
        Ok(observations)
    }
}
