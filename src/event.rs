//! Time-indexed queue of command batches.
//!
//! Each tick holds one [`Event`]: a collection of batches. A batch keeps its
//! commands in FIFO order; batches at the same tick come out either
//! last-in-first-out (the immediate tick) or in seeded random order (every
//! finite tick).

use std::collections::{BTreeMap, VecDeque};

use rand::Rng;
use rand_chacha::ChaCha8Rng;

use crate::Tick;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Discipline {
    /// Stack of batches: a cascade of immediate work runs depth-first
    Lifo,
    /// Random batch order, drawn from the queue's generator
    Random,
}

/// Every command scheduled at one tick.
#[derive(Clone, Debug)]
pub struct Event<C> {
    batches: Vec<VecDeque<C>>,
    discipline: Discipline,
    len: usize,
}

impl<C> Event<C> {
    fn new(tick: Tick) -> Self {
        let discipline = if tick.is_immediate() {
            Discipline::Lifo
        } else {
            Discipline::Random
        };
        Self {
            batches: Vec::new(),
            discipline,
            len: 0,
        }
    }

    fn offer(&mut self, batch: VecDeque<C>, rng: &mut ChaCha8Rng) {
        self.batches.push(batch);
        if self.discipline == Discipline::Random {
            let last = self.batches.len() - 1;
            let swap = rng.gen_range(0..=last);
            self.batches.swap(swap, last);
        }
    }

    fn push_batch(&mut self, batch: VecDeque<C>, rng: &mut ChaCha8Rng) {
        self.len += batch.len();
        self.offer(batch, rng);
    }

    /// Take the head of the next batch; a partially consumed batch is
    /// offered back.
    fn poll(&mut self, rng: &mut ChaCha8Rng) -> Option<C> {
        let mut batch = self.batches.pop()?;
        let command = batch.pop_front();
        if !batch.is_empty() {
            self.offer(batch, rng);
        }
        if command.is_some() {
            self.len -= 1;
        }
        command
    }

    /// Number of commands.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Commands keyed by tick, earliest first. Never holds an empty event.
#[derive(Clone, Debug)]
pub struct EventQueue<C> {
    events: BTreeMap<Tick, Event<C>>,
    len: usize,
    rng: ChaCha8Rng,
}

impl<C> EventQueue<C> {
    /// Create an empty queue drawing batch order from `rng`.
    pub fn new(rng: ChaCha8Rng) -> Self {
        Self {
            events: BTreeMap::new(),
            len: 0,
            rng,
        }
    }

    /// Add one command at `tick`, as a batch of its own.
    pub fn push(&mut self, tick: Tick, command: C) {
        self.push_batch(tick, [command]);
    }

    /// Add commands at `tick` that must run in the given order relative to
    /// each other. Returns false (and does nothing) for an empty batch.
    pub fn push_batch<I>(&mut self, tick: Tick, commands: I) -> bool
    where
        I: IntoIterator<Item = C>,
    {
        let batch: VecDeque<C> = commands.into_iter().collect();
        if batch.is_empty() {
            return false;
        }
        self.len += batch.len();
        self.events
            .entry(tick)
            .or_insert_with(|| Event::new(tick))
            .push_batch(batch, &mut self.rng);
        true
    }

    /// Remove the next command of the earliest tick.
    pub fn pop(&mut self) -> Option<(Tick, C)> {
        let mut first = self.events.first_entry()?;
        let tick = *first.key();
        let command = first.get_mut().poll(&mut self.rng);
        if first.get().is_empty() {
            first.remove();
        }
        let command = command?;
        self.len -= 1;
        Some((tick, command))
    }

    /// Earliest tick with pending work.
    pub fn peek_tick(&self) -> Option<Tick> {
        self.events.keys().next().copied()
    }

    /// Number of pending commands.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Drop every pending command.
    pub fn clear(&mut self) {
        self.events.clear();
        self.len = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn queue() -> EventQueue<u32> {
        EventQueue::new(ChaCha8Rng::seed_from_u64(7))
    }

    fn drain(queue: &mut EventQueue<u32>) -> Vec<(Tick, u32)> {
        std::iter::from_fn(|| queue.pop()).collect()
    }

    #[test]
    fn earliest_tick_first() {
        let mut q = queue();
        q.push(Tick(10), 1);
        q.push(Tick(5), 2);
        q.push(Tick::IMMEDIATE, 3);
        assert_eq!(q.len(), 3);
        assert_eq!(q.peek_tick(), Some(Tick::IMMEDIATE));
        assert_eq!(
            drain(&mut q),
            vec![(Tick::IMMEDIATE, 3), (Tick(5), 2), (Tick(10), 1)]
        );
        assert!(q.is_empty());
        assert_eq!(q.peek_tick(), None);
    }

    #[test]
    fn immediate_batches_are_lifo() {
        let mut q = queue();
        q.push_batch(Tick::IMMEDIATE, [1, 2]);
        q.push_batch(Tick::IMMEDIATE, [3, 4]);
        let order: Vec<u32> = drain(&mut q).into_iter().map(|(_, c)| c).collect();
        assert_eq!(order, vec![3, 4, 1, 2]);
    }

    #[test]
    fn batch_order_survives_random_interleaving() {
        for seed in 0..50 {
            let mut q = EventQueue::new(ChaCha8Rng::seed_from_u64(seed));
            q.push_batch(Tick(3), [1, 2, 3]);
            for other in 10..20 {
                q.push(Tick(3), other);
            }
            let order: Vec<u32> = drain(&mut q)
                .into_iter()
                .map(|(_, c)| c)
                .filter(|c| *c < 10)
                .collect();
            assert_eq!(order, vec![1, 2, 3], "seed {seed}");
        }
    }

    #[test]
    fn empty_batch_is_ignored() {
        let mut q = queue();
        assert!(!q.push_batch(Tick(1), Vec::<u32>::new()));
        assert!(q.is_empty());
        assert_eq!(q.peek_tick(), None);
    }

    #[test]
    fn clear_drops_everything() {
        let mut q = queue();
        q.push(Tick(1), 1);
        q.push(Tick(2), 2);
        q.clear();
        assert!(q.is_empty());
        assert_eq!(q.pop(), None);
    }
}
