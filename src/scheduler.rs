//! Discrete-event scheduling kernel.
//!
//! The scheduler owns the simulated clock and the [`EventQueue`]. It is
//! generic over the command type, so it can drive anything that can be
//! executed one command at a time.

use std::fmt;

use log::debug;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::Tick;
use crate::event::EventQueue;

/// Clock plus pending commands.
///
/// Time only moves forward: popping a command advances the clock to the
/// command's tick (immediate commands never move it).
#[derive(Clone, Debug)]
pub struct Scheduler<C> {
    queue: EventQueue<C>,
    now: Tick,
}

impl<C> Scheduler<C> {
    /// Create a scheduler at tick zero ordering same-tick batches with `rng`.
    pub fn new(rng: ChaCha8Rng) -> Self {
        Self {
            queue: EventQueue::new(rng),
            now: Tick::ZERO,
        }
    }

    /// Create a scheduler whose batch order is reproducible from `seed`.
    pub fn with_seed(seed: u64) -> Self {
        Self::new(ChaCha8Rng::seed_from_u64(seed))
    }

    /// Current simulated time.
    #[inline]
    pub fn now(&self) -> Tick {
        self.now
    }

    // === Scheduling ===

    /// Schedule one command.
    ///
    /// # Panics
    ///
    /// Panics if `tick` is a finite tick before the current time.
    pub fn schedule(&mut self, tick: Tick, command: C) {
        self.check_not_past(tick);
        self.queue.push(tick, command);
    }

    /// Schedule commands that must run in the given order relative to each
    /// other, whatever else is scheduled at `tick`. Returns false for an
    /// empty batch.
    ///
    /// # Panics
    ///
    /// Panics if `tick` is a finite tick before the current time.
    pub fn schedule_batch<I>(&mut self, tick: Tick, commands: I) -> bool
    where
        I: IntoIterator<Item = C>,
    {
        self.check_not_past(tick);
        self.queue.push_batch(tick, commands)
    }

    /// Schedule a command in the immediate class.
    pub fn schedule_immediate(&mut self, command: C) {
        self.queue.push(Tick::IMMEDIATE, command);
    }

    fn check_not_past(&self, tick: Tick) {
        assert!(
            tick.is_immediate() || tick >= self.now,
            "cannot schedule at {tick}, current time is {}",
            self.now
        );
    }

    // === Execution ===

    /// Remove the next command and advance the clock to its tick.
    ///
    /// Returns the clock after the advance together with the command.
    pub fn pop_next(&mut self) -> Option<(Tick, C)> {
        let (tick, command) = self.queue.pop()?;
        self.now = self.now.max(tick);
        Some((self.now, command))
    }

    /// Earliest tick with pending work.
    #[inline]
    pub fn peek_tick(&self) -> Option<Tick> {
        self.queue.peek_tick()
    }

    /// Whether a command is pending at or before `tick`.
    #[inline]
    pub fn has_pending_until(&self, tick: Tick) -> bool {
        self.peek_tick().is_some_and(|next| next <= tick)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Number of pending commands.
    #[inline]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Drop every pending command. The clock is left where it is.
    pub fn clear(&mut self) {
        self.queue.clear();
    }
}

impl<C: fmt::Debug> Scheduler<C> {
    /// Pop and run the next command with `handler`, which may schedule more
    /// work. Returns false when nothing was pending.
    pub fn execute_next<F>(&mut self, mut handler: F) -> bool
    where
        F: FnMut(&mut Self, Tick, C),
    {
        let Some((now, command)) = self.pop_next() else {
            return false;
        };
        debug!("{now} | {command:?}");
        handler(self, now, command);
        true
    }

    /// Run commands until none remain at or before `until`. Immediate
    /// commands are always at or before any tick.
    pub fn drain_until<F>(&mut self, until: Tick, mut handler: F)
    where
        F: FnMut(&mut Self, Tick, C),
    {
        while self.has_pending_until(until) {
            self.execute_next(&mut handler);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    enum Cmd {
        Log(u32),
        /// Schedule `Log(n)` after `delay` ticks
        Spawn(u32, Tick),
        /// Schedule two immediate logs
        Cascade(u32),
    }

    fn run(sched: &mut Scheduler<Cmd>, until: Tick) -> Vec<(Tick, u32)> {
        let mut log = Vec::new();
        sched.drain_until(until, |s, now, cmd| match cmd {
            Cmd::Log(n) => log.push((now, n)),
            Cmd::Spawn(n, delay) => s.schedule(now + delay, Cmd::Log(n)),
            Cmd::Cascade(n) => {
                s.schedule_immediate(Cmd::Log(n));
                s.schedule_immediate(Cmd::Log(n + 1));
            }
        });
        log
    }

    #[test]
    fn clock_advances_with_commands() {
        let mut sched = Scheduler::with_seed(1);
        sched.schedule(Tick(5), Cmd::Log(1));
        sched.schedule(Tick(9), Cmd::Spawn(2, Tick(3)));
        assert_eq!(run(&mut sched, Tick(20)), vec![(Tick(5), 1), (Tick(12), 2)]);
        assert_eq!(sched.now(), Tick(12));
        assert!(sched.is_empty());
    }

    #[test]
    fn drain_until_stops_at_boundary() {
        let mut sched = Scheduler::with_seed(1);
        sched.schedule(Tick(5), Cmd::Log(1));
        sched.schedule(Tick(6), Cmd::Log(2));
        assert_eq!(run(&mut sched, Tick(5)), vec![(Tick(5), 1)]);
        assert_eq!(sched.len(), 1);
        assert_eq!(sched.peek_tick(), Some(Tick(6)));
    }

    #[test]
    fn immediate_does_not_move_clock() {
        let mut sched = Scheduler::with_seed(1);
        sched.schedule(Tick(4), Cmd::Log(0));
        run(&mut sched, Tick(4));
        sched.schedule_immediate(Cmd::Log(1));
        assert_eq!(run(&mut sched, Tick::IMMEDIATE), vec![(Tick(4), 1)]);
        assert_eq!(sched.now(), Tick(4));
    }

    #[test]
    fn immediate_cascade_runs_depth_first() {
        let mut sched = Scheduler::with_seed(1);
        sched.schedule_batch(Tick::IMMEDIATE, [Cmd::Cascade(10), Cmd::Log(1)]);
        // Cascade's children run before the rest of its batch resumes
        assert_eq!(
            run(&mut sched, Tick::IMMEDIATE)
                .into_iter()
                .map(|(_, n)| n)
                .collect::<Vec<_>>(),
            vec![11, 10, 1]
        );
    }

    #[test]
    fn execute_next_on_empty_is_false() {
        let mut sched: Scheduler<Cmd> = Scheduler::with_seed(1);
        assert!(!sched.execute_next(|_, _, _| unreachable!()));
    }

    #[test]
    #[should_panic(expected = "cannot schedule at 3t")]
    fn scheduling_into_the_past_panics() {
        let mut sched = Scheduler::with_seed(1);
        sched.schedule(Tick(10), Cmd::Log(0));
        run(&mut sched, Tick(10));
        sched.schedule(Tick(3), Cmd::Log(1));
    }

    #[test]
    fn same_seed_same_order() {
        let order = |seed| {
            let mut sched = Scheduler::with_seed(seed);
            for n in 0..20 {
                sched.schedule(Tick(1), Cmd::Log(n));
            }
            run(&mut sched, Tick(1))
        };
        assert_eq!(order(42), order(42));
    }
}
