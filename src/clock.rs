//! Two-phase clock: drives every attached chip through a rising half-phase
//! then a falling half-phase, in insertion order, pacing wall-clock time to
//! a target frequency.
//!
//! Generalized from the teacher's `player::spawn_player`/`player_loop`
//! thread-pacing shape (`wait_until` sleep-then-spin helper), with the
//! `crossbeam_channel::tick` timer swapped for the explicit tick/tock
//! dispatch and `nanosleep`-style pacing the spec calls for. Constants
//! (`TICKS_FOR_SYNC`, `CLOCK_ADJUST_GRANULARITY`) follow the original
//! `clock.c`.

use crate::bus::Bus;
use crate::error::{EmulatorError, Result};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

pub const MAX_CHIPS_ON_BUS: usize = 0xFF;
const TICKS_FOR_SYNC: u64 = 1000;
const CLOCK_ADJUST_GRANULARITY_NS: i64 = 100_000;

/// Anything that can be driven by the clock. Both methods default to a
/// no-op so chips that only care about one half-phase need implement one.
pub trait Chip {
    fn tick(&mut self, _bus: &mut Bus) {}
    fn tock(&mut self, _bus: &mut Bus) {}
}

pub struct Clock {
    chips: Vec<Box<dyn Chip + Send>>,
    target_hz: u32,
    adjust_ns: i64,
    turbo: bool,
    tick_count: AtomicU64,
}

impl Clock {
    pub fn new(target_hz: u32) -> Self {
        Self {
            chips: Vec::new(),
            target_hz,
            adjust_ns: 0,
            turbo: false,
            tick_count: AtomicU64::new(0),
        }
    }

    pub fn attach(&mut self, chip: Box<dyn Chip + Send>) -> Result<()> {
        if self.chips.len() >= MAX_CHIPS_ON_BUS {
            return Err(EmulatorError::TooManyChipsOnClock { limit: MAX_CHIPS_ON_BUS });
        }
        self.chips.push(chip);
        Ok(())
    }

    pub fn set_turbo(&mut self, turbo: bool) {
        self.turbo = turbo;
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count.load(Ordering::Relaxed)
    }

    pub fn nudge_adjust(&mut self, measured_hz: f64) {
        if measured_hz > self.target_hz as f64 {
            self.adjust_ns += CLOCK_ADJUST_GRANULARITY_NS;
        } else if measured_hz < self.target_hz as f64 {
            self.adjust_ns -= CLOCK_ADJUST_GRANULARITY_NS;
        }
    }

    fn tick_phase(&mut self, bus: &mut Bus) {
        for chip in self.chips.iter_mut() {
            chip.tick(bus);
        }
    }

    fn tock_phase(&mut self, bus: &mut Bus) {
        for chip in self.chips.iter_mut() {
            chip.tock(bus);
        }
    }

    /// One tick+tock pair, for the debugger's manual single-step command.
    pub fn single_step(&mut self, bus: &mut Bus) {
        self.tick_phase(bus);
        self.tock_phase(bus);
        self.tick_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Blocking run loop. Exits once `stop` is observed set.
    pub fn run(&mut self, bus: &mut Bus, stop: &AtomicBool) {
        let period_ns = 1_000_000_000f64 / self.target_hz as f64;
        let mut batch_start = Instant::now();

        loop {
            if stop.load(Ordering::Relaxed) {
                return;
            }
            self.single_step(bus);

            if self.tick_count() % TICKS_FOR_SYNC == 0 {
                if !self.turbo {
                    let elapsed = batch_start.elapsed();
                    let target = Duration::from_nanos(
                        (period_ns * TICKS_FOR_SYNC as f64) as u64,
                    );
                    let adjust = Duration::from_nanos(self.adjust_ns.unsigned_abs());
                    let target = if self.adjust_ns >= 0 {
                        target.saturating_add(adjust)
                    } else {
                        target.saturating_sub(adjust)
                    };
                    if target > elapsed {
                        std::thread::sleep(target - elapsed);
                    }
                }
                batch_start = Instant::now();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Counter(u32);
    impl Chip for Counter {
        fn tick(&mut self, _bus: &mut Bus) {
            self.0 += 1;
        }
    }

    #[test]
    fn single_step_advances_every_attached_chip() {
        let mut clock = Clock::new(1_000_000);
        clock.attach(Box::new(Counter(0))).unwrap();
        let mut bus = Bus::new();
        clock.single_step(&mut bus);
        clock.single_step(&mut bus);
        assert_eq!(clock.tick_count(), 2);
    }

    #[test]
    fn attach_overflow_is_rejected() {
        let mut clock = Clock::new(1_000_000);
        for _ in 0..MAX_CHIPS_ON_BUS {
            clock.attach(Box::new(Counter(0))).unwrap();
        }
        assert!(clock.attach(Box::new(Counter(0))).is_err());
    }
}
