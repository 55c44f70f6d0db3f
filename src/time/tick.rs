//! Tick counting and tick/real-time conversion.

use super::Tick;
use portable_atomic::{AtomicU32, AtomicU64, Ordering};

/// System tick counter.
///
/// Incremented once per timer interrupt and by nothing else. Also holds the
/// busy-wait calibration, which is a property of the same clock.
pub struct TickCounter {
    /// Number of ticks since the scheduler came up
    ticks: AtomicU64,
    /// Tick frequency in Hz
    frequency: u32,
    /// Nanoseconds per tick
    ns_per_tick: u64,
    /// Busy-wait iterations per tick, zero until calibrated
    loops_per_tick: AtomicU32,
}

impl TickCounter {
    /// Create a new tick counter with the given frequency.
    ///
    /// `frequency` must be non-zero; the scheduler config bounds it.
    pub const fn new(frequency: u32) -> Self {
        Self {
            ticks: AtomicU64::new(0),
            frequency,
            ns_per_tick: 1_000_000_000 / frequency as u64,
            loops_per_tick: AtomicU32::new(0),
        }
    }

    /// Advance by one tick and return the new count.
    ///
    /// Only the timer interrupt handler calls this.
    pub fn increment(&self) -> Tick {
        self.ticks.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Current tick count.
    pub fn get(&self) -> Tick {
        self.ticks.load(Ordering::Acquire)
    }

    /// Tick frequency in Hz.
    pub fn frequency(&self) -> u32 {
        self.frequency
    }

    pub fn ticks_to_nanos(&self, ticks: Tick) -> u64 {
        ticks.saturating_mul(self.ns_per_tick)
    }

    pub fn nanos_to_ticks(&self, nanos: u64) -> Tick {
        nanos / self.ns_per_tick
    }

    /// Whole ticks in `num / denom` seconds, rounded down.
    pub fn to_ticks(&self, num: u64, denom: u64) -> Tick {
        debug_assert!(denom != 0);
        let ticks = num as u128 * self.frequency as u128 / denom as u128;
        ticks.min(Tick::MAX as u128) as Tick
    }

    pub fn loops_per_tick(&self) -> u32 {
        self.loops_per_tick.load(Ordering::Acquire)
    }

    pub fn set_loops_per_tick(&self, loops: u32) {
        self.loops_per_tick.store(loops, Ordering::Release);
    }
}
