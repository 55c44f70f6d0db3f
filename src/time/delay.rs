//! Calibrated busy-waiting for delays shorter than one tick.

use super::tick::TickCounter;
use core::hint::black_box;

/// Measure how many [`busy_wait`] iterations fit in one tick.
///
/// Needs a live tick source: the counter must be advancing while this runs.
/// Finds the largest power of two that still fits, then refines the bits
/// below it.
pub fn calibrate(counter: &TickCounter) -> u32 {
    let mut loops_per_tick: u32 = 1 << 10;
    loop {
        let doubled = loops_per_tick << 1;
        assert!(doubled != 0, "delay calibration overflowed");
        if too_many_loops(counter, doubled as u64) {
            break;
        }
        loops_per_tick = doubled;
    }

    let high_bit = loops_per_tick;
    let mut test_bit = high_bit >> 1;
    while test_bit != high_bit >> 10 {
        if !too_many_loops(counter, (high_bit | test_bit) as u64) {
            loops_per_tick |= test_bit;
        }
        test_bit >>= 1;
    }
    loops_per_tick
}

/// `true` if `loops` iterations take longer than one tick.
pub fn too_many_loops(counter: &TickCounter, loops: u64) -> bool {
    // Start right on a tick edge.
    let start = counter.get();
    while counter.get() == start {
        core::hint::spin_loop();
    }

    let start = counter.get();
    busy_wait(loops);
    start != counter.get()
}

/// Spin for `loops` iterations.
///
/// Kept out of line so code alignment cannot skew the calibration.
#[inline(never)]
pub fn busy_wait(mut loops: u64) {
    while loops > 0 {
        loops = black_box(loops) - 1;
    }
}

/// Iterations needed to wait `num / denom` seconds at `frequency` Hz.
///
/// `denom` must be a multiple of 1000; the scaling is arranged so the
/// intermediate products stay small.
pub fn sub_tick_loops(loops_per_tick: u32, frequency: u32, num: u64, denom: u64) -> u64 {
    assert!(denom % 1000 == 0, "sub-tick delay denominator must be a multiple of 1000");
    let loops = loops_per_tick as u128 * num as u128 / 1000 * frequency as u128
        / (denom / 1000) as u128;
    loops.min(u64::MAX as u128) as u64
}
