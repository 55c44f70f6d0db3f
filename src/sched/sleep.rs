//! Sleep registry: blocked threads keyed by the tick they wake at.
//!
//! Entries are kept sorted by wake tick, ties in registration order, so a wake
//! pass drains a prefix and hands threads back in non-decreasing wake order.
//! The earliest wake tick is cached so the tick handler can tell in O(1) that
//! nothing is due. The cache may lag low after a wake but never exceeds the
//! true minimum, so a stale value costs a scan and never a missed wake.

use crate::thread::ThreadId;
use crate::time::Tick;
use alloc::vec::Vec;

/// Cached minimum of an empty registry.
pub const NEVER: Tick = Tick::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Sleeper {
    thread: ThreadId,
    wake_tick: Tick,
}

pub struct SleepRegistry {
    entries: Vec<Sleeper>,
    next_wake: Tick,
}

impl SleepRegistry {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            next_wake: NEVER,
        }
    }

    /// Add a thread that has already been marked blocked.
    ///
    /// A wake tick at or before the current tick is accepted and matures on
    /// the next due check.
    pub fn register(&mut self, thread: ThreadId, wake_tick: Tick) {
        debug_assert!(!self.contains(thread));
        let at = self.entries.partition_point(|s| s.wake_tick <= wake_tick);
        self.entries.insert(at, Sleeper { thread, wake_tick });
        self.next_wake = self.next_wake.min(wake_tick);
    }

    /// `true` if some sleeper may have matured by `now`.
    #[inline]
    pub fn due(&self, now: Tick) -> bool {
        self.next_wake <= now
    }

    /// Remove every sleeper with `wake_tick <= now`, earliest first, passing
    /// each to `on_wake`. Returns how many were woken.
    ///
    /// Only moves entries around; never allocates.
    pub fn wake(&mut self, now: Tick, mut on_wake: impl FnMut(ThreadId)) -> usize {
        let matured = self.entries.partition_point(|s| s.wake_tick <= now);
        for sleeper in self.entries.drain(..matured) {
            on_wake(sleeper.thread);
        }
        self.next_wake = self.entries.first().map_or(NEVER, |s| s.wake_tick);
        matured
    }

    /// Cached earliest wake tick, [`NEVER`] when empty.
    pub fn next_wake(&self) -> Tick {
        self.next_wake
    }

    pub fn contains(&self, thread: ThreadId) -> bool {
        self.entries.iter().any(|s| s.thread == thread)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sleepers with their wake ticks, earliest first.
    pub fn iter(&self) -> impl Iterator<Item = (ThreadId, Tick)> + '_ {
        self.entries.iter().map(|s| (s.thread, s.wake_tick))
    }
}
