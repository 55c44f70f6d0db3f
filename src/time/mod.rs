//! Time keeping: the tick counter and sub-tick delays.

pub mod delay;
pub mod tick;

pub use tick::TickCounter;

/// Number of timer interrupts since the scheduler came up.
///
/// 64 bits never wrap within any realistic uptime, so differences between
/// ticks are plain subtraction.
pub type Tick = u64;

/// Lowest supported timer frequency. The 8254 PIT cannot divide its input
/// clock far enough to go slower.
pub const MIN_TIMER_HZ: u32 = 19;

/// Highest supported timer frequency.
pub const MAX_TIMER_HZ: u32 = 1000;

/// Timer frequency used when none is configured.
pub const DEFAULT_TIMER_HZ: u32 = 100;

/// A duration of time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Duration(u64);

impl Duration {
    pub const ZERO: Duration = Duration(0);

    /// Create a duration from nanoseconds.
    pub const fn from_nanos(nanos: u64) -> Self {
        Self(nanos)
    }

    /// Create a duration from microseconds.
    pub const fn from_micros(micros: u64) -> Self {
        Self(micros.saturating_mul(1_000))
    }

    /// Create a duration from milliseconds.
    pub const fn from_millis(millis: u64) -> Self {
        Self(millis.saturating_mul(1_000_000))
    }

    /// Create a duration from whole seconds.
    pub const fn from_secs(secs: u64) -> Self {
        Self(secs.saturating_mul(1_000_000_000))
    }

    /// Get nanoseconds in this duration.
    pub const fn as_nanos(self) -> u64 {
        self.0
    }

    /// Get microseconds in this duration.
    pub const fn as_micros(self) -> u64 {
        self.0 / 1_000
    }

    /// Get milliseconds in this duration.
    pub const fn as_millis(self) -> u64 {
        self.0 / 1_000_000
    }
}

impl core::ops::Add for Duration {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Self(self.0.saturating_add(other.0))
    }
}
