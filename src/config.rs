//! Scheduler configuration.

use crate::errors::{MemoryError, ThreadResult, TimerError};
use crate::time::{DEFAULT_TIMER_HZ, MAX_TIMER_HZ, MIN_TIMER_HZ};

/// Ticks a thread may run before it is preempted.
pub const DEFAULT_TIME_SLICE: u32 = 4;

/// Default bound on threads with a page (the idle thread included).
pub const DEFAULT_MAX_THREADS: usize = 64;

/// Default size of a thread page.
pub const DEFAULT_PAGE_SIZE: usize = 16 * 1024;

const MIN_PAGE_SIZE: usize = 4096;

/// Tunables fixed for the lifetime of a [`Scheduler`](crate::Scheduler).
///
/// ```
/// use kthread_sched::SchedulerConfig;
///
/// let config = SchedulerConfig::default()
///     .with_timer_hz(1000)
///     .with_time_slice(10);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Timer interrupts per second
    pub timer_hz: u32,
    /// Ticks per time slice
    pub time_slice: u32,
    /// Maximum number of threads owning a page
    pub max_threads: usize,
    /// Bytes per thread page
    pub page_size: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            timer_hz: DEFAULT_TIMER_HZ,
            time_slice: DEFAULT_TIME_SLICE,
            max_threads: DEFAULT_MAX_THREADS,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl SchedulerConfig {
    pub fn with_timer_hz(mut self, hz: u32) -> Self {
        self.timer_hz = hz;
        self
    }

    pub fn with_time_slice(mut self, ticks: u32) -> Self {
        self.time_slice = ticks;
        self
    }

    pub fn with_max_threads(mut self, max: usize) -> Self {
        self.max_threads = max;
        self
    }

    pub fn with_page_size(mut self, bytes: usize) -> Self {
        self.page_size = bytes;
        self
    }

    /// Check every field against its supported range.
    pub fn validate(&self) -> ThreadResult<()> {
        if !(MIN_TIMER_HZ..=MAX_TIMER_HZ).contains(&self.timer_hz) {
            return Err(TimerError::UnsupportedFrequency(self.timer_hz).into());
        }
        if self.time_slice == 0 {
            return Err(TimerError::InvalidTimeSlice(self.time_slice).into());
        }
        // Room for the idle thread plus at least one worker.
        if self.max_threads < 2 {
            return Err(MemoryError::InvalidCapacity(self.max_threads).into());
        }
        if !self.page_size.is_power_of_two() || self.page_size < MIN_PAGE_SIZE {
            return Err(MemoryError::InvalidPageSize(self.page_size).into());
        }
        Ok(())
    }
}
