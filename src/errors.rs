//! Error types for the recoverable failures of the scheduler.
//!
//! Only conditions a caller can reasonably react to are represented here.
//! Protocol violations (calling `block` from interrupt context, unblocking a
//! thread that is not blocked) and structural corruption (a damaged thread
//! canary) are programming errors inside the kernel and abort through a panic
//! instead.

#![allow(clippy::uninlined_format_args)]

use core::fmt;

/// Result type for scheduler operations.
pub type ThreadResult<T> = Result<T, ThreadError>;

/// Umbrella error type for all scheduler operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadError {
    /// Thread creation errors
    Spawn(SpawnError),
    /// Scheduler lifecycle errors
    Schedule(ScheduleError),
    /// Page pool configuration errors
    Memory(MemoryError),
    /// Timer configuration errors
    Timer(TimerError),
}

/// Errors that can occur while creating a thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpawnError {
    /// `Scheduler::init` has not run yet
    NotInitialized,
    /// No free page for the new thread
    OutOfMemory,
    /// Priority outside `PRI_MIN..=PRI_MAX`
    InvalidPriority(u8),
}

/// Errors related to bringing the scheduler up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleError {
    /// `init` was called twice
    AlreadyInitialized,
    /// `start` was called twice
    AlreadyStarted,
    /// `start` was called before `init`
    NotInitialized,
}

/// Page pool configuration errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryError {
    /// Page size is not a power of two of at least 4 KiB
    InvalidPageSize(usize),
    /// Thread capacity too small to hold the idle thread and one worker
    InvalidCapacity(usize),
}

/// Timer configuration errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerError {
    /// Tick frequency outside the supported hardware range
    UnsupportedFrequency(u32),
    /// A time slice must be at least one tick
    InvalidTimeSlice(u32),
}

impl fmt::Display for ThreadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ThreadError::Spawn(e) => write!(f, "Thread spawn error: {}", e),
            ThreadError::Schedule(e) => write!(f, "Scheduling error: {}", e),
            ThreadError::Memory(e) => write!(f, "Memory error: {}", e),
            ThreadError::Timer(e) => write!(f, "Timer error: {}", e),
        }
    }
}

impl fmt::Display for SpawnError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpawnError::NotInitialized => write!(f, "Scheduler not initialized"),
            SpawnError::OutOfMemory => write!(f, "Out of memory for thread creation"),
            SpawnError::InvalidPriority(prio) => write!(f, "Invalid priority: {}", prio),
        }
    }
}

impl fmt::Display for ScheduleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScheduleError::AlreadyInitialized => write!(f, "Scheduler already initialized"),
            ScheduleError::AlreadyStarted => write!(f, "Scheduler already started"),
            ScheduleError::NotInitialized => write!(f, "Scheduler not initialized"),
        }
    }
}

impl fmt::Display for MemoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemoryError::InvalidPageSize(size) => write!(f, "Invalid page size: {}", size),
            MemoryError::InvalidCapacity(cap) => write!(f, "Invalid thread capacity: {}", cap),
        }
    }
}

impl fmt::Display for TimerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimerError::UnsupportedFrequency(freq) => {
                write!(f, "Unsupported timer frequency: {} Hz", freq)
            }
            TimerError::InvalidTimeSlice(ticks) => write!(f, "Invalid time slice: {} ticks", ticks),
        }
    }
}

// Conversion implementations for ergonomic error handling

impl From<SpawnError> for ThreadError {
    fn from(error: SpawnError) -> Self {
        ThreadError::Spawn(error)
    }
}

impl From<ScheduleError> for ThreadError {
    fn from(error: ScheduleError) -> Self {
        ThreadError::Schedule(error)
    }
}

impl From<MemoryError> for ThreadError {
    fn from(error: MemoryError) -> Self {
        ThreadError::Memory(error)
    }
}

impl From<TimerError> for ThreadError {
    fn from(error: TimerError) -> Self {
        ThreadError::Timer(error)
    }
}
