//! Tick accounting for the diagnostic dump.

use core::fmt;

/// Where each timer tick was spent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickStats {
    /// Ticks with the idle thread running
    pub idle: u64,
    /// Ticks in kernel threads
    pub kernel: u64,
    /// Ticks in threads that own a user address space
    pub user: u64,
}

impl TickStats {
    pub fn total(&self) -> u64 {
        self.idle + self.kernel + self.user
    }
}

impl fmt::Display for TickStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Thread: {} idle ticks, {} kernel ticks, {} user ticks",
            self.idle, self.kernel, self.user
        )
    }
}

/// Number of live threads by status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ThreadCounts {
    pub running: usize,
    pub ready: usize,
    pub blocked: usize,
    pub dying: usize,
}

impl ThreadCounts {
    pub fn total(&self) -> usize {
        self.running + self.ready + self.blocked + self.dying
    }
}
