//! Handles given out to code outside the scheduler.

use super::{ThreadId, ThreadName};
use core::fmt;

/// Snapshot of a thread's identity.
///
/// Holding a handle does not keep the thread alive; the scheduler owns every
/// thread control block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreadHandle {
    id: ThreadId,
    name: ThreadName,
}

impl ThreadHandle {
    pub(crate) fn new(id: ThreadId, name: ThreadName) -> Self {
        Self { id, name }
    }

    pub fn id(&self) -> ThreadId {
        self.id
    }

    pub fn name(&self) -> &str {
        self.name.as_str()
    }
}

impl fmt::Display for ThreadHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.id)
    }
}
