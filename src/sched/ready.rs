//! FIFO ready queue.

use crate::thread::ThreadId;
use alloc::collections::VecDeque;

/// Runnable threads in the order they became runnable.
///
/// Holds ids only. Capacity for every thread is reserved up front so that
/// pushing from interrupt context never allocates.
pub struct ReadyQueue {
    queue: VecDeque<ThreadId>,
}

impl ReadyQueue {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            queue: VecDeque::with_capacity(capacity),
        }
    }

    /// Append at the tail.
    pub fn push(&mut self, id: ThreadId) {
        debug_assert!(self.queue.len() < self.queue.capacity());
        self.queue.push_back(id);
    }

    /// Remove the head.
    pub fn pop(&mut self) -> Option<ThreadId> {
        self.queue.pop_front()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = ThreadId> + '_ {
        self.queue.iter().copied()
    }
}
