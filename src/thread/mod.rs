//! Thread control blocks.
//!
//! A [`Thread`] is owned by the scheduler for its whole life. The ready queue,
//! sleep registry and reclamation list refer to it by [`ThreadId`] only, and
//! [`Link`] records which of them (at most one) currently holds that id.

use crate::arch::Arch;
use crate::mem::Page;
use crate::sched::Scheduler;
use crate::time::Tick;
use alloc::boxed::Box;
use core::fmt;
use core::num::NonZeroUsize;

pub mod handle;

pub use handle::ThreadHandle;

/// Value stored in every intact thread control block.
pub const THREAD_MAGIC: u32 = 0xcd6a_bf4b;

/// Thread priorities. Stored and reported, not used for ordering.
pub mod priority {
    pub const PRI_MIN: u8 = 0;
    pub const PRI_DEFAULT: u8 = 31;
    pub const PRI_MAX: u8 = 63;
}

/// Body of a thread. Receives the scheduler it runs under.
pub type ThreadEntry<A> = Box<dyn FnOnce(&Scheduler<A>) + Send + 'static>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ThreadId(NonZeroUsize);

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl ThreadId {
    /// The id handed out first.
    pub const FIRST: ThreadId = ThreadId(NonZeroUsize::MIN);

    /// Get the raw ID value.
    pub fn get(self) -> usize {
        self.0.get()
    }

    /// The id allocated after this one.
    pub(crate) fn next(self) -> ThreadId {
        ThreadId(self.0.saturating_add(1))
    }
}

/// Lifecycle state of a thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ThreadStatus {
    /// Owns the CPU
    Running = 0,
    /// Runnable, waiting on the ready queue
    Ready = 1,
    /// Waiting for an unblock or a timed wake
    Blocked = 2,
    /// Exited, waiting for its page to be reclaimed
    Dying = 3,
}

/// Container currently holding a thread's id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Link {
    Unlinked,
    Ready,
    Sleeping,
    Reclaim,
}

/// Fixed-size thread name, truncated to 15 bytes.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct ThreadName {
    bytes: [u8; 16],
    len: u8,
}

impl ThreadName {
    pub const MAX_LEN: usize = 15;

    pub fn new(name: &str) -> Self {
        let mut len = name.len().min(Self::MAX_LEN);
        while !name.is_char_boundary(len) {
            len -= 1;
        }
        let mut bytes = [0u8; 16];
        bytes[..len].copy_from_slice(&name.as_bytes()[..len]);
        Self {
            bytes,
            len: len as u8,
        }
    }

    pub fn as_str(&self) -> &str {
        // Always cut at a char boundary of a valid str.
        core::str::from_utf8(&self.bytes[..self.len as usize]).unwrap_or("")
    }
}

impl fmt::Debug for ThreadName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self.as_str(), f)
    }
}

impl fmt::Display for ThreadName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Thread control block.
pub struct Thread<A: Arch> {
    pub(crate) id: ThreadId,
    pub(crate) name: ThreadName,
    pub(crate) status: ThreadStatus,
    pub(crate) priority: u8,
    /// Absolute tick to wake at, meaningful only while sleeping
    pub(crate) wake_tick: Tick,
    pub(crate) link: Link,
    magic: u32,
    /// Saved registers while not running
    pub(crate) context: A::SavedContext,
    /// Stack memory, `None` for the bootstrap thread
    pub(crate) page: Option<Page>,
    pub(crate) entry: Option<ThreadEntry<A>>,
}

impl<A: Arch> Thread<A> {
    /// New thread in the `Blocked` state.
    pub(crate) fn new(id: ThreadId, name: &str, priority: u8, page: Option<Page>) -> Self {
        Self {
            id,
            name: ThreadName::new(name),
            status: ThreadStatus::Blocked,
            priority,
            wake_tick: 0,
            link: Link::Unlinked,
            magic: THREAD_MAGIC,
            context: A::SavedContext::default(),
            page,
            entry: None,
        }
    }

    pub fn id(&self) -> ThreadId {
        self.id
    }

    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    pub fn status(&self) -> ThreadStatus {
        self.status
    }

    pub fn priority(&self) -> u8 {
        self.priority
    }

    /// Magic value and stack canary both intact.
    pub fn is_intact(&self) -> bool {
        self.magic == THREAD_MAGIC && self.page.as_ref().map_or(true, Page::check_canary)
    }

    pub(crate) fn handle(&self) -> ThreadHandle {
        ThreadHandle::new(self.id, self.name)
    }

    #[cfg(test)]
    pub(crate) fn corrupt_magic(&mut self) {
        self.magic = 0;
    }
}
