//! Interface toward the process layer.
//!
//! The scheduler knows nothing about address spaces or user programs. A
//! kernel with a process layer installs [`ProcessHooks`] once and is told
//! about every dispatch and exit.

use crate::thread::ThreadId;

/// Callbacks into the process layer. All methods default to no-ops.
///
/// Every hook runs with interrupts disabled except [`ProcessHooks::exit`],
/// which runs in the exiting thread before it masks them. The scheduler lock
/// is never held across a hook, so hooks may query the scheduler
/// (`handle_of`, `status_of`, ...). They must not block, yield, sleep or exit:
/// [`ProcessHooks::is_user`] runs inside the timer interrupt and
/// [`ProcessHooks::activate`] in the middle of a switch.
pub trait ProcessHooks: Sync {
    /// `next` is about to get the CPU; activate its address space.
    fn activate(&self, next: ThreadId) {
        let _ = next;
    }

    /// `thread` is exiting; release whatever the process layer owns for it.
    fn exit(&self, thread: ThreadId) {
        let _ = thread;
    }

    /// `true` if `thread` runs a user program. Drives tick statistics.
    fn is_user(&self, thread: ThreadId) -> bool {
        let _ = thread;
        false
    }
}
