//! Thread lifecycle: create, block, unblock, yield, exit.

use super::{IntrGuard, Scheduler, ThreadCounts};
use crate::arch::Arch;
use crate::errors::SpawnError;
use crate::mem::PoolStats;
use crate::thread::{priority, Link, Thread, ThreadEntry, ThreadHandle, ThreadId, ThreadStatus};
use crate::time::Tick;
use alloc::boxed::Box;
use alloc::vec::Vec;
use portable_atomic::Ordering;

/// First code a new thread runs.
///
/// The scheduler switches with interrupts masked, so they are turned back on
/// before the body runs. A body that returns exits the thread.
extern "C" fn thread_entry<A: Arch>(sched: usize) -> ! {
    // SAFETY: `spawn` passes the address of a `'static` scheduler.
    let sched = unsafe { &*(sched as *const Scheduler<A>) };
    sched.run_current_entry();
    unreachable!("dying thread was scheduled again");
}

impl<A: Arch> Scheduler<A> {
    /// Start a new thread running `entry` and put it on the ready queue.
    ///
    /// The new thread does not run until the caller yields or is preempted.
    /// Fails without blocking if no thread page is free.
    pub fn create<F>(&'static self, name: &str, priority: u8, entry: F) -> Result<ThreadId, SpawnError>
    where
        F: FnOnce(&Scheduler<A>) + Send + 'static,
    {
        if priority > priority::PRI_MAX {
            return Err(SpawnError::InvalidPriority(priority));
        }
        let id = self.spawn(name, priority, Box::new(entry))?;
        self.unblock(id);
        log::debug!("created thread {} ({}) at priority {}", name, id, priority);
        Ok(id)
    }

    /// Allocate and register a thread, leaving it blocked.
    pub(super) fn spawn(&'static self, name: &str, priority: u8, entry: ThreadEntry<A>) -> Result<ThreadId, SpawnError> {
        if !self.initialized.load(Ordering::Acquire) {
            return Err(SpawnError::NotInitialized);
        }

        let page = {
            let _intr = IntrGuard::<A>::disable();
            self.pages.allocate().ok_or(SpawnError::OutOfMemory)?
        };
        let stack_top = page.top();
        let id = self.allocate_tid();

        let mut thread = Box::new(Thread::new(id, name, priority, Some(page)));
        thread.entry = Some(entry);
        A::init_context(
            &mut thread.context,
            thread_entry::<A> as usize,
            stack_top,
            self as *const Self as usize,
        );

        self.with_state(|state| {
            state.threads.insert(id, thread);
        });
        Ok(id)
    }

    /// Put the running thread to sleep until something unblocks it.
    ///
    /// Only for thread context, with interrupts already masked by the caller.
    /// Usually better to use a higher-level primitive built on top of this.
    pub fn block(&self) {
        assert!(
            !self.in_interrupt_context(),
            "block called from interrupt context"
        );
        assert!(
            !A::interrupts_enabled(),
            "block called with interrupts enabled"
        );
        let state = self.state.lock();
        self.do_schedule(state, ThreadStatus::Blocked);
    }

    /// Move a blocked thread to the tail of the ready queue.
    ///
    /// Safe from interrupt context. Does not preempt the caller, so several
    /// threads can be unblocked before the CPU is given up. Panics if `id` is
    /// not blocked, is sleeping on a timer, or is corrupted.
    pub fn unblock(&self, id: ThreadId) {
        self.with_state(|state| {
            let thread = state.thread(id);
            assert!(thread.is_intact(), "unblock of corrupted thread {}", id);
            assert_eq!(
                thread.status,
                ThreadStatus::Blocked,
                "unblock of thread {} which is not blocked",
                id
            );
            assert_eq!(
                thread.link,
                Link::Unlinked,
                "unblock of thread {} which is sleeping on a timer",
                id
            );
            state.make_ready(id);
        });
    }

    /// Give up the CPU. The caller stays runnable and may be picked again
    /// immediately.
    pub fn yield_now(&self) {
        assert!(
            !self.in_interrupt_context(),
            "yield called from interrupt context"
        );
        let _intr = IntrGuard::<A>::disable();
        let mut state = self.state.lock();
        let curr = state.current_id();
        if !state.is_idle(curr) {
            state.thread_mut(curr).link = Link::Ready;
            state.ready.push(curr);
        }
        self.do_schedule(state, ThreadStatus::Ready);
    }

    /// Terminate the running thread. Never returns.
    ///
    /// The thread's page is freed by a later scheduling decision, never while
    /// it still runs on it.
    pub fn exit(&self) -> ! {
        self.schedule_exit();
        unreachable!("dying thread was scheduled again");
    }

    /// Body of the trampoline: run the current thread's entry, then exit.
    ///
    /// Returns only where a switch does not really leave the thread.
    pub(crate) fn run_current_entry(&self) {
        let entry = self.with_state(|state| {
            let id = state.current_id();
            state.thread_mut(id).entry.take()
        });
        A::enable_interrupts();
        if let Some(entry) = entry {
            entry(self);
        }
        self.schedule_exit();
    }

    /// Everything `exit` does up to and including the final switch.
    pub(crate) fn schedule_exit(&self) {
        assert!(
            !self.in_interrupt_context(),
            "exit called from interrupt context"
        );
        let id = self.current_id();
        log::debug!("thread {} exiting", id);
        if let Some(hooks) = self.process.get() {
            hooks.exit(id);
        }

        A::disable_interrupts();
        let state = self.state.lock();
        self.do_schedule(state, ThreadStatus::Dying);
    }

    /// Handle of the running thread.
    ///
    /// Panics before `init` or if the running thread's control block or stack
    /// canary has been overwritten.
    pub fn current_thread(&self) -> ThreadHandle {
        assert!(
            self.initialized.load(Ordering::Acquire),
            "scheduler not initialized"
        );
        self.with_state(|state| {
            let thread = state.thread(state.current_id());
            assert!(
                thread.is_intact(),
                "thread {} is corrupted: stack overflow or bad control block",
                thread.id()
            );
            assert_eq!(thread.status, ThreadStatus::Running);
            thread.handle()
        })
    }

    pub fn current_id(&self) -> ThreadId {
        self.with_state(|state| state.current_id())
    }

    /// Set the running thread's priority, clamped to `PRI_MAX`.
    pub fn set_priority(&self, priority: u8) {
        self.with_state(|state| {
            let curr = state.current_id();
            state.thread_mut(curr).priority = priority.min(priority::PRI_MAX);
        });
    }

    /// The running thread's priority.
    pub fn priority(&self) -> u8 {
        self.with_state(|state| state.thread(state.current_id()).priority())
    }

    pub fn status_of(&self, id: ThreadId) -> Option<ThreadStatus> {
        self.with_state(|state| state.threads.get(&id).map(|t| t.status()))
    }

    pub fn handle_of(&self, id: ThreadId) -> Option<ThreadHandle> {
        self.with_state(|state| state.threads.get(&id).map(|t| t.handle()))
    }

    /// Ready queue contents, head first.
    pub fn ready_ids(&self) -> Vec<ThreadId> {
        self.with_state(|state| state.ready.iter().collect())
    }

    /// Sleeping threads with their wake ticks, earliest first.
    pub fn sleeping(&self) -> Vec<(ThreadId, Tick)> {
        self.with_state(|state| state.sleepers.iter().collect())
    }

    pub fn thread_counts(&self) -> ThreadCounts {
        self.with_state(|state| {
            let mut counts = ThreadCounts::default();
            for thread in state.threads.values() {
                match thread.status() {
                    ThreadStatus::Running => counts.running += 1,
                    ThreadStatus::Ready => counts.ready += 1,
                    ThreadStatus::Blocked => counts.blocked += 1,
                    ThreadStatus::Dying => counts.dying += 1,
                }
            }
            counts
        })
    }

    pub fn idle_id(&self) -> Option<ThreadId> {
        self.with_state(|state| state.idle)
    }

    pub fn page_stats(&self) -> PoolStats {
        self.pages.stats()
    }

    /// Dying threads whose pages have not been freed yet.
    pub fn pending_reclaim(&self) -> usize {
        self.with_state(|state| state.reclaim.len())
    }

    /// Switches between distinct threads so far.
    pub fn context_switches(&self) -> u64 {
        self.with_state(|state| state.switches)
    }
}
