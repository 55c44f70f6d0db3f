//! Single-core preemptive round-robin scheduler.
//!
//! [`Scheduler`] is the one context object a kernel builds at boot and shares
//! by `'static` reference with its interrupt handlers. All mutable scheduling
//! state sits behind one spin lock that is only ever taken with interrupts
//! masked, which on a single core makes the lock uncontended: masking already
//! excludes the only other party, the tick handler.
//!
//! The scheduling decision itself lives here. The lifecycle entry points are in
//! [`lifecycle`](self::lifecycle) and the tick and sleep paths in
//! [`timer`](self::timer).

use crate::arch::{Arch, IntrLevel};
use crate::config::SchedulerConfig;
use crate::errors::{ScheduleError, ThreadResult};
use crate::mem::PagePool;
use crate::process::ProcessHooks;
use crate::thread::{priority, Link, Thread, ThreadId, ThreadStatus};
use crate::time::{Tick, TickCounter};
use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::vec::Vec;
use core::marker::PhantomData;
use portable_atomic::{AtomicBool, Ordering};
use spin::{Mutex, MutexGuard, Once};

pub mod lifecycle;
pub mod ready;
pub mod sleep;
pub mod stats;
pub mod timer;

pub use ready::ReadyQueue;
pub use sleep::SleepRegistry;
pub use stats::{ThreadCounts, TickStats};

/// Scheduler context for one CPU.
pub struct Scheduler<A: Arch> {
    state: Mutex<SchedState<A>>,
    config: SchedulerConfig,
    ticks: TickCounter,
    pages: PagePool,
    next_tid: Mutex<ThreadId>,
    initialized: AtomicBool,
    started: AtomicBool,
    /// Set while the tick handler runs
    in_interrupt: AtomicBool,
    /// Preemption requested by the tick handler, applied on its return path
    yield_on_return: AtomicBool,
    process: Once<&'static dyn ProcessHooks>,
    _arch: PhantomData<fn() -> A>,
}

/// Everything guarded by the scheduler lock.
pub(crate) struct SchedState<A: Arch> {
    /// Every live thread control block, boxed so saved contexts keep their
    /// address while the map changes.
    threads: BTreeMap<ThreadId, Box<Thread<A>>>,
    ready: ReadyQueue,
    sleepers: SleepRegistry,
    /// Dying threads whose pages are freed by the next scheduling decision
    reclaim: Vec<ThreadId>,
    current: Option<ThreadId>,
    idle: Option<ThreadId>,
    /// The bootstrap thread adopted by `init`
    initial: Option<ThreadId>,
    /// Ticks the current thread has run since it was dispatched
    slice_ticks: u32,
    stats: TickStats,
    switches: u64,
}

impl<A: Arch> SchedState<A> {
    fn thread(&self, id: ThreadId) -> &Thread<A> {
        match self.threads.get(&id) {
            Some(thread) => thread,
            None => panic!("no thread with id {}", id),
        }
    }

    fn thread_mut(&mut self, id: ThreadId) -> &mut Thread<A> {
        match self.threads.get_mut(&id) {
            Some(thread) => thread,
            None => panic!("no thread with id {}", id),
        }
    }

    fn current_id(&self) -> ThreadId {
        match self.current {
            Some(id) => id,
            None => panic!("scheduler not initialized"),
        }
    }

    fn is_idle(&self, id: ThreadId) -> bool {
        self.idle == Some(id)
    }

    /// Move a blocked thread to the tail of the ready queue.
    fn make_ready(&mut self, id: ThreadId) {
        ready_thread(&mut self.threads, &mut self.ready, self.idle, id);
    }

    /// Ready every sleeper whose wake tick is at or before `now`.
    fn wake_sleepers(&mut self, now: Tick) -> usize {
        let SchedState {
            threads,
            ready,
            sleepers,
            idle,
            ..
        } = self;
        sleepers.wake(now, |id| ready_thread(threads, ready, *idle, id))
    }
}

/// The idle thread is marked ready but never queued.
fn ready_thread<A: Arch>(
    threads: &mut BTreeMap<ThreadId, Box<Thread<A>>>,
    ready: &mut ReadyQueue,
    idle: Option<ThreadId>,
    id: ThreadId,
) {
    let thread = match threads.get_mut(&id) {
        Some(thread) => thread,
        None => panic!("no thread with id {}", id),
    };
    assert_eq!(
        thread.status,
        ThreadStatus::Blocked,
        "thread {} made ready while not blocked",
        id
    );
    thread.status = ThreadStatus::Ready;
    if idle == Some(id) {
        thread.link = Link::Unlinked;
    } else {
        thread.link = Link::Ready;
        ready.push(id);
    }
}

impl<A: Arch> Scheduler<A> {
    /// Build a scheduler. Nothing runs until [`Scheduler::init`].
    pub fn new(config: SchedulerConfig) -> ThreadResult<Self> {
        if let Err(err) = config.validate() {
            log::debug!("rejected scheduler config {:?}: {}", config, err);
            return Err(err);
        }

        // The bootstrap thread has no page but still takes a slot.
        let slots = config.max_threads + 1;
        Ok(Self {
            state: Mutex::new(SchedState {
                threads: BTreeMap::new(),
                ready: ReadyQueue::with_capacity(slots),
                sleepers: SleepRegistry::with_capacity(slots),
                reclaim: Vec::with_capacity(slots),
                current: None,
                idle: None,
                initial: None,
                slice_ticks: 0,
                stats: TickStats::default(),
                switches: 0,
            }),
            config,
            ticks: TickCounter::new(config.timer_hz),
            pages: PagePool::new(config.page_size, config.max_threads),
            next_tid: Mutex::new(ThreadId::FIRST),
            initialized: AtomicBool::new(false),
            started: AtomicBool::new(false),
            in_interrupt: AtomicBool::new(false),
            yield_on_return: AtomicBool::new(false),
            process: Once::new(),
            _arch: PhantomData,
        })
    }

    /// Adopt the running code as the bootstrap thread `main`.
    ///
    /// Must be called with interrupts off, before anything else touches the
    /// scheduler.
    pub fn init(&self) -> ThreadResult<()> {
        assert!(
            !A::interrupts_enabled(),
            "scheduler init with interrupts enabled"
        );
        if self
            .initialized
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(ScheduleError::AlreadyInitialized.into());
        }

        let id = self.allocate_tid();
        let mut main = Box::new(Thread::new(id, "main", priority::PRI_DEFAULT, None));
        main.status = ThreadStatus::Running;

        let mut state = self.state.lock();
        state.threads.insert(id, main);
        state.current = Some(id);
        state.initial = Some(id);
        drop(state);

        log::info!(
            "scheduler initialized: {} Hz timer, {}-tick slice, {} thread pages of {} bytes",
            self.config.timer_hz,
            self.config.time_slice,
            self.config.max_threads,
            self.config.page_size
        );
        Ok(())
    }

    /// Create the idle thread and turn on preemption by enabling interrupts.
    pub fn start(&'static self) -> ThreadResult<()> {
        if !self.initialized.load(Ordering::Acquire) {
            return Err(ScheduleError::NotInitialized.into());
        }
        if self
            .started
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(ScheduleError::AlreadyStarted.into());
        }

        let idle = match self.spawn("idle", priority::PRI_MIN, Box::new(idle_entry::<A>)) {
            Ok(idle) => idle,
            Err(err) => {
                self.started.store(false, Ordering::Release);
                return Err(err.into());
            }
        };
        self.with_state(|state| state.idle = Some(idle));

        log::info!("scheduler started, idle thread {}", idle);
        A::enable_interrupts();
        Ok(())
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Install the process layer callbacks. Later calls are ignored.
    pub fn set_process_hooks(&self, hooks: &'static dyn ProcessHooks) {
        self.process.call_once(|| hooks);
    }

    /// Body of the idle thread.
    ///
    /// Runs only when nothing else is ready. Each pass blocks so the next
    /// decision can pick a newly readied thread, and once resumed halts until
    /// the next interrupt.
    fn idle_loop(&self) -> ! {
        loop {
            A::disable_interrupts();
            self.block();
            A::wait_for_interrupt();
        }
    }

    /// Run `f` on the scheduler state with interrupts masked.
    fn with_state<R>(&self, f: impl FnOnce(&mut SchedState<A>) -> R) -> R {
        let old = A::intr_disable();
        let result = f(&mut self.state.lock());
        A::intr_set_level(old);
        result
    }

    fn allocate_tid(&self) -> ThreadId {
        let mut next = self.next_tid.lock();
        let id = *next;
        *next = id.next();
        id
    }

    fn activate(&self, next: ThreadId) {
        if let Some(hooks) = self.process.get() {
            hooks.activate(next);
        }
    }

    /// Give up the CPU, leaving the current thread in `status`.
    ///
    /// The caller has masked interrupts and, for `Ready` or `Blocked`, already
    /// linked the thread wherever it should wait.
    fn do_schedule(&self, mut guard: MutexGuard<'_, SchedState<A>>, status: ThreadStatus) {
        assert!(
            !A::interrupts_enabled(),
            "scheduling with interrupts enabled"
        );
        let curr = guard.current_id();
        assert_eq!(
            guard.thread(curr).status,
            ThreadStatus::Running,
            "thread {} is scheduling while not running",
            curr
        );

        self.reap(&mut guard);
        guard.thread_mut(curr).status = status;
        self.schedule(guard);
    }

    /// Free the pages of threads that died before the last switch.
    fn reap(&self, state: &mut SchedState<A>) {
        while let Some(id) = state.reclaim.pop() {
            if let Some(mut thread) = state.threads.remove(&id) {
                debug_assert_eq!(thread.status, ThreadStatus::Dying);
                if let Some(page) = thread.page.take() {
                    self.pages.free(page);
                }
            }
        }
    }

    /// Pick the next thread and switch to it.
    fn schedule(&self, mut guard: MutexGuard<'_, SchedState<A>>) {
        let state = &mut *guard;
        let curr = state.current_id();
        let next = match state.ready.pop().or(state.idle) {
            Some(next) => next,
            None => panic!("no runnable thread and no idle thread"),
        };

        assert_ne!(
            state.thread(curr).status,
            ThreadStatus::Running,
            "outgoing thread {} still running",
            curr
        );
        let incoming = state.thread_mut(next);
        assert!(
            incoming.is_intact(),
            "thread {} is corrupted: stack overflow or bad control block",
            next
        );
        incoming.status = ThreadStatus::Running;
        incoming.link = Link::Unlinked;
        state.current = Some(next);
        state.slice_ticks = 0;

        if curr == next {
            drop(guard);
            self.activate(next);
            return;
        }

        let outgoing = state.thread_mut(curr);
        let dying = outgoing.status == ThreadStatus::Dying;
        let prev_ctx: *mut A::SavedContext = &mut outgoing.context;
        let next_ctx: *const A::SavedContext = &state.thread(next).context;
        if dying && state.initial != Some(curr) {
            state.thread_mut(curr).link = Link::Reclaim;
            state.reclaim.push(curr);
        }
        state.switches += 1;
        drop(guard);

        self.activate(next);
        // SAFETY: both contexts live in boxed control blocks that stay put
        // until reaped, and the outgoing one is reaped only after this switch.
        // Interrupts are masked, so nothing touches them in between.
        unsafe { A::context_switch(prev_ctx, next_ctx) }
    }

    #[cfg(test)]
    pub(crate) fn with_state_for_test<R>(&self, f: impl FnOnce(&mut SchedState<A>) -> R) -> R {
        self.with_state(f)
    }
}

#[cfg(test)]
impl<A: Arch> SchedState<A> {
    pub(crate) fn thread_for_test(&mut self, id: ThreadId) -> &mut Thread<A> {
        self.thread_mut(id)
    }
}

fn idle_entry<A: Arch>(sched: &Scheduler<A>) {
    sched.idle_loop()
}

/// Interrupt level guard: restores the saved level on drop.
pub(crate) struct IntrGuard<A: Arch> {
    old: IntrLevel,
    _arch: PhantomData<fn() -> A>,
}

impl<A: Arch> IntrGuard<A> {
    pub(crate) fn disable() -> Self {
        Self {
            old: A::intr_disable(),
            _arch: PhantomData,
        }
    }
}

impl<A: Arch> Drop for IntrGuard<A> {
    fn drop(&mut self) {
        A::intr_set_level(self.old);
    }
}
