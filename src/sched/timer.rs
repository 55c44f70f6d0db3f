//! Tick handling and timed sleep.
//!
//! The platform's timer interrupt handler calls
//! [`Scheduler::on_timer_interrupt`] once per tick with interrupts masked.
//! The handler itself never switches threads; a preemption it requests is
//! applied on the way out, back in thread context.

use super::{IntrGuard, Scheduler, SchedState, TickStats};
use crate::arch::{Arch, IntrLevel};
use crate::thread::{Link, ThreadStatus};
use crate::time::{delay, Duration, Tick, TickCounter};
use portable_atomic::Ordering;

impl<A: Arch> Scheduler<A> {
    /// Full timer interrupt: tick bookkeeping, then any preemption it asked for.
    pub fn on_timer_interrupt(&self) {
        self.timer_interrupt();
        if self.yield_on_return.swap(false, Ordering::AcqRel) {
            self.yield_now();
        }
    }

    /// Interrupt-context half of a tick.
    ///
    /// Advances the tick counter, readies matured sleepers and charges the
    /// tick to the running thread. Never blocks, allocates or switches.
    pub fn timer_interrupt(&self) {
        assert!(
            !A::interrupts_enabled(),
            "timer interrupt with interrupts enabled"
        );
        let nested = self.in_interrupt.swap(true, Ordering::AcqRel);
        assert!(!nested, "nested timer interrupt");

        let now = self.ticks.increment();
        if self.initialized.load(Ordering::Acquire) {
            let (curr, idle, woken) = {
                let mut state = self.state.lock();
                let woken = if state.sleepers.due(now) {
                    state.wake_sleepers(now)
                } else {
                    0
                };
                let curr = state.current_id();
                (curr, state.is_idle(curr), woken)
            };
            // Hooks may query the scheduler, so the lock is not held here.
            let user = !idle && self.process.get().map_or(false, |hooks| hooks.is_user(curr));
            self.thread_tick(&mut self.state.lock(), idle, user, woken);
        }

        self.in_interrupt.store(false, Ordering::Release);
    }

    /// Per-tick accounting for the running thread.
    fn thread_tick(&self, state: &mut SchedState<A>, idle: bool, user: bool, woken: usize) {
        if idle {
            state.stats.idle += 1;
            // The idle loop's next pass would switch anyway; this saves the pass.
            if woken > 0 {
                self.yield_on_return.store(true, Ordering::Release);
            }
        } else if user {
            state.stats.user += 1;
        } else {
            state.stats.kernel += 1;
        }

        state.slice_ticks += 1;
        if state.slice_ticks >= self.config.time_slice {
            self.yield_on_return.store(true, Ordering::Release);
        }
    }

    /// `true` while the tick handler is running.
    pub fn in_interrupt_context(&self) -> bool {
        self.in_interrupt.load(Ordering::Acquire)
    }

    /// Ticks since the scheduler was built.
    pub fn now(&self) -> Tick {
        let _intr = IntrGuard::<A>::disable();
        self.ticks.get()
    }

    /// Ticks elapsed since `since`, a value returned by [`Scheduler::now`].
    pub fn elapsed(&self, since: Tick) -> Tick {
        self.now().saturating_sub(since)
    }

    /// The underlying counter, for tick sources that run outside the
    /// interrupt handler (and for calibration harnesses).
    pub fn tick_counter(&self) -> &TickCounter {
        &self.ticks
    }

    /// Block the running thread until the tick counter reaches `wake_tick`.
    ///
    /// Wakes no earlier than `wake_tick`, possibly later. A tick already in
    /// the past still blocks until the next tick. Interrupts are restored to
    /// the caller's level once the thread runs again.
    pub fn sleep_until(&self, wake_tick: Tick) {
        assert!(
            !self.in_interrupt_context(),
            "sleep called from interrupt context"
        );
        let _intr = IntrGuard::<A>::disable();
        let mut state = self.state.lock();
        let curr = state.current_id();
        assert!(!state.is_idle(curr), "idle thread cannot sleep");

        // Registration and blocking happen under one mask, so the tick
        // handler can never see this thread blocked but unregistered.
        let thread = state.thread_mut(curr);
        thread.wake_tick = wake_tick;
        thread.link = Link::Sleeping;
        state.sleepers.register(curr, wake_tick);
        self.do_schedule(state, ThreadStatus::Blocked);
    }

    /// Sleep for `ticks` timer ticks. Interrupts must be on.
    pub fn sleep(&self, ticks: Tick) {
        let start = self.now();
        assert_eq!(A::intr_level(), IntrLevel::On, "sleep with interrupts off");
        self.sleep_until(start.saturating_add(ticks));
    }

    /// Sleep for `num / denom` seconds.
    ///
    /// Whole ticks are slept; anything shorter than one tick is busy-waited
    /// with the calibrated loop instead, since blocking would round it up to
    /// a full tick. Before [`Scheduler::calibrate_delay`] the busy-wait is a
    /// no-op.
    pub fn real_time_sleep(&self, num: u64, denom: u64) {
        let ticks = self.ticks.to_ticks(num, denom);
        assert_eq!(A::intr_level(), IntrLevel::On, "sleep with interrupts off");
        if ticks > 0 {
            self.sleep(ticks);
        } else {
            let loops = delay::sub_tick_loops(
                self.ticks.loops_per_tick(),
                self.ticks.frequency(),
                num,
                denom,
            );
            delay::busy_wait(loops);
        }
    }

    pub fn sleep_ms(&self, ms: u64) {
        self.real_time_sleep(ms, 1_000);
    }

    pub fn sleep_us(&self, us: u64) {
        self.real_time_sleep(us, 1_000_000);
    }

    pub fn sleep_ns(&self, ns: u64) {
        self.real_time_sleep(ns, 1_000_000_000);
    }

    pub fn sleep_for(&self, duration: Duration) {
        self.sleep_ns(duration.as_nanos());
    }

    /// Measure busy-wait speed against the live tick. Interrupts must be on.
    pub fn calibrate_delay(&self) -> u32 {
        assert_eq!(
            A::intr_level(),
            IntrLevel::On,
            "calibration needs the timer running"
        );
        let loops_per_tick = delay::calibrate(&self.ticks);
        self.ticks.set_loops_per_tick(loops_per_tick);
        log::info!(
            "calibrated delay loop: {} loops/s",
            loops_per_tick as u64 * self.ticks.frequency() as u64
        );
        loops_per_tick
    }

    /// Tick attribution so far.
    pub fn stats(&self) -> TickStats {
        self.with_state(|state| state.stats)
    }

    /// Log the idle/kernel/user tick counts.
    pub fn dump_stats(&self) {
        let stats = self.stats();
        log::info!("{}", stats);
    }

    /// Log the tick count.
    pub fn timer_stats(&self) {
        log::info!("Timer: {} ticks", self.now());
    }

    /// Earliest pending wake tick, if anything sleeps.
    pub fn next_wake(&self) -> Option<Tick> {
        self.with_state(|state| {
            if state.sleepers.is_empty() {
                None
            } else {
                Some(state.sleepers.next_wake())
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::host::HostArch;
    use crate::config::SchedulerConfig;
    use alloc::boxed::Box;

    fn booted() -> &'static Scheduler<HostArch> {
        let sched = Box::leak(Box::new(
            Scheduler::<HostArch>::new(SchedulerConfig::default()).unwrap(),
        ));
        HostArch::disable_interrupts();
        sched.init().unwrap();
        sched.start().unwrap();
        sched
    }

    fn tick(sched: &Scheduler<HostArch>) {
        let old = HostArch::intr_disable();
        sched.on_timer_interrupt();
        HostArch::intr_set_level(old);
    }

    #[test]
    fn test_ticks_before_init_only_count() {
        let sched = Box::leak(Box::new(
            Scheduler::<HostArch>::new(SchedulerConfig::default()).unwrap(),
        ));
        HostArch::disable_interrupts();
        sched.timer_interrupt();
        sched.timer_interrupt();
        assert_eq!(sched.now(), 2);
        assert!(!sched.in_interrupt_context());
    }

    #[test]
    #[should_panic(expected = "interrupts enabled")]
    fn test_timer_interrupt_requires_masked_interrupts() {
        let sched = booted();
        sched.timer_interrupt();
    }

    #[test]
    fn test_elapsed() {
        let sched = booted();
        let start = sched.now();
        for _ in 0..3 {
            tick(sched);
        }
        assert_eq!(sched.elapsed(start), 3);
    }

    #[test]
    fn test_kernel_ticks_attributed_to_main() {
        let sched = booted();
        for _ in 0..3 {
            tick(sched);
        }
        assert_eq!(
            sched.stats(),
            TickStats {
                idle: 0,
                kernel: 3,
                user: 0
            }
        );
    }

    #[test]
    fn test_sleep_zero_blocks_until_next_tick() {
        let sched = booted();
        let main = sched.current_id();
        sched.sleep(0);

        assert_eq!(sched.status_of(main), Some(ThreadStatus::Blocked));
        assert_eq!(sched.current_id(), sched.idle_id().unwrap());
        assert_eq!(sched.next_wake(), Some(0));

        tick(sched);
        assert_eq!(sched.current_id(), main);
        assert_eq!(sched.next_wake(), None);
    }

    #[test]
    fn test_sleep_ms_rounds_to_ticks() {
        let sched = booted();
        let main = sched.current_id();
        // 100 Hz: 25 ms is 2 whole ticks.
        sched.sleep_ms(25);
        assert_eq!(sched.sleeping(), [(main, 2)]);
    }

    #[test]
    fn test_sub_tick_sleep_busy_waits() {
        let sched = booted();
        let main = sched.current_id();
        sched.tick_counter().set_loops_per_tick(1000);
        sched.sleep_us(500);
        assert_eq!(sched.current_id(), main);
        assert!(sched.sleeping().is_empty());
    }

    #[test]
    #[should_panic(expected = "interrupts off")]
    fn test_sleep_requires_interrupts_on() {
        let sched = booted();
        HostArch::disable_interrupts();
        sched.sleep(5);
    }
}
