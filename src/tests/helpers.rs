//! Test helper utilities and common functionality.

use crate::arch::host::HostArch;
use crate::arch::Arch;
use crate::config::SchedulerConfig;
use crate::sched::Scheduler;
use crate::thread::{priority, ThreadId, ThreadStatus};
use alloc::boxed::Box;

pub type TestScheduler = Scheduler<HostArch>;

/// Build, init and start a scheduler with the default config.
///
/// Returns with interrupts enabled and `main` running.
pub fn boot() -> &'static TestScheduler {
    boot_with(SchedulerConfig::default())
}

pub fn boot_with(config: SchedulerConfig) -> &'static TestScheduler {
    let sched = Box::leak(Box::new(
        Scheduler::new(config).expect("valid test config"),
    ));
    HostArch::disable_interrupts();
    sched.init().expect("init");
    sched.start().expect("start");
    sched
}

/// Deliver one timer interrupt to whichever thread is running.
pub fn tick(sched: &TestScheduler) {
    let old = HostArch::intr_disable();
    sched.on_timer_interrupt();
    HostArch::intr_set_level(old);
}

pub fn advance(sched: &TestScheduler, ticks: u64) {
    for _ in 0..ticks {
        tick(sched);
    }
}

pub fn spawn_noop(sched: &'static TestScheduler, name: &str) -> ThreadId {
    sched
        .create(name, priority::PRI_DEFAULT, |_| {})
        .expect("thread page")
}

/// Block the running thread the way a wait primitive would.
pub fn block_current(sched: &TestScheduler) {
    let old = HostArch::intr_disable();
    sched.block();
    HostArch::intr_set_level(old);
}

pub fn running_count(sched: &TestScheduler) -> usize {
    sched.thread_counts().running
}

pub fn assert_running(sched: &TestScheduler, id: ThreadId) {
    assert_eq!(sched.current_id(), id);
    assert_eq!(sched.status_of(id), Some(ThreadStatus::Running));
    assert_eq!(running_count(sched), 1);
}

/// Simple linear congruential generator for randomized tests.
pub struct SimpleRng {
    state: u64,
}

impl SimpleRng {
    pub fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    pub fn next_u64(&mut self) -> u64 {
        self.state = self
            .state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        self.state
    }

    pub fn gen_range(&mut self, min: u64, max: u64) -> u64 {
        min + ((self.next_u64() >> 33) % (max - min))
    }
}
