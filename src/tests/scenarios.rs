//! End-to-end scheduling scenarios.
//!
//! The host architecture does not really switch stacks. After any call that
//! gives up the CPU, the test carries on as whichever thread the scheduler
//! made current.

#[cfg(test)]
mod scenario_tests {
    use crate::arch::host::HostArch;
    use crate::arch::Arch;
    use crate::config::SchedulerConfig;
    use crate::errors::SpawnError;
    use crate::process::ProcessHooks;
    use crate::tests::helpers::*;
    use crate::thread::{priority, ThreadId, ThreadStatus};
    use crate::time::Duration;
    use alloc::boxed::Box;
    use alloc::vec::Vec;
    use portable_atomic::{AtomicBool, AtomicUsize, Ordering};

    #[test]
    fn round_robin_one_slice_each() {
        let sched = boot();
        let main = sched.current_id();
        let t1 = spawn_noop(sched, "t1");
        let t2 = spawn_noop(sched, "t2");
        let t3 = spawn_noop(sched, "t3");
        assert_eq!(sched.ready_ids(), [t1, t2, t3]);

        // The slice is four ticks; the fourth hands the CPU on.
        advance(sched, 3);
        assert_running(sched, main);
        tick(sched);
        assert_running(sched, t1);
        assert_eq!(sched.ready_ids(), [t2, t3, main]);

        for (expected, queue) in [
            (t2, [t3, main, t1]),
            (t3, [main, t1, t2]),
            (main, [t1, t2, t3]),
        ] {
            advance(sched, 4);
            assert_running(sched, expected);
            assert_eq!(sched.ready_ids(), queue);
        }
    }

    #[test]
    fn sleeping_thread_stays_blocked_until_deadline() {
        let sched = boot();
        let main = sched.current_id();
        let wake = sched.now() + 10;
        sched.sleep_until(wake);

        for _ in 0..9 {
            tick(sched);
            assert_eq!(sched.status_of(main), Some(ThreadStatus::Blocked));
        }
        tick(sched);
        assert_eq!(sched.now(), wake);
        assert_running(sched, main);
    }

    #[test]
    fn two_threads_run_to_completion() {
        let sched = boot();
        let main = sched.current_id();
        let idle = sched.idle_id().unwrap();
        let a = spawn_noop(sched, "a");
        let b = spawn_noop(sched, "b");

        block_current(sched);
        assert_running(sched, a);
        sched.schedule_exit();
        assert_running(sched, b);
        sched.schedule_exit();

        // Only the idle thread is left to run.
        assert_running(sched, idle);
        assert!(sched.ready_ids().is_empty());
        assert_eq!(sched.status_of(a), None);
        assert_eq!(sched.status_of(b), Some(ThreadStatus::Dying));
        assert_eq!(sched.status_of(main), Some(ThreadStatus::Blocked));

        // Next pass of the idle loop reaps `b`.
        block_current(sched);
        assert_running(sched, idle);
        assert_eq!(sched.status_of(b), None);
        assert_eq!(sched.page_stats().in_use, 1);
    }

    #[test]
    #[should_panic(expected = "which is not blocked")]
    fn double_unblock_is_fatal() {
        let sched = boot();
        let t = spawn_noop(sched, "t");
        sched.yield_now();
        assert_running(sched, t);
        block_current(sched);

        sched.unblock(t);
        sched.unblock(t);
    }

    #[test]
    fn past_wake_tick_wakes_on_next_tick() {
        let sched = boot();
        let main = sched.current_id();
        advance(sched, 5);

        sched.sleep_until(2);
        assert_eq!(sched.status_of(main), Some(ThreadStatus::Blocked));
        tick(sched);
        assert_running(sched, main);
    }

    #[test]
    fn sleepers_wake_in_deadline_order() {
        let sched = boot();
        let main = sched.current_id();
        let a = spawn_noop(sched, "a");
        let b = spawn_noop(sched, "b");
        let c = spawn_noop(sched, "c");

        let deadlines = [(main, 30), (a, 20), (b, 5), (c, 12)];
        for &(id, wake) in &deadlines {
            assert_eq!(sched.current_id(), id);
            sched.sleep_until(wake);
        }
        assert_eq!(sched.current_id(), sched.idle_id().unwrap());
        assert_eq!(sched.next_wake(), Some(5));

        let mut woken = Vec::new();
        while woken.len() < deadlines.len() {
            tick(sched);
            let now = sched.now();
            for &(id, wake) in &deadlines {
                let blocked = sched.status_of(id) == Some(ThreadStatus::Blocked);
                if !blocked && !woken.contains(&id) {
                    assert!(now >= wake, "thread {} woke at {} before {}", id, now, wake);
                    woken.push(id);
                }
            }
        }
        assert_eq!(woken, [b, c, a, main]);
    }

    #[test]
    fn exited_thread_reclaimed_by_second_decision() {
        let sched = boot();
        let main = sched.current_id();
        let t = spawn_noop(sched, "t");
        sched.yield_now();
        assert_running(sched, t);

        sched.schedule_exit();
        assert_running(sched, main);
        assert_eq!(sched.status_of(t), Some(ThreadStatus::Dying));
        assert_eq!(sched.pending_reclaim(), 1);
        assert_eq!(sched.page_stats().in_use, 2);

        sched.yield_now();
        assert_eq!(sched.pending_reclaim(), 0);
        assert_eq!(sched.status_of(t), None);
        let pages = sched.page_stats();
        assert_eq!(pages.in_use, 1);
        assert_eq!(pages.released, 1);
    }

    #[test]
    fn bootstrap_thread_is_never_reclaimed() {
        let sched = boot();
        let main = sched.current_id();
        let t = spawn_noop(sched, "t");

        sched.schedule_exit();
        assert_running(sched, t);
        assert_eq!(sched.pending_reclaim(), 0);

        sched.yield_now();
        assert_eq!(sched.status_of(main), Some(ThreadStatus::Dying));
    }

    #[test]
    fn unblock_does_not_preempt_and_keeps_order() {
        let sched = boot();
        let main = sched.current_id();
        let a = spawn_noop(sched, "a");
        let b = spawn_noop(sched, "b");

        block_current(sched);
        assert_running(sched, a);
        block_current(sched);
        assert_running(sched, b);
        sched.yield_now();
        // `b` was alone on the queue, so it keeps the CPU.
        assert_running(sched, b);
        block_current(sched);
        assert_running(sched, sched.idle_id().unwrap());

        sched.unblock(main);
        sched.unblock(b);
        sched.unblock(a);
        assert_eq!(sched.ready_ids(), [main, b, a]);
        assert_running(sched, sched.idle_id().unwrap());

        block_current(sched);
        assert_running(sched, main);
    }

    #[test]
    fn idle_ticks_are_counted() {
        let sched = boot();
        block_current(sched);
        advance(sched, 3);
        let stats = sched.stats();
        assert_eq!(stats.idle, 3);
        assert_eq!(stats.kernel, 0);
        assert_eq!(stats.total(), 3);
    }

    #[test]
    fn create_fails_when_pages_run_out() {
        let sched = boot_with(SchedulerConfig::default().with_max_threads(2));
        let t = spawn_noop(sched, "only");
        assert_eq!(
            sched.create("extra", priority::PRI_DEFAULT, |_| {}),
            Err(SpawnError::OutOfMemory)
        );

        sched.yield_now();
        assert_running(sched, t);
        sched.schedule_exit();
        sched.yield_now();
        assert!(sched.create("again", priority::PRI_DEFAULT, |_| {}).is_ok());
    }

    #[test]
    fn sleep_for_converts_duration_to_ticks() {
        let sched = boot();
        let main = sched.current_id();
        sched.sleep_for(Duration::from_millis(30));
        assert_eq!(sched.sleeping(), [(main, 3)]);

        advance(sched, 2);
        assert_eq!(sched.status_of(main), Some(ThreadStatus::Blocked));
        tick(sched);
        assert_running(sched, main);
    }

    #[test]
    fn sleep_restores_caller_interrupt_level() {
        let sched = boot();
        assert!(HostArch::interrupts_enabled());
        sched.sleep(1);
        assert!(HostArch::interrupts_enabled());

        HostArch::disable_interrupts();
        tick(sched);
        let old = HostArch::intr_disable();
        sched.sleep_until(sched.now() + 1);
        assert!(!HostArch::interrupts_enabled());
        HostArch::intr_set_level(old);
    }

    #[test]
    #[should_panic(expected = "interrupts enabled")]
    fn block_with_interrupts_enabled_is_fatal() {
        let sched = boot();
        sched.block();
    }

    #[test]
    #[should_panic(expected = "idle thread cannot sleep")]
    fn idle_thread_cannot_sleep() {
        let sched = boot();
        block_current(sched);
        sched.sleep_until(5);
    }

    #[test]
    #[should_panic(expected = "sleeping on a timer")]
    fn unblocking_a_sleeper_is_fatal() {
        let sched = boot();
        let t = spawn_noop(sched, "t");
        sched.yield_now();
        assert_running(sched, t);
        sched.sleep(100);
        sched.unblock(t);
    }

    #[test]
    #[should_panic(expected = "is corrupted")]
    fn corrupted_thread_is_never_dispatched() {
        let sched = boot();
        let t = spawn_noop(sched, "t");
        sched.with_state_for_test(|state| state.thread_for_test(t).corrupt_magic());
        sched.yield_now();
    }

    #[test]
    #[should_panic(expected = "is corrupted")]
    fn stack_overflow_detected_on_dispatch() {
        let sched = boot();
        let t = spawn_noop(sched, "t");
        sched.with_state_for_test(|state| {
            let page = state.thread_for_test(t).page.as_ref().unwrap();
            page.smash_canary();
        });
        sched.yield_now();
    }

    #[test]
    #[should_panic(expected = "is corrupted")]
    fn current_thread_checks_integrity() {
        let sched = boot();
        let main = sched.current_id();
        sched.with_state_for_test(|state| state.thread_for_test(main).corrupt_magic());
        sched.current_thread();
    }

    struct Recorder {
        activations: AtomicUsize,
        last_activated: AtomicUsize,
        exited: AtomicUsize,
        user_thread: AtomicUsize,
    }

    impl ProcessHooks for Recorder {
        fn activate(&self, next: ThreadId) {
            self.activations.fetch_add(1, Ordering::AcqRel);
            self.last_activated.store(next.get(), Ordering::Release);
        }

        fn exit(&self, thread: ThreadId) {
            self.exited.store(thread.get(), Ordering::Release);
        }

        fn is_user(&self, thread: ThreadId) -> bool {
            self.user_thread.load(Ordering::Acquire) == thread.get()
        }
    }

    #[test]
    fn process_hooks_see_dispatch_exit_and_user_ticks() {
        let sched = boot();
        let recorder: &'static Recorder = Box::leak(Box::new(Recorder {
            activations: AtomicUsize::new(0),
            last_activated: AtomicUsize::new(0),
            exited: AtomicUsize::new(0),
            user_thread: AtomicUsize::new(0),
        }));
        sched.set_process_hooks(recorder);

        let t = spawn_noop(sched, "user");
        recorder.user_thread.store(t.get(), Ordering::Release);

        sched.yield_now();
        assert_running(sched, t);
        assert_eq!(recorder.activations.load(Ordering::Acquire), 1);
        assert_eq!(recorder.last_activated.load(Ordering::Acquire), t.get());

        advance(sched, 2);
        assert_eq!(sched.stats().user, 2);

        sched.schedule_exit();
        assert_eq!(recorder.exited.load(Ordering::Acquire), t.get());
    }

    /// Counts a thread as user code by looking up its name.
    struct UserByName(&'static TestScheduler);

    impl ProcessHooks for UserByName {
        fn is_user(&self, thread: ThreadId) -> bool {
            self.0.handle_of(thread).map_or(false, |h| h.name() == "user")
        }
    }

    #[test]
    fn hooks_may_query_the_scheduler_during_a_tick() {
        let sched = boot();
        sched.set_process_hooks(Box::leak(Box::new(UserByName(sched))));
        let t = spawn_noop(sched, "user");

        tick(sched);
        sched.yield_now();
        assert_running(sched, t);
        advance(sched, 2);

        let stats = sched.stats();
        assert_eq!(stats.kernel, 1);
        assert_eq!(stats.user, 2);
    }

    /// Runs a thread-context operation from inside the tick handler.
    struct CallsFromTick {
        sched: &'static TestScheduler,
        op: fn(&TestScheduler),
    }

    impl ProcessHooks for CallsFromTick {
        fn is_user(&self, _thread: ThreadId) -> bool {
            (self.op)(self.sched);
            false
        }
    }

    fn tick_calling(op: fn(&TestScheduler)) {
        let sched = boot();
        sched.set_process_hooks(Box::leak(Box::new(CallsFromTick { sched, op })));
        tick(sched);
    }

    #[test]
    #[should_panic(expected = "block called from interrupt context")]
    fn block_from_interrupt_is_fatal() {
        tick_calling(|s| {
            HostArch::disable_interrupts();
            s.block();
        });
    }

    #[test]
    #[should_panic(expected = "yield called from interrupt context")]
    fn yield_from_interrupt_is_fatal() {
        tick_calling(|s| s.yield_now());
    }

    #[test]
    #[should_panic(expected = "exit called from interrupt context")]
    fn exit_from_interrupt_is_fatal() {
        tick_calling(|s| s.schedule_exit());
    }

    #[test]
    #[should_panic(expected = "sleep called from interrupt context")]
    fn sleep_from_interrupt_is_fatal() {
        tick_calling(|s| s.sleep_until(s.now() + 1));
    }

    #[test]
    fn new_thread_runs_entry_with_interrupts_on_then_dies() {
        let sched = boot();
        let main = sched.current_id();
        let ran: &'static AtomicBool = Box::leak(Box::new(AtomicBool::new(false)));
        let intr_on: &'static AtomicBool = Box::leak(Box::new(AtomicBool::new(false)));
        let t = sched
            .create("body", priority::PRI_DEFAULT, move |_| {
                ran.store(true, Ordering::Release);
                intr_on.store(HostArch::interrupts_enabled(), Ordering::Release);
            })
            .expect("thread page");

        sched.yield_now();
        assert_running(sched, t);

        // A fresh thread starts with interrupts masked by the switch.
        HostArch::disable_interrupts();
        sched.run_current_entry();

        assert!(ran.load(Ordering::Acquire));
        assert!(intr_on.load(Ordering::Acquire));
        assert_eq!(sched.status_of(t), Some(ThreadStatus::Dying));
        assert_eq!(sched.pending_reclaim(), 1);
        assert_running(sched, main);
        HostArch::enable_interrupts();
    }

    #[test]
    fn calibrated_busy_wait_for_sub_tick_sleep() {
        let sched = boot();
        let stop: &'static AtomicBool = Box::leak(Box::new(AtomicBool::new(false)));
        let ticker = std::thread::spawn(move || {
            while !stop.load(Ordering::Acquire) {
                std::thread::sleep(std::time::Duration::from_millis(1));
                sched.tick_counter().increment();
            }
        });

        let loops = sched.calibrate_delay();
        stop.store(true, Ordering::Release);
        ticker.join().unwrap();

        assert!(loops >= 1 << 10);
        assert_eq!(sched.tick_counter().loops_per_tick(), loops);

        let main = sched.current_id();
        sched.sleep_us(100);
        assert_running(sched, main);
    }
}
