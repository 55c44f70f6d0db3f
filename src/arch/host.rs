//! Simulated architecture for hosted builds.
//!
//! There is no second stack to jump to on the host: `context_switch` records
//! the switch and returns immediately, and the caller carries on as whichever
//! thread the scheduler made current. Tests drive every thread from the one
//! OS thread, so the interrupt mask is tracked per OS thread and starts
//! masked, like a CPU coming out of reset.

use super::Arch;
use core::cell::Cell;

std::thread_local! {
    static INTERRUPTS: Cell<bool> = const { Cell::new(false) };
    static SWITCHES: Cell<u64> = const { Cell::new(0) };
}

pub struct HostArch;

/// What `init_context` would have loaded into the registers.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct HostContext {
    pub entry: usize,
    pub stack_top: usize,
    pub arg: usize,
}

impl HostArch {
    /// Number of context switches performed on this OS thread.
    pub fn switch_count() -> u64 {
        SWITCHES.with(Cell::get)
    }
}

impl Arch for HostArch {
    type SavedContext = HostContext;

    unsafe fn context_switch(prev: *mut Self::SavedContext, next: *const Self::SavedContext) {
        debug_assert!(!prev.is_null() && !next.is_null());
        debug_assert!(!Self::interrupts_enabled());
        SWITCHES.with(|s| s.set(s.get() + 1));
    }

    fn init_context(ctx: &mut Self::SavedContext, entry: usize, stack_top: usize, arg: usize) {
        *ctx = HostContext {
            entry,
            stack_top: stack_top & !0xF,
            arg,
        };
    }

    fn enable_interrupts() {
        INTERRUPTS.with(|i| i.set(true));
    }

    fn disable_interrupts() {
        INTERRUPTS.with(|i| i.set(false));
    }

    fn interrupts_enabled() -> bool {
        INTERRUPTS.with(Cell::get)
    }

    fn wait_for_interrupt() {
        Self::enable_interrupts();
        std::thread::yield_now();
    }
}
