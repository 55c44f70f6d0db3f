//! AArch64 (ARM64) architecture implementation.
//!
//! Context switches are cooperative calls into `kthread_sched_switch`, so only
//! the registers the AAPCS64 marks callee-saved have to survive: x19-x28, the
//! frame pointer, the link register, sp and (with `full-fpu`) d8-d15. The
//! caller-saved set is already spilled by the compiler around the call.

use super::Arch;
use core::arch::{asm, global_asm};

pub struct Aarch64Arch;

/// Callee-saved register file of a suspended thread.
#[repr(C, align(16))]
#[derive(Debug, Default)]
pub struct Aarch64Context {
    /// x19..=x28, x29 (fp), x30 (lr)
    pub x: [u64; 12],
    pub sp: u64,
    #[cfg(feature = "full-fpu")]
    pub d: [u64; 8],
}

const LR: usize = 11;

#[cfg(feature = "full-fpu")]
global_asm!(
    ".text",
    ".balign 4",
    ".global kthread_sched_switch",
    "kthread_sched_switch:",
    "stp x19, x20, [x0, #0]",
    "stp x21, x22, [x0, #16]",
    "stp x23, x24, [x0, #32]",
    "stp x25, x26, [x0, #48]",
    "stp x27, x28, [x0, #64]",
    "stp x29, x30, [x0, #80]",
    "mov x9, sp",
    "str x9, [x0, #96]",
    "stp d8, d9, [x0, #104]",
    "stp d10, d11, [x0, #120]",
    "stp d12, d13, [x0, #136]",
    "stp d14, d15, [x0, #152]",
    "ldp x19, x20, [x1, #0]",
    "ldp x21, x22, [x1, #16]",
    "ldp x23, x24, [x1, #32]",
    "ldp x25, x26, [x1, #48]",
    "ldp x27, x28, [x1, #64]",
    "ldp x29, x30, [x1, #80]",
    "ldr x9, [x1, #96]",
    "mov sp, x9",
    "ldp d8, d9, [x1, #104]",
    "ldp d10, d11, [x1, #120]",
    "ldp d12, d13, [x1, #136]",
    "ldp d14, d15, [x1, #152]",
    "ret",
);

#[cfg(not(feature = "full-fpu"))]
global_asm!(
    ".text",
    ".balign 4",
    ".global kthread_sched_switch",
    "kthread_sched_switch:",
    "stp x19, x20, [x0, #0]",
    "stp x21, x22, [x0, #16]",
    "stp x23, x24, [x0, #32]",
    "stp x25, x26, [x0, #48]",
    "stp x27, x28, [x0, #64]",
    "stp x29, x30, [x0, #80]",
    "mov x9, sp",
    "str x9, [x0, #96]",
    "ldp x19, x20, [x1, #0]",
    "ldp x21, x22, [x1, #16]",
    "ldp x23, x24, [x1, #32]",
    "ldp x25, x26, [x1, #48]",
    "ldp x27, x28, [x1, #64]",
    "ldp x29, x30, [x1, #80]",
    "ldr x9, [x1, #96]",
    "mov sp, x9",
    "ret",
);

// First return of a fresh context lands here: x19 holds the argument and x20
// the entry point prepared by `init_context`. The entry never returns.
global_asm!(
    ".text",
    ".balign 4",
    ".global kthread_sched_thread_start",
    "kthread_sched_thread_start:",
    "mov x0, x19",
    "mov x29, xzr",
    "blr x20",
    "brk #0",
);

extern "C" {
    fn kthread_sched_switch(prev: *mut Aarch64Context, next: *const Aarch64Context);
    fn kthread_sched_thread_start() -> !;
}

impl Arch for Aarch64Arch {
    type SavedContext = Aarch64Context;

    unsafe fn context_switch(prev: *mut Self::SavedContext, next: *const Self::SavedContext) {
        // SAFETY: the caller guarantees both contexts are valid and that
        // interrupts are masked for the duration of the switch.
        unsafe { kthread_sched_switch(prev, next) }
    }

    fn init_context(ctx: &mut Self::SavedContext, entry: usize, stack_top: usize, arg: usize) {
        *ctx = Aarch64Context::default();
        ctx.x[0] = arg as u64;
        ctx.x[1] = entry as u64;
        ctx.x[LR] = kthread_sched_thread_start as usize as u64;
        ctx.sp = (stack_top & !0xF) as u64;
    }

    fn enable_interrupts() {
        // No `nomem`: the mask change must also order memory accesses.
        unsafe {
            asm!("msr daifclr, #2", options(nostack));
        }
    }

    fn disable_interrupts() {
        unsafe {
            asm!("msr daifset, #2", options(nostack));
        }
    }

    fn interrupts_enabled() -> bool {
        let daif: u64;
        unsafe {
            asm!(
                "mrs {daif}, daif",
                daif = out(reg) daif,
                options(nostack, nomem, preserves_flags)
            );
        }
        (daif & 0x80) == 0
    }

    fn wait_for_interrupt() {
        // WFI wakes on a pending IRQ even while it is masked, so halting
        // before unmasking keeps the pair atomic.
        unsafe {
            asm!("wfi", "msr daifclr, #2", options(nostack));
        }
    }
}
