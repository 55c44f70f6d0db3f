#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]

//! Tick-driven preemptive thread scheduler for single-core bare-metal kernels.
//!
//! The crate decides which kernel thread owns the CPU, moves threads between
//! running, ready, blocked and dying, and lets a periodic timer interrupt
//! preempt threads and wake sleepers without busy-waiting.
//!
//! # Features
//!
//! - `full-fpu`: Save the callee-saved SIMD registers on AArch64 switches (default)
//! - `std-shim`: Build the simulated host architecture outside of tests
//!
//! # Quick Start
//!
//! ```ignore
//! use kthread_sched::{DefaultArch, Scheduler, SchedulerConfig};
//! use spin::Once;
//!
//! static SCHED: Once<Scheduler<DefaultArch>> = Once::new();
//!
//! fn kernel_main() {
//!     let sched = SCHED.call_once(|| {
//!         Scheduler::new(SchedulerConfig::default()).expect("valid config")
//!     });
//!     sched.init().expect("scheduler init");
//!     sched.start().expect("scheduler start");
//!     sched.calibrate_delay();
//!
//!     sched.create("worker", 31, |s| loop {
//!         s.sleep_ms(100);
//!     }).expect("thread page");
//! }
//!
//! // Wired to the platform timer IRQ.
//! fn on_timer_irq() {
//!     SCHED.get().unwrap().on_timer_interrupt();
//! }
//! ```
//!
//! # Architecture
//!
//! - [`Scheduler`] owns every thread control block, the ready queue, the sleep
//!   registry and the list of dying threads waiting for reclamation.
//! - [`Arch`] is the only platform dependency: context switching and interrupt
//!   masking. On a single core, masking interrupts is the lock.
//! - Thread stacks come from a bounded [`PagePool`]; running out is the only
//!   recoverable error of thread creation.

pub mod arch;
pub mod config;
pub mod errors;
pub mod mem;
pub mod process;
pub mod sched;
pub mod thread;
pub mod time;

#[cfg(test)]
mod tests;

#[cfg(any(test, feature = "std-shim"))]
extern crate std;

extern crate alloc;

// Panic handler for bare-metal
#[cfg(all(target_os = "none", not(test), not(feature = "std-shim")))]
#[panic_handler]
fn panic(_info: &core::panic::PanicInfo) -> ! {
    // On panic, disable interrupts and halt
    #[cfg(target_arch = "aarch64")]
    unsafe {
        core::arch::asm!("msr daifset, #0xf", options(nomem, nostack));
    }
    loop {
        #[cfg(target_arch = "aarch64")]
        unsafe {
            core::arch::asm!("wfe", options(nomem, nostack));
        }
        #[cfg(not(target_arch = "aarch64"))]
        core::hint::spin_loop();
    }
}

// ============================================================================
// Public API
// ============================================================================

// Architecture abstraction
pub use arch::{Arch, IntrLevel};
#[cfg(any(target_arch = "aarch64", test, feature = "std-shim"))]
pub use arch::DefaultArch;

// Scheduler
pub use config::SchedulerConfig;
pub use process::ProcessHooks;
pub use sched::{Scheduler, ThreadCounts, TickStats};

// Threads
pub use thread::priority::{PRI_DEFAULT, PRI_MAX, PRI_MIN};
pub use thread::{ThreadHandle, ThreadId, ThreadStatus};

// Memory management
pub use mem::{PagePool, PoolStats};

// Time
pub use time::{Duration, Tick};

// Errors
pub use errors::{MemoryError, ScheduleError, SpawnError, ThreadError, ThreadResult, TimerError};
