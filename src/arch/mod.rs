//! Architecture abstraction layer for context switching and interrupt control.
//!
//! The scheduler core depends only on the contract of [`Arch`]: saving a
//! context returns later at the same logical point, and restoring one resumes
//! wherever it was saved. On a single core, masking interrupts is the only
//! mutual exclusion the scheduler needs against the tick handler.

/// Architecture abstraction trait.
///
/// This trait must be implemented for each supported CPU architecture to provide
/// context switching and interrupt masking.
///
/// # Safety
///
/// Implementations involve direct hardware manipulation and inline assembly.
/// All methods marked as unsafe have specific preconditions that must be
/// upheld by the caller.
pub trait Arch: 'static {
    /// Architecture-specific saved context type.
    ///
    /// Holds everything needed to resume a thread that gave up the CPU inside
    /// [`Arch::context_switch`].
    type SavedContext: Send + Default;

    /// Switch from one thread context to another.
    ///
    /// Returns once some later switch resumes `prev`.
    ///
    /// # Safety
    ///
    /// - `prev` must point to a valid, properly aligned SavedContext
    /// - `next` must point to a valid, properly aligned SavedContext that was
    ///   either filled by a previous switch or prepared by [`Arch::init_context`]
    /// - Both contexts must stay at the same address until `prev` is resumed
    /// - Must be called with interrupts disabled
    unsafe fn context_switch(prev: *mut Self::SavedContext, next: *const Self::SavedContext);

    /// Prepare a fresh context so that the first switch into it calls
    /// `entry(arg)` on a stack growing down from `stack_top`.
    ///
    /// `entry` is the address of an `extern "C" fn(usize) -> !`.
    fn init_context(ctx: &mut Self::SavedContext, entry: usize, stack_top: usize, arg: usize);

    /// Enable interrupt delivery on the current CPU.
    fn enable_interrupts();

    /// Disable interrupt delivery on the current CPU.
    fn disable_interrupts();

    /// Check if interrupts are currently enabled.
    fn interrupts_enabled() -> bool;

    /// Enable interrupts and halt until the next one arrives.
    ///
    /// Enabling and halting must be atomic with respect to interrupt
    /// delivery, otherwise a tick landing between the two is lost and the
    /// CPU sleeps for a whole extra period.
    fn wait_for_interrupt();

    /// Current interrupt level.
    #[inline]
    fn intr_level() -> IntrLevel {
        if Self::interrupts_enabled() {
            IntrLevel::On
        } else {
            IntrLevel::Off
        }
    }

    /// Disable interrupts and return the previous level.
    #[inline]
    fn intr_disable() -> IntrLevel {
        let old = Self::intr_level();
        Self::disable_interrupts();
        old
    }

    /// Enable interrupts and return the previous level.
    #[inline]
    fn intr_enable() -> IntrLevel {
        let old = Self::intr_level();
        Self::enable_interrupts();
        old
    }

    /// Restore a level returned by [`Arch::intr_disable`] or [`Arch::intr_enable`].
    #[inline]
    fn intr_set_level(level: IntrLevel) -> IntrLevel {
        match level {
            IntrLevel::On => Self::intr_enable(),
            IntrLevel::Off => Self::intr_disable(),
        }
    }
}

/// Interrupt mask state of the current CPU.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntrLevel {
    /// Interrupts are delivered
    On,
    /// Interrupts are masked
    Off,
}

#[cfg(target_arch = "aarch64")]
pub mod aarch64;

#[cfg(any(test, feature = "std-shim"))]
pub mod host;

#[cfg(target_arch = "aarch64")]
pub use aarch64::Aarch64Arch as DefaultArch;

#[cfg(all(not(target_arch = "aarch64"), any(test, feature = "std-shim")))]
pub use host::HostArch as DefaultArch;
