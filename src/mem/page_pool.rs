//! Bounded pool of thread pages.
//!
//! Every thread except the bootstrap one runs on a page from this pool. The
//! pool is bounded by the configured thread capacity, so running out of pages
//! is an ordinary, recoverable failure of thread creation rather than an
//! allocator abort.

use alloc::alloc::{alloc_zeroed, dealloc, Layout};
use alloc::vec::Vec;
use core::ptr::NonNull;
use portable_atomic::{AtomicUsize, Ordering};
use spin::Mutex;

/// Pattern written at the lowest address of every page.
///
/// The stack grows down towards it, so a clobbered canary means the thread
/// overran its page.
pub const STACK_CANARY: u64 = 0xDEAD_BEEF_CAFE_BABE;

/// One page of thread stack memory.
pub struct Page {
    /// Lowest address of the allocation
    memory: NonNull<u8>,
    size: usize,
}

impl Page {
    fn layout(size: usize) -> Option<Layout> {
        Layout::from_size_align(size, size).ok()
    }

    /// Page size in bytes.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Lowest address of the page.
    pub fn base(&self) -> *mut u8 {
        self.memory.as_ptr()
    }

    /// Initial stack pointer: one past the highest address, 16-byte aligned.
    pub fn top(&self) -> usize {
        (self.memory.as_ptr() as usize + self.size) & !0xF
    }

    /// Write the canary at the lowest address of the page.
    pub fn install_canary(&self) {
        // SAFETY: the page is at least 4 KiB and aligned to its size.
        unsafe { (self.base() as *mut u64).write(STACK_CANARY) }
    }

    /// `true` if the canary is still intact.
    pub fn check_canary(&self) -> bool {
        // SAFETY: as for `install_canary`.
        unsafe { (self.base() as *const u64).read_volatile() == STACK_CANARY }
    }

    /// Overwrite the canary, simulating an overflow.
    #[cfg(test)]
    pub(crate) fn smash_canary(&self) {
        unsafe { (self.base() as *mut u64).write(0) }
    }

    fn clear(&mut self) {
        // SAFETY: `memory` is valid for `size` bytes and owned by this page.
        unsafe { core::ptr::write_bytes(self.base(), 0, self.size) }
    }
}

impl Drop for Page {
    fn drop(&mut self) {
        if let Some(layout) = Self::layout(self.size) {
            // SAFETY: allocated in `PagePool::allocate_new` with this layout.
            unsafe { dealloc(self.memory.as_ptr(), layout) }
        }
    }
}

// SAFETY: a page is plain memory exclusively owned by one `Page` value.
unsafe impl Send for Page {}

/// Allocation counters of a [`PagePool`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Pages obtained from the global allocator
    pub allocated: usize,
    /// Pages returned to the pool
    pub released: usize,
    /// Pages currently owned by threads
    pub in_use: usize,
}

/// Fixed-capacity page allocator with a free list.
pub struct PagePool {
    free: Mutex<Vec<Page>>,
    page_size: usize,
    capacity: usize,
    allocated: AtomicUsize,
    released: AtomicUsize,
    in_use: AtomicUsize,
}

impl PagePool {
    /// Create a pool handing out at most `capacity` pages of `page_size` bytes.
    ///
    /// `page_size` must be a power of two; the scheduler config validates it.
    pub fn new(page_size: usize, capacity: usize) -> Self {
        Self {
            free: Mutex::new(Vec::with_capacity(capacity)),
            page_size,
            capacity,
            allocated: AtomicUsize::new(0),
            released: AtomicUsize::new(0),
            in_use: AtomicUsize::new(0),
        }
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Take a zeroed page with its canary installed.
    ///
    /// Returns `None` once `capacity` pages are in use or the global
    /// allocator is exhausted. Never blocks.
    pub fn allocate(&self) -> Option<Page> {
        if self.in_use.load(Ordering::Acquire) >= self.capacity {
            return None;
        }

        let recycled = self.free.lock().pop();
        let mut page = match recycled {
            Some(mut page) => {
                page.clear();
                page
            }
            None => self.allocate_new()?,
        };

        self.in_use.fetch_add(1, Ordering::AcqRel);
        page.install_canary();
        Some(page)
    }

    /// Return a page to the free list.
    pub fn free(&self, page: Page) {
        debug_assert_eq!(page.size, self.page_size);
        self.free.lock().push(page);
        self.in_use.fetch_sub(1, Ordering::AcqRel);
        self.released.fetch_add(1, Ordering::AcqRel);
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            allocated: self.allocated.load(Ordering::Acquire),
            released: self.released.load(Ordering::Acquire),
            in_use: self.in_use.load(Ordering::Acquire),
        }
    }

    fn allocate_new(&self) -> Option<Page> {
        let layout = Page::layout(self.page_size)?;
        // SAFETY: layout has non-zero size.
        let memory = NonNull::new(unsafe { alloc_zeroed(layout) })?;
        self.allocated.fetch_add(1, Ordering::AcqRel);
        Some(Page {
            memory,
            size: self.page_size,
        })
    }
}
