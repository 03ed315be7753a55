//! Counting allocator implementation
//!
//! Wraps any [`RawAllocator`] and counts the calls made through each
//! primitive without changing what the inner allocator does.
//!
//! ## Invariants
//!
//! - Every successful call is counted under its primitive
//! - Failed calls only bump the failure counter
//! - `release(None)` never reaches the inner allocator and is not counted

use core::ptr::NonNull;

#[cfg(feature = "logging")]
use tracing::trace;

use super::{AtomicSlotStats, RawAllocator, SlotStats};
use crate::error::MemoryResult;

/// A wrapper allocator that counts slot calls
///
/// # Thread Safety
/// Counting uses atomics, so the wrapper is as thread-safe as `A`.
#[derive(Debug, Default)]
pub struct CountingAllocator<A> {
    inner: A,
    stats: AtomicSlotStats,
}

impl<A> CountingAllocator<A> {
    /// Creates a new `CountingAllocator` wrapping `allocator`
    pub const fn new(allocator: A) -> Self {
        Self {
            inner: allocator,
            stats: AtomicSlotStats::new(),
        }
    }

    /// Gets a reference to the underlying allocator
    pub fn inner(&self) -> &A {
        &self.inner
    }

    /// Consumes the counter and returns the underlying allocator
    pub fn into_inner(self) -> A {
        self.inner
    }

    /// Number of successful allocate calls
    pub fn allocation_count(&self) -> usize {
        self.stats.allocations()
    }

    /// Snapshot of every counter
    pub fn stats(&self) -> SlotStats {
        self.stats.snapshot()
    }

    /// Reset counters; outstanding blocks stay valid
    pub fn reset_stats(&self) {
        self.stats.reset();
    }

    /// Blocks created and not yet released
    ///
    /// Negative after [`CountingAllocator::reset_stats`] if blocks created
    /// before the reset are released afterwards.
    pub fn outstanding(&self) -> isize {
        let stats = self.stats.snapshot();
        stats.blocks_created() as isize - stats.releases as isize
    }

    /// Whether every counted block has been released
    pub fn is_balanced(&self) -> bool {
        self.outstanding() == 0
    }

    fn observe(&self, result: &MemoryResult<NonNull<u8>>, record: impl FnOnce(&AtomicSlotStats)) {
        match result {
            Ok(_ptr) => {
                record(&self.stats);
                #[cfg(feature = "logging")]
                trace!(ptr = ?_ptr, "slot call counted");
            }
            Err(_) => self.stats.record_failure(),
        }
    }
}

// SAFETY: every call is forwarded to A unchanged; counting has no effect on
// the memory handed out
unsafe impl<A: RawAllocator> RawAllocator for CountingAllocator<A> {
    fn allocate(&self, size: usize) -> MemoryResult<NonNull<u8>> {
        let result = self.inner.allocate(size);
        self.observe(&result, |stats| stats.record_allocation(size));
        result
    }

    fn zero_allocate(&self, count: usize, size: usize) -> MemoryResult<NonNull<u8>> {
        let result = self.inner.zero_allocate(count, size);
        self.observe(&result, |stats| {
            stats.record_zero_allocation(count.saturating_mul(size));
        });
        result
    }

    unsafe fn reallocate(
        &self,
        ptr: Option<NonNull<u8>>,
        size: usize,
    ) -> MemoryResult<NonNull<u8>> {
        // SAFETY: caller's contract forwarded to the inner allocator
        let result = unsafe { self.inner.reallocate(ptr, size) };
        self.observe(&result, |stats| stats.record_reallocation(size, ptr.is_none()));
        result
    }

    unsafe fn release(&self, ptr: Option<NonNull<u8>>) {
        if ptr.is_some() {
            self.stats.record_release();
        }
        // SAFETY: caller's contract forwarded to the inner allocator
        unsafe { self.inner.release(ptr) }
    }

    fn name(&self) -> &'static str {
        "CountingAllocator"
    }
}
