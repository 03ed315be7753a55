//! Allocation capability trait
//!
//! [`RawAllocator`] is the injectable form of the slot table: the same four
//! primitives with the typed call surface, as a trait so that stateful
//! wrappers (counting, fault injection) can stand wherever a table does.
//!
//! # Safety
//!
//! `RawAllocator` is an `unsafe trait`. Implementors promise that:
//! - every `Ok` pointer is valid for reads and writes of the requested size
//! - `zero_allocate` memory reads as zero
//! - `reallocate` preserves contents up to the smaller size and leaves the
//!   original block untouched on failure
//! - blocks from any of the allocating methods are accepted by `reallocate`
//!   and `release` of the same allocator
//!
//! Blanket impls for `&A` and `Arc<A>` forward every call to `A`, so the
//! contract carries over unchanged.

use core::ptr::NonNull;
use std::sync::Arc;

use crate::error::MemoryResult;

use super::AllocatorTable;

/// The four allocation primitives as an injectable capability
///
/// # Safety
/// See the module documentation for the contract implementors uphold.
pub unsafe trait RawAllocator {
    /// Allocates at least `size` bytes of uninitialised memory
    fn allocate(&self, size: usize) -> MemoryResult<NonNull<u8>>;

    /// Allocates `count * size` zeroed bytes
    fn zero_allocate(&self, count: usize, size: usize) -> MemoryResult<NonNull<u8>>;

    /// Resizes a block, or allocates one when `ptr` is `None`
    ///
    /// # Safety
    /// `ptr` must be `None` or a live block from this allocator. On success
    /// it is invalidated; on failure it is still owned by the caller.
    unsafe fn reallocate(&self, ptr: Option<NonNull<u8>>, size: usize)
    -> MemoryResult<NonNull<u8>>;

    /// Releases a block; `None` is a no-op
    ///
    /// # Safety
    /// `ptr` must be `None` or a live block from this allocator and must not
    /// be used afterwards.
    unsafe fn release(&self, ptr: Option<NonNull<u8>>);

    /// Allocator name for diagnostics
    fn name(&self) -> &'static str {
        core::any::type_name::<Self>()
    }
}

// SAFETY: forwards to the inherent typed surface, whose guarantees rest on
// the unsafe slot setters
unsafe impl RawAllocator for AllocatorTable {
    #[inline]
    fn allocate(&self, size: usize) -> MemoryResult<NonNull<u8>> {
        Self::allocate(self, size)
    }

    #[inline]
    fn zero_allocate(&self, count: usize, size: usize) -> MemoryResult<NonNull<u8>> {
        Self::zero_allocate(self, count, size)
    }

    #[inline]
    unsafe fn reallocate(
        &self,
        ptr: Option<NonNull<u8>>,
        size: usize,
    ) -> MemoryResult<NonNull<u8>> {
        // SAFETY: caller's contract is the table's contract
        unsafe { Self::reallocate(self, ptr, size) }
    }

    #[inline]
    unsafe fn release(&self, ptr: Option<NonNull<u8>>) {
        // SAFETY: caller's contract is the table's contract
        unsafe { Self::release(self, ptr) }
    }

    fn name(&self) -> &'static str {
        if self.is_default() {
            "AllocatorTable(default)"
        } else {
            "AllocatorTable(custom)"
        }
    }
}

// SAFETY: pure delegation to A
unsafe impl<A: RawAllocator + ?Sized> RawAllocator for &A {
    #[inline]
    fn allocate(&self, size: usize) -> MemoryResult<NonNull<u8>> {
        (**self).allocate(size)
    }

    #[inline]
    fn zero_allocate(&self, count: usize, size: usize) -> MemoryResult<NonNull<u8>> {
        (**self).zero_allocate(count, size)
    }

    #[inline]
    unsafe fn reallocate(
        &self,
        ptr: Option<NonNull<u8>>,
        size: usize,
    ) -> MemoryResult<NonNull<u8>> {
        // SAFETY: forwarded unchanged
        unsafe { (**self).reallocate(ptr, size) }
    }

    #[inline]
    unsafe fn release(&self, ptr: Option<NonNull<u8>>) {
        // SAFETY: forwarded unchanged
        unsafe { (**self).release(ptr) }
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}

// SAFETY: pure delegation to A
unsafe impl<A: RawAllocator + ?Sized> RawAllocator for Arc<A> {
    #[inline]
    fn allocate(&self, size: usize) -> MemoryResult<NonNull<u8>> {
        (**self).allocate(size)
    }

    #[inline]
    fn zero_allocate(&self, count: usize, size: usize) -> MemoryResult<NonNull<u8>> {
        (**self).zero_allocate(count, size)
    }

    #[inline]
    unsafe fn reallocate(
        &self,
        ptr: Option<NonNull<u8>>,
        size: usize,
    ) -> MemoryResult<NonNull<u8>> {
        // SAFETY: forwarded unchanged
        unsafe { (**self).reallocate(ptr, size) }
    }

    #[inline]
    unsafe fn release(&self, ptr: Option<NonNull<u8>>) {
        // SAFETY: forwarded unchanged
        unsafe { (**self).release(ptr) }
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}
