//! Fault-injecting allocator
//!
//! Wraps another [`RawAllocator`] and refuses allocating calls according to a
//! [`FaultConfig`], so that out-of-memory paths can be exercised on demand.
//!
//! # Safety
//!
//! A refused call never reaches the inner allocator, and a refused
//! `reallocate` leaves the caller's block untouched, which is exactly what
//! the [`RawAllocator`] contract requires on failure. Everything else is
//! forwarded unchanged.

use core::ptr::NonNull;
use core::sync::atomic::{AtomicUsize, Ordering};

use super::RawAllocator;
use crate::config::FaultConfig;
use crate::error::{MemoryError, MemoryResult};

/// Allocator wrapper that refuses calls on a schedule
#[derive(Debug)]
pub struct FaultInjectingAllocator<A> {
    inner: A,
    config: FaultConfig,
    /// Allocating calls seen so far (refused ones included)
    calls: AtomicUsize,
    /// Calls refused so far
    injected: AtomicUsize,
}

impl<A> FaultInjectingAllocator<A> {
    /// Create a fault injector with a validated configuration
    pub fn new(allocator: A, config: FaultConfig) -> MemoryResult<Self> {
        config.validate()?;
        Ok(Self {
            inner: allocator,
            config,
            calls: AtomicUsize::new(0),
            injected: AtomicUsize::new(0),
        })
    }

    /// Get the underlying allocator
    pub fn inner(&self) -> &A {
        &self.inner
    }

    /// Active configuration
    pub fn config(&self) -> &FaultConfig {
        &self.config
    }

    /// Allocating calls seen so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }

    /// Faults injected so far
    pub fn injected(&self) -> usize {
        self.injected.load(Ordering::Relaxed)
    }

    /// Restart call numbering without touching outstanding blocks
    pub fn rearm(&self) {
        self.calls.store(0, Ordering::Relaxed);
        self.injected.store(0, Ordering::Relaxed);
    }

    /// Number the call and decide whether it goes through
    fn admit(&self, size: usize) -> MemoryResult<()> {
        let call = self.calls.fetch_add(1, Ordering::Relaxed) + 1;

        let verdict = if let Some(max) = self.config.max_allocation_size
            && size > max
        {
            Err(MemoryError::allocation_too_large(size, max))
        } else if let Some(after) = self.config.fail_after
            && call > after
        {
            Err(MemoryError::fault_injected(call))
        } else if let Some(every) = self.config.fail_every
            && call % every.get() == 0
        {
            Err(MemoryError::fault_injected(call))
        } else {
            Ok(())
        };

        if verdict.is_err() {
            self.injected.fetch_add(1, Ordering::Relaxed);
        }
        verdict
    }
}

// SAFETY: refused calls return Err without touching memory; admitted calls
// are forwarded unchanged
unsafe impl<A: RawAllocator> RawAllocator for FaultInjectingAllocator<A> {
    fn allocate(&self, size: usize) -> MemoryResult<NonNull<u8>> {
        self.admit(size)?;
        self.inner.allocate(size)
    }

    fn zero_allocate(&self, count: usize, size: usize) -> MemoryResult<NonNull<u8>> {
        // an overflowing request is not an allocating call and takes no number
        let total = count
            .checked_mul(size)
            .ok_or_else(|| MemoryError::size_overflow("zero_allocate: count * size"))?;
        self.admit(total)?;
        self.inner.zero_allocate(count, size)
    }

    unsafe fn reallocate(
        &self,
        ptr: Option<NonNull<u8>>,
        size: usize,
    ) -> MemoryResult<NonNull<u8>> {
        self.admit(size)?;
        // SAFETY: caller's contract forwarded to the inner allocator
        unsafe { self.inner.reallocate(ptr, size) }
    }

    unsafe fn release(&self, ptr: Option<NonNull<u8>>) {
        // SAFETY: caller's contract forwarded to the inner allocator
        unsafe { self.inner.release(ptr) }
    }

    fn name(&self) -> &'static str {
        "FaultInjectingAllocator"
    }
}
