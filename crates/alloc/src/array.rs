//! Growable byte array over an injected allocator
//!
//! [`SlotArray`] takes its [`RawAllocator`] as a value instead of reading the
//! process-wide table, so tests and embedders decide where its storage comes
//! from.
//!
//! ## Invariants
//!
//! - `len <= cap`
//! - `ptr` is `None` exactly when `cap == 0`
//! - the first `len` bytes behind `ptr` are initialised
//! - a failed growth leaves the array unchanged
//!
//! ## Memory Management
//!
//! - Storage grows through `reallocate`, starting from `None`
//! - Capacity grows by `growth_factor`, never below `initial_capacity`
//! - Storage is released on drop through the same allocator

use core::fmt;
use core::ptr::{self, NonNull};

#[cfg(feature = "logging")]
use tracing::trace;

use crate::allocator::RawAllocator;
use crate::config::ArrayConfig;
use crate::error::{MemoryError, MemoryResult};

/// Growable byte buffer whose storage comes from `A`
pub struct SlotArray<A: RawAllocator> {
    ptr: Option<NonNull<u8>>,
    len: usize,
    cap: usize,
    allocator: A,
    config: ArrayConfig,
}

impl<A: RawAllocator> SlotArray<A> {
    /// Empty array with the default growth policy; allocates nothing
    pub fn new_in(allocator: A) -> Self {
        Self {
            ptr: None,
            len: 0,
            cap: 0,
            allocator,
            config: ArrayConfig::default(),
        }
    }

    /// Empty array with a validated growth policy
    pub fn with_config_in(allocator: A, config: ArrayConfig) -> MemoryResult<Self> {
        config.validate()?;
        Ok(Self {
            ptr: None,
            len: 0,
            cap: 0,
            allocator,
            config,
        })
    }

    /// Number of initialised bytes
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the array holds no bytes
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Bytes that fit without growing
    #[inline]
    pub fn capacity(&self) -> usize {
        self.cap
    }

    /// The allocator backing this array
    pub fn allocator(&self) -> &A {
        &self.allocator
    }

    /// Growth policy in use
    pub fn config(&self) -> &ArrayConfig {
        &self.config
    }

    /// Make room for at least `additional` more bytes
    pub fn reserve(&mut self, additional: usize) -> MemoryResult<()> {
        let needed = self
            .len
            .checked_add(additional)
            .ok_or_else(|| MemoryError::size_overflow("SlotArray::reserve"))?;
        if needed <= self.cap {
            return Ok(());
        }

        let new_cap = needed
            .max(self.cap.saturating_mul(self.config.growth_factor))
            .max(self.config.initial_capacity);
        self.grow_to(new_cap)
    }

    fn grow_to(&mut self, new_cap: usize) -> MemoryResult<()> {
        // SAFETY: self.ptr is None or a live block from self.allocator;
        // on failure it stays ours and untouched
        let ptr = unsafe { self.allocator.reallocate(self.ptr, new_cap)? };

        #[cfg(feature = "logging")]
        trace!(
            allocator = self.allocator.name(),
            old_capacity = self.cap,
            new_capacity = new_cap,
            "slot array grew"
        );

        self.ptr = Some(ptr);
        self.cap = new_cap;
        Ok(())
    }

    /// Append one byte
    pub fn push(&mut self, byte: u8) -> MemoryResult<()> {
        self.reserve(1)?;
        let ptr = self.spare_ptr();
        // SAFETY: reserve guaranteed len < cap
        unsafe { ptr.write(byte) };
        self.len += 1;
        Ok(())
    }

    /// Append a slice, growing at most once
    pub fn extend_from_slice(&mut self, bytes: &[u8]) -> MemoryResult<()> {
        if bytes.is_empty() {
            return Ok(());
        }
        self.reserve(bytes.len())?;
        let dst = self.spare_ptr();
        // SAFETY: reserve guaranteed room for bytes.len() past len, and a
        // borrowed slice cannot alias our exclusively owned storage
        unsafe { ptr::copy_nonoverlapping(bytes.as_ptr(), dst, bytes.len()) };
        self.len += bytes.len();
        Ok(())
    }

    /// Remove and return the last byte
    pub fn pop(&mut self) -> Option<u8> {
        let last = *self.as_slice().last()?;
        self.len -= 1;
        Some(last)
    }

    /// Shorten to `len` bytes; capacity is kept
    pub fn truncate(&mut self, len: usize) {
        self.len = self.len.min(len);
    }

    /// Remove every byte; capacity is kept
    pub fn clear(&mut self) {
        self.len = 0;
    }

    /// Give back unused capacity
    ///
    /// An empty array releases its storage entirely.
    pub fn shrink_to_fit(&mut self) -> MemoryResult<()> {
        if self.len == self.cap {
            return Ok(());
        }
        if self.len == 0 {
            // SAFETY: self.ptr is a live block from self.allocator and is
            // forgotten right after
            unsafe { self.allocator.release(self.ptr.take()) };
            self.cap = 0;
            return Ok(());
        }
        self.grow_to(self.len)
    }

    /// The initialised bytes
    pub fn as_slice(&self) -> &[u8] {
        match self.ptr {
            // SAFETY: the first len bytes are initialised and owned by us
            Some(ptr) => unsafe { core::slice::from_raw_parts(ptr.as_ptr(), self.len) },
            None => &[],
        }
    }

    /// The initialised bytes, mutably
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        match self.ptr {
            // SAFETY: the first len bytes are initialised and exclusively ours
            Some(ptr) => unsafe { core::slice::from_raw_parts_mut(ptr.as_ptr(), self.len) },
            None => &mut [],
        }
    }

    /// First byte past the initialised region; only valid while `len < cap`
    fn spare_ptr(&mut self) -> *mut u8 {
        match self.ptr {
            // SAFETY: len <= cap, so the offset stays within the block
            Some(ptr) => unsafe { ptr.as_ptr().add(self.len) },
            None => ptr::null_mut(),
        }
    }
}

impl<A: RawAllocator> Drop for SlotArray<A> {
    fn drop(&mut self) {
        // SAFETY: self.ptr is None or a live block from self.allocator
        unsafe { self.allocator.release(self.ptr.take()) };
    }
}

impl<A: RawAllocator> fmt::Debug for SlotArray<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlotArray")
            .field("allocator", &self.allocator.name())
            .field("len", &self.len)
            .field("capacity", &self.cap)
            .finish()
    }
}

impl<A: RawAllocator> AsRef<[u8]> for SlotArray<A> {
    fn as_ref(&self) -> &[u8] {
        self.as_slice()
    }
}

// SAFETY: the array exclusively owns its block; moving it to another thread
// is sound as long as the allocator can be moved and used there
unsafe impl<A: RawAllocator + Send> Send for SlotArray<A> {}

// SAFETY: &SlotArray only reads initialised bytes and names the allocator
unsafe impl<A: RawAllocator + Sync> Sync for SlotArray<A> {}
