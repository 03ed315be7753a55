//! `GlobalAlloc` adapter over the process-wide table
//!
//! Lets the seam back `#[global_allocator]`, so every Rust allocation in the
//! process goes through whatever slots are installed:
//!
//! ```rust,ignore
//! #[global_allocator]
//! static GLOBAL: seam_alloc::allocator::SlotGlobalAlloc = seam_alloc::allocator::SlotGlobalAlloc;
//! ```
//!
//! # Safety
//!
//! The `malloc` family only promises [`MIN_ALIGN`]. Layouts within that
//! guarantee go straight to the slots. Larger alignments are served by
//! over-allocating through the same slots and storing the block's base
//! pointer in the word just below the aligned address; `dealloc` and
//! `realloc` read it back, since they receive the same layout.
//!
//! Nothing in this module logs or allocates, since it may be running as the
//! global allocator itself.

use core::alloc::{GlobalAlloc, Layout};
use core::ffi::c_void;
use core::ptr;

use super::{MIN_ALIGN, global};

/// Room reserved below an over-aligned block for its base pointer
const HEADER: usize = size_of::<*mut u8>();

/// Global allocator that dispatches through the process-wide slots
#[derive(Debug, Clone, Copy, Default)]
pub struct SlotGlobalAlloc;

impl SlotGlobalAlloc {
    /// Whether a layout is served by the slots directly, without the
    /// over-aligned header
    #[inline]
    pub const fn is_slot_aligned(layout: Layout) -> bool {
        layout.align() <= MIN_ALIGN
    }

    /// Over-allocate through the slots and hand out an address aligned to
    /// `layout.align()`, with the base pointer stored just below it
    unsafe fn alloc_over_aligned(layout: Layout, zeroed: bool) -> *mut u8 {
        let align = layout.align();
        let Some(total) = layout
            .size()
            .checked_add(align)
            .and_then(|n| n.checked_add(HEADER))
        else {
            return ptr::null_mut();
        };

        let table = global::current();
        let base = if zeroed {
            // SAFETY: 1 * total cannot overflow
            unsafe { (table.calloc_slot())(1, total) }
        } else {
            // SAFETY: malloc has no preconditions
            unsafe { (table.malloc_slot())(total) }
        }
        .cast::<u8>();
        if base.is_null() {
            return ptr::null_mut();
        }

        // HEADER bytes for the base pointer, then up to align - 1 bytes of
        // padding, then size bytes: all within total
        let unaligned = (base as usize).wrapping_add(HEADER);
        let offset = HEADER + (unaligned.wrapping_neg() & (align - 1));

        // SAFETY: offset + size <= total, and offset >= HEADER leaves room
        // for the base pointer below the aligned address
        unsafe {
            let aligned = base.add(offset);
            aligned.sub(HEADER).cast::<*mut u8>().write_unaligned(base);
            aligned
        }
    }

    /// Base pointer of a block handed out by `alloc_over_aligned`
    unsafe fn base_of(ptr: *mut u8) -> *mut u8 {
        // SAFETY: caller guarantees ptr came from alloc_over_aligned
        unsafe { ptr.sub(HEADER).cast::<*mut u8>().read_unaligned() }
    }
}

// SAFETY: installed slots honour the C allocation contract; over-aligned
// layouts are padded within a slot block and released through its base
unsafe impl GlobalAlloc for SlotGlobalAlloc {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        if !Self::is_slot_aligned(layout) {
            // SAFETY: the layout is valid by construction
            return unsafe { Self::alloc_over_aligned(layout, false) };
        }
        let malloc = global::current().malloc_slot();
        // SAFETY: malloc has no preconditions
        unsafe { malloc(layout.size()) }.cast::<u8>()
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        if !Self::is_slot_aligned(layout) {
            // SAFETY: the layout is valid by construction
            return unsafe { Self::alloc_over_aligned(layout, true) };
        }
        let calloc = global::current().calloc_slot();
        // SAFETY: 1 * size cannot overflow
        unsafe { calloc(1, layout.size()) }.cast::<u8>()
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        let block = if Self::is_slot_aligned(layout) {
            ptr
        } else {
            // SAFETY: an over-aligned layout means ptr came from alloc_over_aligned
            unsafe { Self::base_of(ptr) }
        };
        let free = global::current().free_slot();
        // SAFETY: GlobalAlloc guarantees ptr came from this allocator
        unsafe { free(block.cast::<c_void>()) }
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        if Self::is_slot_aligned(layout) {
            let realloc = global::current().realloc_slot();
            // SAFETY: GlobalAlloc guarantees ptr came from this allocator with layout
            return unsafe { realloc(ptr.cast::<c_void>(), new_size) }.cast::<u8>();
        }

        // the slot's realloc would not keep the padding, so move the block
        // SAFETY: GlobalAlloc guarantees new_size rounded up to align fits isize
        let new_layout = unsafe { Layout::from_size_align_unchecked(new_size, layout.align()) };
        // SAFETY: the layout is valid per the line above
        let moved = unsafe { Self::alloc_over_aligned(new_layout, false) };
        if !moved.is_null() {
            // SAFETY: both blocks are live, distinct and at least this long
            unsafe {
                ptr::copy_nonoverlapping(ptr, moved, layout.size().min(new_size));
                self.dealloc(ptr, layout);
            }
        }
        moved
    }
}

#[cfg(test)]
mod tests {
    use core::sync::atomic::{AtomicUsize, Ordering};

    use rstest::rstest;

    use super::*;
    use crate::allocator::{AllocatorTable, default_calloc, default_malloc, global::TEST_LOCK};

    static ZEROED: AtomicUsize = AtomicUsize::new(0);
    static MALLOCED: AtomicUsize = AtomicUsize::new(0);

    unsafe extern "C" fn watched_calloc(count: usize, size: usize) -> *mut c_void {
        ZEROED.fetch_add(1, Ordering::SeqCst);
        unsafe { default_calloc(count, size) }
    }

    unsafe extern "C" fn watched_malloc(size: usize) -> *mut c_void {
        MALLOCED.fetch_add(1, Ordering::SeqCst);
        unsafe { default_malloc(size) }
    }

    #[test]
    fn test_alloc_dealloc() {
        let _lock = TEST_LOCK.lock();
        let layout = Layout::from_size_align(48, 8).unwrap();
        unsafe {
            let ptr = SlotGlobalAlloc.alloc(layout);
            assert!(!ptr.is_null());
            assert_eq!(ptr as usize % 8, 0);
            ptr.write_bytes(3, 48);

            let grown = SlotGlobalAlloc.realloc(ptr, layout, 4096);
            assert!(!grown.is_null());
            assert_eq!(*grown.add(47), 3);
            SlotGlobalAlloc.dealloc(grown, Layout::from_size_align(4096, 8).unwrap());
        }
    }

    #[rstest]
    #[case(MIN_ALIGN * 2, 1)]
    #[case(64, 64)]
    #[case(128, 200)]
    #[case(4096, 10)]
    fn test_over_aligned_round_trip(#[case] align: usize, #[case] size: usize) {
        let _lock = TEST_LOCK.lock();
        let layout = Layout::from_size_align(size, align).unwrap();
        assert!(!SlotGlobalAlloc::is_slot_aligned(layout));

        unsafe {
            let ptr = SlotGlobalAlloc.alloc(layout);
            assert!(!ptr.is_null());
            assert_eq!(ptr as usize % align, 0);
            for i in 0..size {
                ptr.add(i).write(i as u8);
            }

            let grown = SlotGlobalAlloc.realloc(ptr, layout, size * 3);
            assert!(!grown.is_null());
            assert_eq!(grown as usize % align, 0);
            for i in 0..size {
                assert_eq!(*grown.add(i), i as u8);
            }

            let grown_layout = Layout::from_size_align(size * 3, align).unwrap();
            let shrunk = SlotGlobalAlloc.realloc(grown, grown_layout, 1);
            assert!(!shrunk.is_null());
            assert_eq!(*shrunk, 0);
            SlotGlobalAlloc.dealloc(shrunk, Layout::from_size_align(1, align).unwrap());

            let zeroed = SlotGlobalAlloc.alloc_zeroed(layout);
            assert!(!zeroed.is_null());
            assert_eq!(zeroed as usize % align, 0);
            assert!(core::slice::from_raw_parts(zeroed, size).iter().all(|&b| b == 0));
            SlotGlobalAlloc.dealloc(zeroed, layout);
        }
    }

    #[test]
    fn test_over_aligned_goes_through_slots() {
        let _lock = TEST_LOCK.lock();
        let before = MALLOCED.load(Ordering::SeqCst);
        let _guard =
            global::override_with(unsafe { AllocatorTable::new().with_malloc(watched_malloc) });

        let layout = Layout::from_size_align(256, 256).unwrap();
        unsafe {
            let ptr = SlotGlobalAlloc.alloc(layout);
            assert!(!ptr.is_null());
            SlotGlobalAlloc.dealloc(ptr, layout);
        }
        assert_eq!(MALLOCED.load(Ordering::SeqCst), before + 1);
    }

    #[test]
    fn test_alloc_zeroed_uses_calloc_slot() {
        let _lock = TEST_LOCK.lock();
        let before = ZEROED.load(Ordering::SeqCst);
        let _guard =
            global::override_with(unsafe { AllocatorTable::new().with_calloc(watched_calloc) });

        let layout = Layout::from_size_align(256, MIN_ALIGN).unwrap();
        unsafe {
            let ptr = SlotGlobalAlloc.alloc_zeroed(layout);
            assert!(!ptr.is_null());
            assert!(core::slice::from_raw_parts(ptr, 256).iter().all(|&b| b == 0));
            SlotGlobalAlloc.dealloc(ptr, layout);
        }
        assert_eq!(ZEROED.load(Ordering::SeqCst), before + 1);
    }
}
