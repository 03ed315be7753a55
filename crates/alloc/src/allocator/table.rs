//! Allocator indirection table
//!
//! An [`AllocatorTable`] bundles the four allocation primitives as plain
//! function pointers with C signatures, so a table can be filled from Rust
//! or from C and passed around by value. A fresh table forwards to the
//! platform allocator (`malloc`, `calloc`, `realloc`, `free`).
//!
//! # Safety
//!
//! The raw slots follow the C allocation contract: a null return means
//! failure, `free(NULL)` is a no-op, and `realloc(NULL, n)` allocates.
//! Installing a custom slot is `unsafe` because the table's safe call
//! surface trusts every slot to honour that contract.

use core::ffi::c_void;
use core::fmt;
use core::ptr::{self, NonNull};

use crate::error::{MemoryError, MemoryResult};

/// `malloc`-shaped slot: size → pointer (null on failure)
pub type MallocFn = unsafe extern "C" fn(usize) -> *mut c_void;

/// `calloc`-shaped slot: count, size → zeroed pointer (null on failure)
pub type CallocFn = unsafe extern "C" fn(usize, usize) -> *mut c_void;

/// `realloc`-shaped slot: pointer, size → pointer (null on failure)
pub type ReallocFn = unsafe extern "C" fn(*mut c_void, usize) -> *mut c_void;

/// `free`-shaped slot: pointer → ()
pub type FreeFn = unsafe extern "C" fn(*mut c_void);

/// Alignment guaranteed by the platform `malloc` family
///
/// Every pointer handed out by the default slots is aligned to at least
/// this many bytes.
pub const MIN_ALIGN: usize = if cfg!(target_pointer_width = "64") { 16 } else { 8 };

// ============================================================================
// Default slots
// ============================================================================

/// Default allocate slot: forwards to the platform `malloc`
///
/// Zero-byte requests are served as one-byte requests so that a null return
/// always means the platform allocator is out of memory.
///
/// # Safety
///
/// Same contract as `malloc`; there are no preconditions on `size`.
pub unsafe extern "C" fn default_malloc(size: usize) -> *mut c_void {
    // SAFETY: malloc accepts any size and reports failure with null
    unsafe { libc::malloc(size.max(1)) }
}

/// Default zero-fill slot: forwards to the platform `calloc`
///
/// # Safety
///
/// Same contract as `calloc`; overflow of `count * size` is detected by
/// the platform and reported with null.
pub unsafe extern "C" fn default_calloc(count: usize, size: usize) -> *mut c_void {
    if count == 0 || size == 0 {
        // SAFETY: 1 * 1 cannot overflow
        return unsafe { libc::calloc(1, 1) };
    }
    // SAFETY: calloc checks the product itself
    unsafe { libc::calloc(count, size) }
}

/// Default reallocate slot: forwards to the platform `realloc`
///
/// A zero `size` is served as one byte: `realloc(p, 0)` may free `p` and
/// return null, which would be indistinguishable from failure.
///
/// # Safety
///
/// `ptr` must be null or a live pointer from the same slot family.
pub unsafe extern "C" fn default_realloc(ptr: *mut c_void, size: usize) -> *mut c_void {
    // SAFETY: caller guarantees ptr is null or owned by the platform allocator
    unsafe { libc::realloc(ptr, size.max(1)) }
}

/// Default release slot: the platform `free` itself
const DEFAULT_FREE: FreeFn = libc::free;

// ============================================================================
// Slot identifiers
// ============================================================================

/// Identifies one of the four slots of a table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    /// `malloc`-shaped allocate slot
    Malloc,
    /// `calloc`-shaped zero-fill slot
    Calloc,
    /// `realloc`-shaped reallocate slot
    Realloc,
    /// `free`-shaped release slot
    Free,
}

impl Slot {
    /// All slots in table order
    pub const ALL: [Self; 4] = [Self::Malloc, Self::Calloc, Self::Realloc, Self::Free];

    /// Name of the C primitive the slot stands for
    pub fn name(self) -> &'static str {
        match self {
            Self::Malloc => "malloc",
            Self::Calloc => "calloc",
            Self::Realloc => "realloc",
            Self::Free => "free",
        }
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// Table
// ============================================================================

/// The four allocation slots, by value
///
/// `AllocatorTable` is `Copy`: components take one at construction and keep
/// calling through it, regardless of what happens to the process-wide table
/// afterwards.
///
/// # Thread Safety
/// The table holds only function pointers. Whether the functions themselves
/// may be called from several threads is part of the contract a custom slot
/// accepts when installed; the defaults are thread-safe.
#[derive(Clone, Copy)]
pub struct AllocatorTable {
    malloc: MallocFn,
    calloc: CallocFn,
    realloc: ReallocFn,
    free: FreeFn,
}

impl AllocatorTable {
    /// Creates a table bound to the platform allocator
    #[inline]
    pub const fn new() -> Self {
        Self {
            malloc: default_malloc,
            calloc: default_calloc,
            realloc: default_realloc,
            free: DEFAULT_FREE,
        }
    }

    /// Creates a table from four custom slots
    ///
    /// # Safety
    /// Each function must honour the C contract of the primitive it
    /// replaces, and the four must form one family: memory from `malloc`,
    /// `calloc` or `realloc` must be accepted by `realloc` and `free`.
    pub const unsafe fn from_slots(
        malloc: MallocFn,
        calloc: CallocFn,
        realloc: ReallocFn,
        free: FreeFn,
    ) -> Self {
        Self {
            malloc,
            calloc,
            realloc,
            free,
        }
    }

    /// Replaces the allocate slot
    ///
    /// # Safety
    /// See [`AllocatorTable::from_slots`].
    #[must_use]
    pub const unsafe fn with_malloc(mut self, f: MallocFn) -> Self {
        self.malloc = f;
        self
    }

    /// Replaces the zero-fill slot
    ///
    /// # Safety
    /// See [`AllocatorTable::from_slots`].
    #[must_use]
    pub const unsafe fn with_calloc(mut self, f: CallocFn) -> Self {
        self.calloc = f;
        self
    }

    /// Replaces the reallocate slot
    ///
    /// # Safety
    /// See [`AllocatorTable::from_slots`].
    #[must_use]
    pub const unsafe fn with_realloc(mut self, f: ReallocFn) -> Self {
        self.realloc = f;
        self
    }

    /// Replaces the release slot
    ///
    /// # Safety
    /// See [`AllocatorTable::from_slots`].
    #[must_use]
    pub const unsafe fn with_free(mut self, f: FreeFn) -> Self {
        self.free = f;
        self
    }

    /// Replaces the allocate slot in place, returning the old one
    ///
    /// # Safety
    /// See [`AllocatorTable::from_slots`].
    pub unsafe fn set_malloc(&mut self, f: MallocFn) -> MallocFn {
        core::mem::replace(&mut self.malloc, f)
    }

    /// Replaces the zero-fill slot in place, returning the old one
    ///
    /// # Safety
    /// See [`AllocatorTable::from_slots`].
    pub unsafe fn set_calloc(&mut self, f: CallocFn) -> CallocFn {
        core::mem::replace(&mut self.calloc, f)
    }

    /// Replaces the reallocate slot in place, returning the old one
    ///
    /// # Safety
    /// See [`AllocatorTable::from_slots`].
    pub unsafe fn set_realloc(&mut self, f: ReallocFn) -> ReallocFn {
        core::mem::replace(&mut self.realloc, f)
    }

    /// Replaces the release slot in place, returning the old one
    ///
    /// # Safety
    /// See [`AllocatorTable::from_slots`].
    pub unsafe fn set_free(&mut self, f: FreeFn) -> FreeFn {
        core::mem::replace(&mut self.free, f)
    }

    /// Current allocate slot
    #[inline]
    pub const fn malloc_slot(&self) -> MallocFn {
        self.malloc
    }

    /// Current zero-fill slot
    #[inline]
    pub const fn calloc_slot(&self) -> CallocFn {
        self.calloc
    }

    /// Current reallocate slot
    #[inline]
    pub const fn realloc_slot(&self) -> ReallocFn {
        self.realloc
    }

    /// Current release slot
    #[inline]
    pub const fn free_slot(&self) -> FreeFn {
        self.free
    }

    /// Whether `slot` still holds its default binding
    pub fn is_default_slot(&self, slot: Slot) -> bool {
        let defaults = Self::new();
        match slot {
            Slot::Malloc => ptr::fn_addr_eq(self.malloc, defaults.malloc),
            Slot::Calloc => ptr::fn_addr_eq(self.calloc, defaults.calloc),
            Slot::Realloc => ptr::fn_addr_eq(self.realloc, defaults.realloc),
            Slot::Free => ptr::fn_addr_eq(self.free, defaults.free),
        }
    }

    /// Whether every slot holds its default binding
    pub fn is_default(&self) -> bool {
        Slot::ALL.iter().all(|&slot| self.is_default_slot(slot))
    }

    /// Slots that no longer hold their default binding, in table order
    pub fn overridden_slots(&self) -> Vec<Slot> {
        Slot::ALL
            .into_iter()
            .filter(|&slot| !self.is_default_slot(slot))
            .collect()
    }

    // ------------------------------------------------------------------------
    // Typed call surface
    // ------------------------------------------------------------------------

    /// Allocates at least `size` bytes of uninitialised memory
    ///
    /// The block is aligned to [`MIN_ALIGN`] when the default slot is in
    /// place and must be handed back through [`AllocatorTable::release`] or
    /// [`AllocatorTable::reallocate`] on a table with the same slot family.
    pub fn allocate(&self, size: usize) -> MemoryResult<NonNull<u8>> {
        // SAFETY: installed slots honour malloc's contract, which has no
        // preconditions (enforced by the unsafe setters)
        let raw = unsafe { (self.malloc)(size) };
        NonNull::new(raw.cast::<u8>()).ok_or_else(|| MemoryError::allocation_failed(size, MIN_ALIGN))
    }

    /// Allocates `count * size` zeroed bytes
    ///
    /// An overflowing product is rejected before the slot is called.
    pub fn zero_allocate(&self, count: usize, size: usize) -> MemoryResult<NonNull<u8>> {
        let total = count
            .checked_mul(size)
            .ok_or_else(|| MemoryError::size_overflow("zero_allocate: count * size"))?;

        // SAFETY: calloc has no preconditions and the product fits in usize
        let raw = unsafe { (self.calloc)(count, size) };
        NonNull::new(raw.cast::<u8>()).ok_or_else(|| MemoryError::allocation_failed(total, MIN_ALIGN))
    }

    /// Resizes a block, or allocates one when `ptr` is `None`
    ///
    /// Contents are preserved up to the smaller of the old and new size.
    /// On failure the original block is left untouched and still owned by
    /// the caller.
    ///
    /// # Safety
    /// `ptr` must be `None` or a live block obtained from this table's slot
    /// family. On success `ptr` is invalidated and the returned pointer
    /// takes its place.
    pub unsafe fn reallocate(
        &self,
        ptr: Option<NonNull<u8>>,
        size: usize,
    ) -> MemoryResult<NonNull<u8>> {
        let old = ptr.map_or(ptr::null_mut(), |p| p.as_ptr().cast::<c_void>());

        // SAFETY: caller guarantees old is null or owned by this slot family
        let raw = unsafe { (self.realloc)(old, size) };
        NonNull::new(raw.cast::<u8>()).ok_or_else(|| MemoryError::allocation_failed(size, MIN_ALIGN))
    }

    /// Releases a block; `None` is a no-op
    ///
    /// # Safety
    /// `ptr` must be `None` or a live block obtained from this table's slot
    /// family. It must not be used afterwards.
    pub unsafe fn release(&self, ptr: Option<NonNull<u8>>) {
        let Some(ptr) = ptr else {
            return;
        };

        // SAFETY: caller guarantees ptr is live and owned by this slot family
        unsafe { (self.free)(ptr.as_ptr().cast::<c_void>()) }
    }
}

impl Default for AllocatorTable {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for AllocatorTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let describe = |slot: Slot, addr: *const ()| {
            if self.is_default_slot(slot) {
                "default".to_string()
            } else {
                format!("custom@{addr:p}")
            }
        };

        f.debug_struct("AllocatorTable")
            .field("malloc", &describe(Slot::Malloc, self.malloc as *const ()))
            .field("calloc", &describe(Slot::Calloc, self.calloc as *const ()))
            .field("realloc", &describe(Slot::Realloc, self.realloc as *const ()))
            .field("free", &describe(Slot::Free, self.free as *const ()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use core::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    static SHADOW_CALLS: AtomicUsize = AtomicUsize::new(0);

    unsafe extern "C" fn shadow_malloc(size: usize) -> *mut c_void {
        SHADOW_CALLS.fetch_add(1, Ordering::SeqCst);
        unsafe { default_malloc(size) }
    }

    unsafe extern "C" fn null_malloc(_size: usize) -> *mut c_void {
        ptr::null_mut()
    }

    unsafe extern "C" fn null_calloc(_count: usize, _size: usize) -> *mut c_void {
        ptr::null_mut()
    }

    #[test]
    fn test_new_table_is_default() {
        let table = AllocatorTable::new();
        assert!(table.is_default());
        assert!(table.overridden_slots().is_empty());
        for slot in Slot::ALL {
            assert!(table.is_default_slot(slot), "{slot} should be default");
        }
    }

    #[test]
    fn test_basic_allocation() {
        let table = AllocatorTable::new();
        let ptr = table.allocate(64).unwrap();
        assert_eq!(ptr.as_ptr() as usize % MIN_ALIGN, 0);

        unsafe {
            ptr.as_ptr().write_bytes(0xAB, 64);
            assert_eq!(*ptr.as_ptr().add(63), 0xAB);
            table.release(Some(ptr));
        }
    }

    #[test]
    fn test_zero_sized_allocation_is_not_a_failure() {
        let table = AllocatorTable::new();
        let ptr = table.allocate(0).unwrap();
        unsafe { table.release(Some(ptr)) };
    }

    #[test]
    fn test_zero_allocate_is_zeroed() {
        let table = AllocatorTable::new();
        let ptr = table.zero_allocate(32, 8).unwrap();

        let bytes = unsafe { core::slice::from_raw_parts(ptr.as_ptr(), 32 * 8) };
        assert!(bytes.iter().all(|&b| b == 0));

        unsafe { table.release(Some(ptr)) };
    }

    #[test]
    fn test_zero_allocate_overflow_skips_slot() {
        // A calloc slot that always fails would turn into AllocationFailed;
        // overflow must be caught before the slot is reached.
        let table = unsafe { AllocatorTable::new().with_calloc(null_calloc) };
        let err = table.zero_allocate(usize::MAX, 2).unwrap_err();
        assert!(matches!(err, MemoryError::SizeOverflow { .. }));
    }

    #[test]
    fn test_reallocation_preserves_contents() {
        let table = AllocatorTable::new();
        unsafe {
            let ptr = table.allocate(4).unwrap();
            ptr.as_ptr().copy_from_nonoverlapping([1_u8, 2, 3, 4].as_ptr(), 4);

            let grown = table.reallocate(Some(ptr), 4096).unwrap();
            assert_eq!(core::slice::from_raw_parts(grown.as_ptr(), 4), &[1, 2, 3, 4]);

            let shrunk = table.reallocate(Some(grown), 2).unwrap();
            assert_eq!(core::slice::from_raw_parts(shrunk.as_ptr(), 2), &[1, 2]);
            table.release(Some(shrunk));
        }
    }

    #[test]
    fn test_reallocate_none_allocates() {
        let table = AllocatorTable::new();
        unsafe {
            let ptr = table.reallocate(None, 128).unwrap();
            ptr.as_ptr().write_bytes(1, 128);
            table.release(Some(ptr));
        }
    }

    #[test]
    fn test_release_none_is_noop() {
        let table = AllocatorTable::new();
        unsafe { table.release(None) };
    }

    #[test]
    fn test_custom_slot_is_called() {
        let table = unsafe { AllocatorTable::new().with_malloc(shadow_malloc) };
        assert_eq!(table.overridden_slots(), vec![Slot::Malloc]);
        assert!(!table.is_default());

        let before = SHADOW_CALLS.load(Ordering::SeqCst);
        let ptr = table.allocate(16).unwrap();
        assert_eq!(SHADOW_CALLS.load(Ordering::SeqCst), before + 1);

        unsafe { table.release(Some(ptr)) };
    }

    #[test]
    fn test_null_slot_becomes_allocation_failed() {
        let table = unsafe { AllocatorTable::new().with_malloc(null_malloc) };
        let err = table.allocate(10).unwrap_err();
        assert_eq!(
            err,
            MemoryError::AllocationFailed {
                size: 10,
                align: MIN_ALIGN
            }
        );
    }

    #[test]
    fn test_set_returns_previous_slot() {
        let mut table = AllocatorTable::new();
        let previous = unsafe { table.set_malloc(null_malloc) };
        assert!(ptr::fn_addr_eq(previous, AllocatorTable::new().malloc_slot()));

        unsafe { table.set_malloc(previous) };
        assert!(table.is_default());
    }

    #[test]
    fn test_debug_marks_custom_slots() {
        let table = unsafe { AllocatorTable::new().with_malloc(null_malloc) };
        let rendered = format!("{table:?}");
        assert!(rendered.contains("malloc: \"custom@"));
        assert!(rendered.contains("free: \"default\""));
    }
}
