//! Process-wide allocator table
//!
//! One [`AllocatorTable`] per process, populated with the platform defaults
//! before any code runs and reassignable at any time. Code that can take an
//! injected allocator should prefer an explicit table or [`RawAllocator`];
//! this table is for callers that cannot be threaded through, such as C code
//! going through the `ffi` entry points or [`SlotGlobalAlloc`](super::SlotGlobalAlloc).
//!
//! Readers copy the table out of the lock and call through the copy, so a
//! slot may itself allocate through the process-wide table without
//! deadlocking, and reassignment never waits on an allocation in progress.
//! The lock is never parked on: parking may allocate, and with
//! [`SlotGlobalAlloc`](super::SlotGlobalAlloc) installed every allocation
//! comes back through this table.

use core::marker::PhantomData;
use core::ptr::NonNull;

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard, const_rwlock};

#[cfg(feature = "logging")]
use tracing::debug;

use super::{AllocatorTable, CallocFn, FreeFn, MallocFn, RawAllocator, ReallocFn};
use crate::error::MemoryResult;

static CURRENT: RwLock<AllocatorTable> = const_rwlock(AllocatorTable::new());

// Both critical sections copy four pointers, so spinning is short
fn read_table() -> RwLockReadGuard<'static, AllocatorTable> {
    loop {
        if let Some(guard) = CURRENT.try_read() {
            return guard;
        }
        core::hint::spin_loop();
    }
}

fn write_table() -> RwLockWriteGuard<'static, AllocatorTable> {
    loop {
        if let Some(guard) = CURRENT.try_write() {
            return guard;
        }
        core::hint::spin_loop();
    }
}

/// Snapshot of the process-wide table
#[inline]
pub fn current() -> AllocatorTable {
    *read_table()
}

/// Whether every process-wide slot holds its default binding
pub fn is_default() -> bool {
    current().is_default()
}

/// Replace the whole process-wide table, returning the previous one
///
/// Takes effect for every call made after it returns, on every thread.
pub fn install(table: AllocatorTable) -> AllocatorTable {
    let previous = {
        let mut guard = write_table();
        core::mem::replace(&mut *guard, table)
    };

    #[cfg(feature = "logging")]
    debug!(
        overridden = ?table.overridden_slots(),
        "installed process-wide allocator table"
    );

    previous
}

/// Restore the platform defaults, returning the previous table
pub fn reset() -> AllocatorTable {
    install(AllocatorTable::new())
}

/// Replace all four slots at once; `None` restores that slot's default
///
/// Returns the previous table.
///
/// # Safety
/// The given functions must honour the contract described on
/// [`AllocatorTable::from_slots`], together with any defaults they are
/// combined with. Blocks allocated before the call must still be released
/// through a slot family that accepts them.
pub unsafe fn set_slots(
    malloc: Option<MallocFn>,
    calloc: Option<CallocFn>,
    realloc: Option<ReallocFn>,
    free: Option<FreeFn>,
) -> AllocatorTable {
    let defaults = AllocatorTable::new();
    // SAFETY: forwarded from the caller
    let table = unsafe {
        AllocatorTable::from_slots(
            malloc.unwrap_or(defaults.malloc_slot()),
            calloc.unwrap_or(defaults.calloc_slot()),
            realloc.unwrap_or(defaults.realloc_slot()),
            free.unwrap_or(defaults.free_slot()),
        )
    };
    install(table)
}

/// Replace only the process-wide allocate slot, returning the old slot
///
/// # Safety
/// See [`set_slots`].
pub unsafe fn replace_malloc(f: MallocFn) -> MallocFn {
    let previous = {
        let mut guard = write_table();
        // SAFETY: forwarded from the caller
        unsafe { guard.set_malloc(f) }
    };

    #[cfg(feature = "logging")]
    debug!("replaced process-wide malloc slot");

    previous
}

/// Replace only the process-wide zero-fill slot, returning the old slot
///
/// # Safety
/// See [`set_slots`].
pub unsafe fn replace_calloc(f: CallocFn) -> CallocFn {
    let previous = {
        let mut guard = write_table();
        // SAFETY: forwarded from the caller
        unsafe { guard.set_calloc(f) }
    };

    #[cfg(feature = "logging")]
    debug!("replaced process-wide calloc slot");

    previous
}

/// Replace only the process-wide reallocate slot, returning the old slot
///
/// # Safety
/// See [`set_slots`].
pub unsafe fn replace_realloc(f: ReallocFn) -> ReallocFn {
    let previous = {
        let mut guard = write_table();
        // SAFETY: forwarded from the caller
        unsafe { guard.set_realloc(f) }
    };

    #[cfg(feature = "logging")]
    debug!("replaced process-wide realloc slot");

    previous
}

/// Replace only the process-wide release slot, returning the old slot
///
/// # Safety
/// See [`set_slots`].
pub unsafe fn replace_free(f: FreeFn) -> FreeFn {
    let previous = {
        let mut guard = write_table();
        // SAFETY: forwarded from the caller
        unsafe { guard.set_free(f) }
    };

    #[cfg(feature = "logging")]
    debug!("replaced process-wide free slot");

    previous
}

/// Install `table` until the returned guard is dropped
///
/// Guards nest and must be dropped in reverse order of creation: each guard
/// restores exactly the table it replaced, so dropping an outer guard first
/// leaves the inner override's table installed once the inner guard goes.
/// Guards are tied to the thread that created them, which keeps nesting to
/// plain scopes.
#[must_use = "the previous table is restored as soon as the guard is dropped"]
pub fn override_with(table: AllocatorTable) -> TableGuard {
    TableGuard {
        previous: install(table),
        _not_send: PhantomData,
    }
}

/// Restores the previously installed table on drop
///
/// The guard cannot leave the thread that created it:
///
/// ```compile_fail
/// use seam_alloc::allocator::{AllocatorTable, global};
///
/// let guard = global::override_with(AllocatorTable::new());
/// std::thread::spawn(move || drop(guard));
/// ```
#[derive(Debug)]
pub struct TableGuard {
    previous: AllocatorTable,
    _not_send: PhantomData<*const ()>,
}

impl TableGuard {
    /// The table that will be restored
    pub fn previous(&self) -> &AllocatorTable {
        &self.previous
    }
}

impl Drop for TableGuard {
    fn drop(&mut self) {
        install(self.previous);

        #[cfg(feature = "logging")]
        debug!("restored previous process-wide allocator table");
    }
}

// ============================================================================
// Calls through the process-wide table
// ============================================================================

/// Allocate through the process-wide table
pub fn allocate(size: usize) -> MemoryResult<NonNull<u8>> {
    current().allocate(size)
}

/// Zero-allocate through the process-wide table
pub fn zero_allocate(count: usize, size: usize) -> MemoryResult<NonNull<u8>> {
    current().zero_allocate(count, size)
}

/// Reallocate through the process-wide table
///
/// # Safety
/// `ptr` must be `None` or a live block from the slot family currently
/// installed. See [`AllocatorTable::reallocate`].
pub unsafe fn reallocate(ptr: Option<NonNull<u8>>, size: usize) -> MemoryResult<NonNull<u8>> {
    // SAFETY: forwarded from the caller
    unsafe { current().reallocate(ptr, size) }
}

/// Release through the process-wide table; `None` is a no-op
///
/// # Safety
/// `ptr` must be `None` or a live block from the slot family currently
/// installed. See [`AllocatorTable::release`].
pub unsafe fn release(ptr: Option<NonNull<u8>>) {
    // SAFETY: forwarded from the caller
    unsafe { current().release(ptr) }
}

/// Handle that resolves the process-wide table on every call
///
/// Unlike a copied [`AllocatorTable`], a component holding `GlobalTable`
/// follows later reassignments of the process-wide slots.
#[derive(Debug, Clone, Copy, Default)]
pub struct GlobalTable;

// SAFETY: every call goes through the currently installed table, whose slots
// were installed through the unsafe setters
unsafe impl RawAllocator for GlobalTable {
    fn allocate(&self, size: usize) -> MemoryResult<NonNull<u8>> {
        allocate(size)
    }

    fn zero_allocate(&self, count: usize, size: usize) -> MemoryResult<NonNull<u8>> {
        zero_allocate(count, size)
    }

    unsafe fn reallocate(
        &self,
        ptr: Option<NonNull<u8>>,
        size: usize,
    ) -> MemoryResult<NonNull<u8>> {
        // SAFETY: forwarded from the caller
        unsafe { reallocate(ptr, size) }
    }

    unsafe fn release(&self, ptr: Option<NonNull<u8>>) {
        // SAFETY: forwarded from the caller
        unsafe { release(ptr) }
    }

    fn name(&self) -> &'static str {
        "GlobalTable"
    }
}

/// Serialises tests that reassign the process-wide table
#[cfg(test)]
pub(crate) static TEST_LOCK: parking_lot::Mutex<()> = parking_lot::const_mutex(());

#[cfg(test)]
mod tests {
    use core::ffi::c_void;
    use core::ptr;
    use core::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::allocator::{Slot, default_malloc};
    use crate::error::MemoryError;

    static COUNTED: AtomicUsize = AtomicUsize::new(0);

    unsafe extern "C" fn counting_malloc(size: usize) -> *mut c_void {
        COUNTED.fetch_add(1, Ordering::SeqCst);
        unsafe { default_malloc(size) }
    }

    unsafe extern "C" fn null_malloc(_size: usize) -> *mut c_void {
        ptr::null_mut()
    }

    #[test]
    fn test_starts_with_defaults() {
        let _lock = TEST_LOCK.lock();
        assert!(is_default());
        for slot in Slot::ALL {
            assert!(current().is_default_slot(slot));
        }
    }

    #[test]
    fn test_replace_malloc_and_restore() {
        let _lock = TEST_LOCK.lock();
        COUNTED.store(0, Ordering::SeqCst);

        let previous = unsafe { replace_malloc(counting_malloc) };
        let blocks: Vec<_> = (0..3).map(|_| allocate(32).unwrap()).collect();
        assert_eq!(COUNTED.load(Ordering::SeqCst), 3);
        assert_eq!(current().overridden_slots(), vec![Slot::Malloc]);

        for block in blocks {
            unsafe { release(Some(block)) };
        }
        unsafe { replace_malloc(previous) };
        assert!(is_default());
    }

    #[test]
    fn test_guard_restores_on_drop() {
        let _lock = TEST_LOCK.lock();
        {
            let table = unsafe { AllocatorTable::new().with_malloc(null_malloc) };
            let guard = override_with(table);
            assert!(guard.previous().is_default());
            assert!(matches!(
                allocate(8),
                Err(MemoryError::AllocationFailed { size: 8, .. })
            ));
        }
        assert!(is_default());
        let block = allocate(8).unwrap();
        unsafe { release(Some(block)) };
    }

    #[test]
    fn test_nested_guards() {
        let _lock = TEST_LOCK.lock();
        let outer_table = unsafe { AllocatorTable::new().with_malloc(counting_malloc) };
        let inner_table = unsafe { AllocatorTable::new().with_malloc(null_malloc) };

        let outer = override_with(outer_table);
        let inner = override_with(inner_table);
        assert!(allocate(1).is_err());

        drop(inner);
        assert_eq!(current().overridden_slots(), vec![Slot::Malloc]);
        let block = allocate(1).unwrap();
        unsafe { release(Some(block)) };

        drop(outer);
        assert!(is_default());
    }

    #[test]
    fn test_set_slots_none_means_default() {
        let _lock = TEST_LOCK.lock();
        let previous = unsafe { set_slots(Some(null_malloc), None, None, None) };
        assert!(previous.is_default());
        assert_eq!(current().overridden_slots(), vec![Slot::Malloc]);

        let overridden = unsafe { set_slots(None, None, None, None) };
        assert!(!overridden.is_default());
        assert!(is_default());
    }

    #[test]
    fn test_global_table_follows_reassignment() {
        let _lock = TEST_LOCK.lock();
        let handle = GlobalTable;
        let snapshot = current();

        let _guard = override_with(unsafe { AllocatorTable::new().with_malloc(null_malloc) });
        assert!(handle.allocate(4).is_err());

        // the copy taken before the override is unaffected
        let block = snapshot.allocate(4).unwrap();
        unsafe { snapshot.release(Some(block)) };
    }

    #[test]
    fn test_process_wide_primitives() {
        let _lock = TEST_LOCK.lock();
        unsafe {
            release(None);

            let block = reallocate(None, 16).unwrap();
            block.as_ptr().write_bytes(0x5A, 16);
            let block = reallocate(Some(block), 64).unwrap();
            assert_eq!(*block.as_ptr().add(15), 0x5A);
            release(Some(block));

            let zeroed = zero_allocate(8, 8).unwrap();
            let bytes = core::slice::from_raw_parts(zeroed.as_ptr(), 64);
            assert!(bytes.iter().all(|&b| b == 0));
            release(Some(zeroed));
        }
        let _ = reset();
        assert!(is_default());
    }
}
