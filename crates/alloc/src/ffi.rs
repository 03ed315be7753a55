//! C ABI over the process-wide table
//!
//! Lets C code install its own allocator functions and allocate through
//! whatever is installed. Every entry point keeps the C conventions: null
//! means failure, and a null function pointer means "use the default".

use core::ffi::c_void;

use crate::allocator::{CallocFn, FreeFn, MallocFn, ReallocFn, global};

/// Install a custom allocator
///
/// Each argument replaces one slot; a null argument restores that slot's
/// default. Passing four nulls restores the platform allocator.
///
/// # Safety
/// The functions must behave like the C `malloc` family (see
/// [`AllocatorTable::from_slots`](crate::allocator::AllocatorTable::from_slots)).
/// Blocks obtained before the call must still be releasable by the `free`
/// that is installed when they are released.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn seam_set_allocator(
    malloc: Option<MallocFn>,
    calloc: Option<CallocFn>,
    realloc: Option<ReallocFn>,
    free: Option<FreeFn>,
) {
    // SAFETY: forwarded from the caller
    unsafe { global::set_slots(malloc, calloc, realloc, free) };
}

/// Allocate `size` bytes through the installed allocate slot
///
/// # Safety
/// Same as C `malloc`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn seam_malloc(size: usize) -> *mut c_void {
    let malloc = global::current().malloc_slot();
    // SAFETY: caller upholds the C contract of the slot
    unsafe { malloc(size) }
}

/// Allocate `count * size` zeroed bytes through the installed zero-fill slot
///
/// # Safety
/// Same as C `calloc`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn seam_calloc(count: usize, size: usize) -> *mut c_void {
    let calloc = global::current().calloc_slot();
    // SAFETY: caller upholds the C contract of the slot
    unsafe { calloc(count, size) }
}

/// Resize a block through the installed reallocate slot
///
/// # Safety
/// Same as C `realloc`: `ptr` is null or a live block from the installed
/// slot family.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn seam_realloc(ptr: *mut c_void, size: usize) -> *mut c_void {
    let realloc = global::current().realloc_slot();
    // SAFETY: caller upholds the C contract of the slot
    unsafe { realloc(ptr, size) }
}

/// Release a block through the installed release slot
///
/// # Safety
/// Same as C `free`: `ptr` is null or a live block from the installed slot
/// family.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn seam_free(ptr: *mut c_void) {
    let free = global::current().free_slot();
    // SAFETY: caller upholds the C contract of the slot
    unsafe { free(ptr) }
}
