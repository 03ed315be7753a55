//! Allocator slots and the components built on them
//!
//! [`AllocatorTable`] holds the four primitive slots. Everything else in this
//! module either wraps a table ([`CountingAllocator`],
//! [`FaultInjectingAllocator`]) or exposes the process-wide one
//! ([`global`], [`SlotGlobalAlloc`]).

// Core slot types
mod stats;
mod table;
mod traits;

// Wrappers
mod counting;
mod fault;

// Process-wide table
pub mod global;
mod global_alloc;

// Re-exports for convenience
pub use counting::CountingAllocator;
pub use fault::FaultInjectingAllocator;
pub use global::{GlobalTable, TableGuard};
pub use global_alloc::SlotGlobalAlloc;
pub use stats::{AtomicSlotStats, SlotStats};
pub use table::{
    AllocatorTable, CallocFn, FreeFn, MIN_ALIGN, MallocFn, ReallocFn, Slot, default_calloc,
    default_malloc, default_realloc,
};
pub use traits::RawAllocator;

pub use crate::error::{MemoryError, MemoryResult};
