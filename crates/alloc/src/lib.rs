//! # seam-alloc
//!
//! Swappable allocation primitives for code that must not hard-wire the
//! platform allocator.
//!
//! The crate provides:
//! - An [`AllocatorTable`] of four slots (`malloc`, `calloc`, `realloc`,
//!   `free`) bound to the platform allocator by default
//! - A process-wide table that can be reassigned at any time, with scoped
//!   overrides that restore the previous table on drop
//! - The [`RawAllocator`] capability trait, so consumers take an allocator
//!   instead of reading global state
//! - Counting and fault-injecting wrappers for tests
//! - A C ABI (`seam_set_allocator`, `seam_malloc`, ...) for foreign callers
//!
//! ## Quick Start
//!
//! ```rust
//! use seam_alloc::prelude::*;
//!
//! // Count what a component allocates without touching global state
//! let counting = CountingAllocator::new(AllocatorTable::new());
//! let mut array = SlotArray::new_in(&counting);
//! array.extend_from_slice(b"hello")?;
//! drop(array);
//! assert!(counting.is_balanced());
//! # Ok::<(), seam_alloc::MemoryError>(())
//! ```
//!
//! ## Features
//!
//! - `logging` (default): structured logging via `tracing`
//! - `ffi` (default): exported C entry points
//!
//! ## Architecture
//!
//! - Standalone error handling via [`error`] module
//! - Configuration with presets and validation via [`config`] module
//! - Optional structured logging (feature: `logging`); raw slot paths and the
//!   `GlobalAlloc` adapter never log

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(rust_2018_idioms)]
// The crate is an allocator shim; unsafe is reviewed per site
#![allow(unsafe_code)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]

// Error types
pub mod error;

// Core modules
pub mod allocator;
pub mod array;
pub mod config;
pub mod extension;
#[cfg(feature = "ffi")]
#[cfg_attr(docsrs, doc(cfg(feature = "ffi")))]
pub mod ffi;

// Re-export core types for convenience
pub use crate::allocator::{AllocatorTable, RawAllocator, Slot};
pub use crate::error::{MemoryError, MemoryResult};
pub use crate::extension::{bar, foo};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod prelude {
    //! Convenient re-exports of commonly used types and traits.

    // Error types
    pub use crate::error::{MemoryError, MemoryResult};

    // Slot table and capability
    pub use crate::allocator::{
        AllocatorTable, CallocFn, FreeFn, MallocFn, RawAllocator, ReallocFn, Slot,
    };

    // Wrappers and statistics
    pub use crate::allocator::{CountingAllocator, FaultInjectingAllocator, SlotStats};

    // Process-wide table
    pub use crate::allocator::global;
    pub use crate::allocator::{GlobalTable, SlotGlobalAlloc, TableGuard};

    // Consumers and configuration
    pub use crate::array::SlotArray;
    pub use crate::config::{ArrayConfig, FaultConfig};
}
