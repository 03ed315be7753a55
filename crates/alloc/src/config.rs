//! Configuration for seam-alloc
//!
//! Two components take configuration: the fault injector, which decides
//! which allocating calls to refuse, and [`SlotArray`](crate::array::SlotArray),
//! which decides how fast to grow. Both follow the same shape: `Default`,
//! named presets, and `validate()`.

use core::num::NonZeroUsize;

#[cfg(feature = "logging")]
use tracing::warn;

use crate::error::{MemoryError, MemoryResult};

// ============================================================================
// Fault Injection
// ============================================================================

/// Which allocating calls a [`FaultInjectingAllocator`](crate::allocator::FaultInjectingAllocator)
/// refuses
///
/// Calls are numbered from 1 across allocate, zero-fill and reallocate.
/// Release is never refused. Rules combine: a call fails if any rule says so.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FaultConfig {
    /// Let the first N allocating calls through, refuse everything after
    pub fail_after: Option<usize>,
    /// Refuse every Nth allocating call
    pub fail_every: Option<NonZeroUsize>,
    /// Refuse requests larger than this many bytes
    pub max_allocation_size: Option<usize>,
}

impl FaultConfig {
    /// Never inject a fault
    pub const fn never() -> Self {
        Self {
            fail_after: None,
            fail_every: None,
            max_allocation_size: None,
        }
    }

    /// Refuse every allocating call after the first `calls`
    pub const fn fail_after(calls: usize) -> Self {
        Self {
            fail_after: Some(calls),
            ..Self::never()
        }
    }

    /// Refuse every `n`th allocating call
    pub const fn fail_every(n: NonZeroUsize) -> Self {
        Self {
            fail_every: Some(n),
            ..Self::never()
        }
    }

    /// Refuse requests above `bytes`
    pub const fn size_limit(bytes: usize) -> Self {
        Self {
            max_allocation_size: Some(bytes),
            ..Self::never()
        }
    }

    /// Whether any rule is configured
    pub fn is_active(&self) -> bool {
        self.fail_after.is_some() || self.fail_every.is_some() || self.max_allocation_size.is_some()
    }

    /// Validate fault configuration
    pub fn validate(&self) -> MemoryResult<()> {
        if self.max_allocation_size == Some(0) {
            return Err(MemoryError::invalid_config(
                "max_allocation_size of zero refuses every request; use fail_after(0)",
            ));
        }

        if !self.is_active() {
            #[cfg(feature = "logging")]
            warn!("fault injector configured without rules, no fault will be injected");
        }

        Ok(())
    }
}

// ============================================================================
// Slot Array
// ============================================================================

/// Growth policy of a [`SlotArray`](crate::array::SlotArray)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArrayConfig {
    /// Capacity reserved by the first growth
    pub initial_capacity: usize,
    /// Multiplier applied to the capacity on each growth
    pub growth_factor: usize,
}

impl Default for ArrayConfig {
    fn default() -> Self {
        Self {
            initial_capacity: 16,
            growth_factor: 2,
        }
    }
}

impl ArrayConfig {
    /// Small buffers that grow slowly
    pub const fn compact() -> Self {
        Self {
            initial_capacity: 4,
            growth_factor: 2,
        }
    }

    /// Large buffers that grow quickly, fewer reallocate calls
    pub const fn bulk() -> Self {
        Self {
            initial_capacity: 4096,
            growth_factor: 4,
        }
    }

    /// Validate array configuration
    pub fn validate(&self) -> MemoryResult<()> {
        if self.initial_capacity == 0 {
            return Err(MemoryError::invalid_config("initial_capacity cannot be zero"));
        }

        if self.growth_factor < 2 {
            return Err(MemoryError::invalid_config("growth_factor must be at least 2"));
        }

        if !self.initial_capacity.is_power_of_two() {
            #[cfg(feature = "logging")]
            warn!(
                initial_capacity = self.initial_capacity,
                "initial_capacity is not a power of two"
            );
        }

        Ok(())
    }
}
