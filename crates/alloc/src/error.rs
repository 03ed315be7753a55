//! Error types for seam-alloc
//!
//! The raw slots report failure the way the platform allocator does, with a
//! null pointer. Everything above the raw slots converts that into a
//! [`MemoryError`] using thiserror.

use thiserror::Error;

#[cfg(feature = "logging")]
use tracing::{error, warn};

// ============================================================================
// Main Error Types
// ============================================================================

/// Allocation seam errors
#[must_use = "errors should be handled"]
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MemoryError {
    // --- Allocation Errors ---
    #[error("Memory allocation failed: {size} bytes with {align} byte alignment")]
    AllocationFailed { size: usize, align: usize },

    #[error("Size overflow during operation: {operation}")]
    SizeOverflow { operation: String },

    #[error("Allocation exceeds maximum size: {size} bytes (max: {max_size})")]
    ExceedsMaxSize { size: usize, max_size: usize },

    // --- Fault Injection ---
    #[error("Injected allocation fault on call #{call}")]
    FaultInjected { call: usize },

    // --- Configuration Errors ---
    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },
}

impl MemoryError {
    /// Check if error is retryable
    ///
    /// Only injected faults are transient; a real allocation failure is
    /// reported once and left to the caller.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::FaultInjected { .. })
    }

    /// Get error code for categorization
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::AllocationFailed { .. } => "MEM:ALLOC:FAILED",
            Self::SizeOverflow { .. } => "MEM:ALLOC:OVERFLOW",
            Self::ExceedsMaxSize { .. } => "MEM:ALLOC:MAX",
            Self::FaultInjected { .. } => "MEM:FAULT:INJECTED",
            Self::InvalidConfig { .. } => "MEM:CONFIG:INVALID",
        }
    }

    // ============================================================================
    // Convenience Constructors
    // ============================================================================

    /// Create allocation failed error
    pub fn allocation_failed(size: usize, align: usize) -> Self {
        #[cfg(feature = "logging")]
        error!(size, align, "memory allocation failed");

        Self::AllocationFailed { size, align }
    }

    /// Create size overflow error
    pub fn size_overflow(operation: &str) -> Self {
        Self::SizeOverflow {
            operation: operation.to_string(),
        }
    }

    /// Create allocation too large error
    pub fn allocation_too_large(size: usize, max_size: usize) -> Self {
        #[cfg(feature = "logging")]
        warn!(size, max_size, "allocation refused: over size limit");

        Self::ExceedsMaxSize { size, max_size }
    }

    /// Create injected fault error
    pub fn fault_injected(call: usize) -> Self {
        #[cfg(feature = "logging")]
        warn!(call, "injecting allocation fault");

        Self::FaultInjected { call }
    }

    /// Create invalid config error
    pub fn invalid_config(reason: &str) -> Self {
        Self::InvalidConfig {
            reason: reason.to_string(),
        }
    }
}

// ============================================================================
// Result Types
// ============================================================================

/// Result type for memory operations
pub type MemoryResult<T> = core::result::Result<T, MemoryError>;

// ============================================================================
// Tests
// ============================================================================
