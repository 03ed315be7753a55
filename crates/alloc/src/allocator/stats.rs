//! Per-slot call statistics
//!
//! The release slot only receives a pointer, so block sizes are unknown on
//! the way out. The counters therefore track calls and requested bytes, not
//! live bytes.

use core::fmt;
use core::sync::atomic::{AtomicUsize, Ordering};

/// Snapshot of slot call counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SlotStats {
    /// Successful allocate calls
    pub allocations: usize,
    /// Successful zero-fill calls
    pub zero_allocations: usize,
    /// Successful reallocate calls (including those that allocated)
    pub reallocations: usize,
    /// Successful reallocate calls that started from null
    pub null_reallocations: usize,
    /// Release calls with a non-null pointer
    pub releases: usize,
    /// Calls that returned an error
    pub failures: usize,
    /// Total bytes requested by successful calls (cumulative)
    pub bytes_requested: usize,
}

impl SlotStats {
    /// Creates a new empty stats object
    pub const fn new() -> Self {
        Self {
            allocations: 0,
            zero_allocations: 0,
            reallocations: 0,
            null_reallocations: 0,
            releases: 0,
            failures: 0,
            bytes_requested: 0,
        }
    }

    /// Calls that produced a new block
    pub fn blocks_created(&self) -> usize {
        self.allocations + self.zero_allocations + self.null_reallocations
    }

    /// Total calls that reached the allocator
    pub fn total_calls(&self) -> usize {
        self.allocations + self.zero_allocations + self.reallocations + self.releases + self.failures
    }

    /// Ratio of successful allocating calls to all allocating calls
    pub fn success_rate(&self) -> f64 {
        let succeeded = self.allocations + self.zero_allocations + self.reallocations;
        let attempts = succeeded + self.failures;
        if attempts > 0 {
            succeeded as f64 / attempts as f64
        } else {
            1.0
        }
    }
}

impl fmt::Display for SlotStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Slot Statistics:")?;
        writeln!(f, "  malloc:  {}", self.allocations)?;
        writeln!(f, "  calloc:  {}", self.zero_allocations)?;
        writeln!(f, "  realloc: {}", self.reallocations)?;
        writeln!(f, "  free:    {}", self.releases)?;
        writeln!(f, "  failed:  {}", self.failures)?;
        writeln!(f, "  bytes requested: {}", self.bytes_requested)?;
        write!(f, "  success rate: {:.2}%", self.success_rate() * 100.0)
    }
}

/// Thread-safe atomic counterpart of [`SlotStats`]
#[derive(Debug, Default)]
pub struct AtomicSlotStats {
    allocations: AtomicUsize,
    zero_allocations: AtomicUsize,
    reallocations: AtomicUsize,
    null_reallocations: AtomicUsize,
    releases: AtomicUsize,
    failures: AtomicUsize,
    bytes_requested: AtomicUsize,
}

impl AtomicSlotStats {
    /// Creates a new empty atomic stats object
    pub const fn new() -> Self {
        Self {
            allocations: AtomicUsize::new(0),
            zero_allocations: AtomicUsize::new(0),
            reallocations: AtomicUsize::new(0),
            null_reallocations: AtomicUsize::new(0),
            releases: AtomicUsize::new(0),
            failures: AtomicUsize::new(0),
            bytes_requested: AtomicUsize::new(0),
        }
    }

    /// Reset all counters to zero
    pub fn reset(&self) {
        self.allocations.store(0, Ordering::Relaxed);
        self.zero_allocations.store(0, Ordering::Relaxed);
        self.reallocations.store(0, Ordering::Relaxed);
        self.null_reallocations.store(0, Ordering::Relaxed);
        self.releases.store(0, Ordering::Relaxed);
        self.failures.store(0, Ordering::Relaxed);
        self.bytes_requested.store(0, Ordering::Relaxed);
    }

    /// Record a successful allocate call
    pub fn record_allocation(&self, size: usize) {
        self.allocations.fetch_add(1, Ordering::Relaxed);
        self.add_bytes(size);
    }

    /// Record a successful zero-fill call
    pub fn record_zero_allocation(&self, size: usize) {
        self.zero_allocations.fetch_add(1, Ordering::Relaxed);
        self.add_bytes(size);
    }

    /// Record a successful reallocate call
    pub fn record_reallocation(&self, size: usize, from_null: bool) {
        self.reallocations.fetch_add(1, Ordering::Relaxed);
        if from_null {
            self.null_reallocations.fetch_add(1, Ordering::Relaxed);
        }
        self.add_bytes(size);
    }

    /// Record a release of a non-null block
    pub fn record_release(&self) {
        self.releases.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a failed call
    pub fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Saturating add so a long-running counter never wraps
    fn add_bytes(&self, size: usize) {
        let _ = self
            .bytes_requested
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |current| {
                Some(current.saturating_add(size))
            });
    }

    /// Current allocate count
    pub fn allocations(&self) -> usize {
        self.allocations.load(Ordering::Relaxed)
    }

    /// Take a consistent-enough snapshot of all counters
    pub fn snapshot(&self) -> SlotStats {
        SlotStats {
            allocations: self.allocations.load(Ordering::Relaxed),
            zero_allocations: self.zero_allocations.load(Ordering::Relaxed),
            reallocations: self.reallocations.load(Ordering::Relaxed),
            null_reallocations: self.null_reallocations.load(Ordering::Relaxed),
            releases: self.releases.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            bytes_requested: self.bytes_requested.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_record_and_snapshot() {
        let stats = AtomicSlotStats::new();
        stats.record_allocation(10);
        stats.record_zero_allocation(20);
        stats.record_reallocation(30, true);
        stats.record_release();
        stats.record_failure();

        assert_eq!(
            stats.snapshot(),
            SlotStats {
                allocations: 1,
                zero_allocations: 1,
                reallocations: 1,
                null_reallocations: 1,
                releases: 1,
                failures: 1,
                bytes_requested: 60,
            }
        );
    }

    #[test]
    fn test_bytes_saturate() {
        let stats = AtomicSlotStats::new();
        stats.record_allocation(usize::MAX);
        stats.record_allocation(1);
        assert_eq!(stats.snapshot().bytes_requested, usize::MAX);
    }

    #[test]
    fn test_reset() {
        let stats = AtomicSlotStats::new();
        stats.record_allocation(8);
        stats.reset();
        assert_eq!(stats.snapshot(), SlotStats::new());
    }

    #[test]
    fn test_success_rate() {
        let empty = SlotStats::new();
        assert!((empty.success_rate() - 1.0).abs() < f64::EPSILON);

        let half = SlotStats {
            allocations: 1,
            failures: 1,
            ..SlotStats::new()
        };
        assert!((half.success_rate() - 0.5).abs() < f64::EPSILON);
        assert_eq!(half.total_calls(), 2);
    }

    #[test]
    fn test_display() {
        let stats = SlotStats {
            allocations: 3,
            ..SlotStats::new()
        };
        let rendered = stats.to_string();
        assert!(rendered.contains("malloc:  3"));
        assert!(rendered.contains("success rate: 100.00%"));
    }
}
