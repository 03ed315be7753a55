//! Reserved extension points
//!
//! Neither routine does anything yet. They hold the names so that callers
//! can link against them before the behaviour exists.

/// Reserved; does nothing
#[inline]
pub fn foo() {}

/// Reserved; ignores `a` and returns `0`
#[inline]
pub fn bar(_a: i32) -> i32 {
    0
}
