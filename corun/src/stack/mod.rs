//! Coroutine stacks.
//!
//! This module holds the stack-size policy applied when a coroutine is
//! created, and the [`exec`] execution context that owns a private stack
//! and performs control transfer in and out of it.

pub(crate) mod exec;

/// Alignment unit of every configured stack size.
pub const STACK_ALIGNED_SIZE: usize = 4 * 1024;

/// Smallest stack a coroutine can be given.
pub const MIN_STACK_SIZE: usize = 64 * 1024;

/// Largest stack a coroutine can be given.
pub const MAX_STACK_SIZE: usize = 16 * 1024 * 1024;

/// Stack size used when none is configured.
pub const DEFAULT_STACK_SIZE: usize = 2 * 1024 * 1024;

/// Applies the stack-size policy to a requested size.
///
/// The request is clamped to `[MIN_STACK_SIZE, MAX_STACK_SIZE]` and then
/// rounded up to a multiple of [`STACK_ALIGNED_SIZE`]. Out-of-range values
/// are never rejected.
///
/// # Examples
///
/// ```rust
/// use corun::stack::{clamp_stack_size, MIN_STACK_SIZE};
///
/// assert_eq!(clamp_stack_size(1), MIN_STACK_SIZE);
/// assert_eq!(clamp_stack_size(100 * 1024 + 1), 104 * 1024);
/// ```
pub fn clamp_stack_size(size: usize) -> usize {
    let size = size.clamp(MIN_STACK_SIZE, MAX_STACK_SIZE);
    size.div_ceil(STACK_ALIGNED_SIZE) * STACK_ALIGNED_SIZE
}
