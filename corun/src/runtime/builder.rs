use super::core::Scheduler;
use crate::stack::{DEFAULT_STACK_SIZE, clamp_stack_size};

/// Builder for configuring and creating a scheduling domain.
///
/// `SchedulerBuilder` allows customizing domain parameters before
/// constructing the [`Scheduler`]. It supports configuring the stack size
/// given to new coroutines and the maximum number of live coroutines.
///
/// # Examples
///
/// ```rust
/// let scheduler = corun::SchedulerBuilder::new()
///     .stack_size(256 * 1024)
///     .max_coroutines(10_000)
///     .build();
///
/// assert_eq!(scheduler.stack_size(), 256 * 1024);
/// ```
#[derive(Debug, Clone)]
pub struct SchedulerBuilder {
    /// Stack size of new coroutines, already clamped.
    stack_size: usize,

    /// Maximum number of live coroutines.
    max_coroutines: usize,
}

impl SchedulerBuilder {
    /// Creates a new `SchedulerBuilder` with default configuration.
    ///
    /// By default, coroutines get a [`DEFAULT_STACK_SIZE`] stack and the
    /// number of live coroutines is unbounded.
    pub fn new() -> Self {
        Self {
            stack_size: DEFAULT_STACK_SIZE,
            max_coroutines: usize::MAX,
        }
    }

    /// Sets the stack size of every coroutine created by the domain.
    ///
    /// The value goes through [`clamp_stack_size`]: out-of-range sizes
    /// are clamped and the result is rounded up to the alignment unit.
    pub fn stack_size(mut self, bytes: usize) -> Self {
        self.stack_size = clamp_stack_size(bytes);
        self
    }

    /// Sets the maximum number of coroutines alive at once.
    ///
    /// # Panics
    ///
    /// Panics if `n == 0`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// let builder = corun::SchedulerBuilder::new()
    ///     .max_coroutines(64);
    /// ```
    pub fn max_coroutines(mut self, n: usize) -> Self {
        assert!(n > 0, "max_coroutines must be > 0");

        self.max_coroutines = n;
        self
    }

    /// Builds the scheduling domain with the configured options.
    pub fn build(self) -> Scheduler {
        Scheduler::with_config(self.stack_size, self.max_coroutines)
    }
}

impl Default for SchedulerBuilder {
    /// Creates a default `SchedulerBuilder`.
    fn default() -> Self {
        Self::new()
    }
}
