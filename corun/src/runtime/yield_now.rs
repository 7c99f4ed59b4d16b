use super::context::CURRENT_SCHEDULER;
use super::core::suspend;
use super::coroutine::CoroutineId;
use crate::error::{Error, Result};

/// Yields the running coroutine back to whoever resumed it.
///
/// This allows the origin (another coroutine or host code) to make
/// progress; the function returns once the coroutine is resumed.
///
/// Unlike [`Scheduler::yield_now`](crate::Scheduler::yield_now), this
/// does not require a handle, and it keeps no handle to the domain alive
/// while the coroutine is suspended.
///
/// # Errors
///
/// Returns [`Error::Invalid`] when called outside of a coroutine.
///
/// # Examples
///
/// ```rust,ignore
/// scheduler.create(|| {
///     // Let the creator continue
///     corun::yield_now().unwrap();
/// })?;
/// ```
pub fn yield_now() -> Result<()> {
    let scheduler = CURRENT_SCHEDULER
        .with(|cell| cell.borrow().clone())
        .ok_or(Error::Invalid)?;

    let suspender = scheduler.begin_yield(true)?;
    drop(scheduler);

    suspend(suspender)
}

/// Returns the id of the running coroutine, or `None` from host context.
pub fn current_id() -> Option<CoroutineId> {
    CURRENT_SCHEDULER.with(|cell| cell.borrow().as_ref().and_then(|s| s.current_id()))
}
