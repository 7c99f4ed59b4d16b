use crate::runtime::core::Scheduler;

use std::cell::RefCell;

thread_local! {
    /// Thread-local handle to the scheduling domain currently transferring.
    ///
    /// This is set for the duration of every transfer into a coroutine and
    /// allows code running inside the coroutine (free functions such as
    /// [`yield_now`](crate::yield_now) and [`spawn`](crate::spawn)) to reach
    /// its domain without explicit parameter passing.
    pub(crate) static CURRENT_SCHEDULER: RefCell<Option<Scheduler>> =
        const { RefCell::new(None) };
}

/// Enters the execution context of a scheduling domain.
///
/// This function temporarily installs `scheduler` as the thread's current
/// domain for the duration of the closure `f`. After the closure returns,
/// the previous domain (possibly none) is restored.
///
/// Transfers nest strictly, so the handle installed while a coroutine
/// runs is always the one that resumed it.
///
/// # Arguments
///
/// * `scheduler` - Handle to the domain performing the transfer.
/// * `f` - Closure executed inside the domain context.
///
/// # Returns
///
/// Returns the result of the closure `f`.
pub(crate) fn enter_context<R>(scheduler: Scheduler, f: impl FnOnce() -> R) -> R {
    let prev = CURRENT_SCHEDULER.with(|cell| cell.replace(Some(scheduler)));

    let out = f();

    CURRENT_SCHEDULER.with(|cell| cell.replace(prev));

    out
}
