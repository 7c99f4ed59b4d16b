//! Coroutine primitives.
//!
//! This module defines the schedulable unit of the runtime: its identity,
//! lifecycle state, origin link and owned execution context.
//!
//! It includes:
//! - [`CoroutineId`], the never-reused identity of a coroutine,
//! - [`State`], its lifecycle state,
//! - [`Coroutine`], the record shared between the registry and observers,
//! - [`spawn`], which creates a coroutine in the current domain.
//!
//! Coroutines are created and driven through a
//! [`Scheduler`](crate::Scheduler); this module only holds their data.

pub(crate) mod state;

pub use state::State;

use crate::error::{Error, Result};
use crate::runtime::context::CURRENT_SCHEDULER;
use crate::stack::exec::{ExecutionContext, Suspender};

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use std::thread;
use std::time::{Duration, Instant};

/// Identity of a coroutine.
///
/// Ids are assigned from `1` upwards by the scheduling domain, strictly
/// increasing, and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CoroutineId(u64);

impl CoroutineId {
    pub(crate) fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the numeric value of the id.
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for CoroutineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One schedulable unit of execution.
///
/// A `Coroutine` is owned by the registry of its scheduling domain from
/// creation until its body returns. Observers may hold an
/// `Rc<Coroutine>` for inspection, but the stack is reclaimed as soon as
/// the coroutine is closed regardless of outstanding handles.
pub struct Coroutine {
    /// Never-reused identity.
    id: CoroutineId,

    /// Lifecycle state.
    state: Cell<State>,

    /// Monotonic creation timestamp.
    created_at: Instant,

    /// Opaque payload attached by the embedding code.
    task: RefCell<Option<Rc<dyn Any>>>,

    /// Coroutine that most recently transferred control in.
    ///
    /// `None` means host context. Stored as an id so that a reference to
    /// a coroutine that has since ended resolves to nothing instead of
    /// dangling.
    origin: Cell<Option<CoroutineId>>,

    /// The private stack. `None` once the coroutine has been closed.
    context: RefCell<Option<ExecutionContext>>,

    /// Transfer-out handle of `context`.
    suspender: Suspender,
}

impl Coroutine {
    pub(crate) fn new(id: CoroutineId, context: ExecutionContext) -> Self {
        let suspender = context.suspender();

        Self {
            id,
            state: Cell::new(State::Init),
            created_at: Instant::now(),
            task: RefCell::new(None),
            origin: Cell::new(None),
            context: RefCell::new(Some(context)),
            suspender,
        }
    }

    /// Returns the id of the coroutine.
    pub fn id(&self) -> CoroutineId {
        self.id
    }

    /// Returns the lifecycle state of the coroutine.
    pub fn state(&self) -> State {
        self.state.get()
    }

    /// Returns the instant at which the coroutine was created.
    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// Returns the time elapsed since the coroutine was created.
    pub fn elapsed(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// Returns the id of the coroutine that last transferred control in,
    /// or `None` if that was host context.
    pub fn origin_id(&self) -> Option<CoroutineId> {
        self.origin.get()
    }

    /// Returns the task attached to the coroutine, if any.
    pub fn task(&self) -> Option<Rc<dyn Any>> {
        self.task.borrow().clone()
    }

    /// Attaches a task to the coroutine, replacing the previous one.
    pub fn set_task(&self, task: Option<Rc<dyn Any>>) {
        *self.task.borrow_mut() = task;
    }

    /// Returns `true` once the coroutine has been closed.
    pub fn is_end(&self) -> bool {
        self.state.get() == State::End
    }

    pub(crate) fn set_state(&self, state: State) {
        self.state.set(state);
    }

    pub(crate) fn set_origin(&self, origin: Option<CoroutineId>) {
        self.origin.set(origin);
    }

    pub(crate) fn suspender(&self) -> Suspender {
        self.suspender.clone()
    }

    /// Runs the coroutine on its own stack until it yields or ends.
    pub(crate) fn transfer_in(&self) -> thread::Result<()> {
        match self.context.borrow_mut().as_mut() {
            Some(context) => context.transfer_in(),
            None => Ok(()),
        }
    }

    /// Returns `true` if the context reports completion.
    ///
    /// A context that is currently executing is borrowed by its resumer
    /// and is, by definition, not finished.
    pub(crate) fn context_is_end(&self) -> bool {
        match self.context.try_borrow() {
            Ok(context) => context.as_ref().is_none_or(ExecutionContext::is_end),
            Err(_) => false,
        }
    }

    /// Returns `true` while the coroutine's stack is executing, either
    /// running itself or blocked as the resumer of a nested coroutine.
    pub(crate) fn is_transferring(&self) -> bool {
        self.context.try_borrow_mut().is_err()
    }

    /// Drops the execution context, releasing the stack.
    ///
    /// A suspended body is unwound here, so the borrow is released first.
    pub(crate) fn release_context(&self) {
        let context = self.context.borrow_mut().take();
        drop(context);
    }
}

impl fmt::Debug for Coroutine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Coroutine")
            .field("id", &self.id)
            .field("state", &self.state.get())
            .field("origin", &self.origin.get())
            .field("elapsed", &self.elapsed())
            .finish()
    }
}

/// Creates a coroutine in the scheduling domain of the caller.
///
/// This is the handle-free counterpart of
/// [`Scheduler::create`](crate::Scheduler::create), meant for code that
/// already runs inside a coroutine. The new coroutine starts immediately;
/// `spawn` returns once it first yields or ends.
///
/// # Errors
///
/// Returns [`Error::Invalid`] if no scheduling domain is active on this
/// thread, and the errors of `Scheduler::create` otherwise.
///
/// # Examples
///
/// ```rust,ignore
/// scheduler.create(|| {
///     let child = corun::spawn(|| {
///         corun::yield_now().unwrap();
///     })
///     .unwrap();
/// })?;
/// ```
pub fn spawn<F>(f: F) -> Result<CoroutineId>
where
    F: FnOnce() + 'static,
{
    let scheduler = CURRENT_SCHEDULER
        .with(|cell| cell.borrow().clone())
        .ok_or(Error::Invalid)?;

    scheduler.create(f)
}
