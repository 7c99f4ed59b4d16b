use super::builder::SchedulerBuilder;
use super::context::{CURRENT_SCHEDULER, enter_context};
use super::coroutine::{Coroutine, CoroutineId, State};
use super::hooks::{BailoutHook, HookKind, Hooks, SwapHook};
use super::registry::Registry;
use crate::error::{Error, Result};
use crate::stack::clamp_stack_size;
use crate::stack::exec::{ExecutionContext, Suspender};

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::process;
use std::rc::{Rc, Weak};
use std::thread;
use std::time::Duration;

use tracing::{debug, error, info, trace, warn};

/// A scheduling domain.
///
/// `Scheduler` is a cheap, clonable handle to one domain. A domain owns:
/// - the registry of its live coroutines and the id allocator,
/// - the "current" pointer naming its running coroutine,
/// - the transition hooks and the bailout callback,
/// - the stack size applied to new coroutines.
///
/// Control transfer follows a strict nesting discipline: whoever resumes
/// a coroutine becomes its origin, and a yield always returns to that
/// origin. `resume` returns to its caller only after the target yields or
/// ends.
///
/// The handle is neither `Send` nor `Sync`; independent domains on
/// separate threads each need their own `Scheduler`.
///
/// Dropping the last handle destroys the coroutines that are still
/// waiting, unwinding their stacks. A body that keeps a `Scheduler` across
/// a yield is itself one of those handles, so the domain can never be
/// dropped while it waits: keep a [`WeakScheduler`] instead, or use the
/// free functions ([`yield_now`](crate::yield_now),
/// [`spawn`](crate::spawn)), which hold no handle while suspended.
#[derive(Clone)]
pub struct Scheduler {
    inner: Rc<Inner>,
}

/// Non-owning handle to a scheduling domain.
///
/// Obtained with [`Scheduler::downgrade`]. Holding one does not keep the
/// domain alive.
#[derive(Clone)]
pub struct WeakScheduler {
    inner: Weak<Inner>,
}

impl WeakScheduler {
    /// Returns a strong handle, or `None` if the domain has been dropped.
    pub fn upgrade(&self) -> Option<Scheduler> {
        self.inner.upgrade().map(|inner| Scheduler { inner })
    }
}

impl fmt::Debug for WeakScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakScheduler")
            .field("alive", &(self.inner.strong_count() > 0))
            .finish()
    }
}

struct Inner {
    /// Live coroutines and id allocation.
    registry: RefCell<Registry>,

    /// Running coroutine, `None` when host context runs.
    current: Cell<Option<CoroutineId>>,

    /// Transition hooks and bailout callback.
    hooks: Hooks,

    /// Stack size of new coroutines, already clamped.
    stack_size: Cell<usize>,

    /// Maximum number of live coroutines.
    max_coroutines: usize,
}

impl Scheduler {
    /// Creates a scheduling domain with default configuration.
    ///
    /// Equivalent to `SchedulerBuilder::new().build()`.
    pub fn new() -> Self {
        SchedulerBuilder::new().build()
    }

    pub(crate) fn with_config(stack_size: usize, max_coroutines: usize) -> Self {
        Self {
            inner: Rc::new(Inner {
                registry: RefCell::new(Registry::new()),
                current: Cell::new(None),
                hooks: Hooks::default(),
                stack_size: Cell::new(stack_size),
                max_coroutines,
            }),
        }
    }

    /// Returns the domain that is transferring on this thread, if any.
    ///
    /// Inside a coroutine body this is the domain that resumed it.
    pub fn try_current() -> Option<Scheduler> {
        CURRENT_SCHEDULER.with(|cell| cell.borrow().clone())
    }

    /// Returns a handle that does not keep the domain alive.
    ///
    /// This is the handle to keep across a yield.
    pub fn downgrade(&self) -> WeakScheduler {
        WeakScheduler {
            inner: Rc::downgrade(&self.inner),
        }
    }

    /// Creates a coroutine running `f` and transfers into it.
    ///
    /// The coroutine gets the next id, is registered, and starts running
    /// immediately with the caller as its origin. `create` returns once
    /// the new coroutine first yields or ends; if `f` returned without
    /// yielding, the id is already gone from the registry.
    ///
    /// # Errors
    ///
    /// - [`Error::Limit`] if the domain already holds its maximum number
    ///   of coroutines,
    /// - [`Error::Stack`] if the stack cannot be allocated.
    ///
    /// # Panics
    ///
    /// Re-raises a panic of `f` that happened before its first yield,
    /// after the coroutine has been cleaned up.
    pub fn create<F>(&self, f: F) -> Result<CoroutineId>
    where
        F: FnOnce() + 'static,
    {
        let coroutine = {
            let mut registry = self.inner.registry.borrow_mut();

            if registry.count() >= self.inner.max_coroutines {
                warn!(
                    count = registry.count(),
                    max = self.inner.max_coroutines,
                    "exceed max number of coroutines"
                );
                return Err(Error::Limit {
                    max: self.inner.max_coroutines,
                });
            }

            let stack_size = self.inner.stack_size.get();
            let context = ExecutionContext::new(stack_size, f).map_err(|err| {
                warn!(error = %err, stack_size, "stack allocation failed");
                Error::Stack(err)
            })?;

            let coroutine = Rc::new(Coroutine::new(registry.next_id(), context));
            registry.insert(coroutine.clone());

            coroutine
        };

        debug!(
            id = %coroutine.id(),
            origin = ?self.current_id(),
            count = self.count(),
            "coroutine created"
        );

        self.run(&coroutine);

        Ok(coroutine.id())
    }

    /// Resumes a waiting coroutine.
    ///
    /// The caller (a coroutine or host context) becomes the origin of the
    /// target, the pre-resume hook fires, and control transfers in. The
    /// call returns once the target yields or ends; an ended target is
    /// destroyed before returning.
    ///
    /// While a bailout is in progress resuming is refused and the call
    /// returns `Ok(())` without transferring.
    ///
    /// # Panics
    ///
    /// Re-raises a panic of the pre-resume hook, after undoing the
    /// transfer bookkeeping: the target is left waiting. Re-raises a panic
    /// of the coroutine body once it has been closed.
    ///
    /// # Errors
    ///
    /// - [`Error::End`] if `id` is not a live coroutine,
    /// - [`Error::Invalid`] if the coroutine is not waiting, e.g. when a
    ///   coroutine tries to resume itself or one of its origins.
    pub fn resume(&self, id: CoroutineId) -> Result<()> {
        self.resume_inner(id, true)
    }

    /// Same as [`resume`](Self::resume), without invoking hooks.
    ///
    /// Meant for transfers issued from inside a hook.
    pub fn resume_naked(&self, id: CoroutineId) -> Result<()> {
        self.resume_inner(id, false)
    }

    /// Suspends the current coroutine and returns control to its origin.
    ///
    /// Returns when the coroutine is resumed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Invalid`] if no coroutine of this domain is
    /// running, or if the caller is not executing on the current
    /// coroutine's own stack.
    pub fn yield_now(&self) -> Result<()> {
        let suspender = self.begin_yield(true)?;
        suspend(suspender)
    }

    /// Same as [`yield_now`](Self::yield_now), without invoking hooks.
    pub fn yield_naked(&self) -> Result<()> {
        let suspender = self.begin_yield(false)?;
        suspend(suspender)
    }

    /// Looks a live coroutine up by id.
    ///
    /// Returns `None` if the coroutine has ended or the id never existed.
    pub fn get_by_id(&self, id: CoroutineId) -> Option<Rc<Coroutine>> {
        self.inner.registry.borrow().get(id)
    }

    /// Returns the running coroutine of this domain.
    pub fn current(&self) -> Option<Rc<Coroutine>> {
        self.inner.current.get().and_then(|id| self.get_by_id(id))
    }

    /// Returns the id of the running coroutine of this domain.
    pub fn current_id(&self) -> Option<CoroutineId> {
        self.inner.current.get()
    }

    /// Returns the running coroutine, failing when called from host
    /// context.
    ///
    /// Coroutine-only APIs use this as their guard.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Invalid`] if no coroutine is running.
    pub fn current_or_fail(&self) -> Result<Rc<Coroutine>> {
        self.current().ok_or_else(|| {
            error!("API must be called in the coroutine");
            Error::Invalid
        })
    }

    /// Returns the task attached to the running coroutine.
    pub fn current_task(&self) -> Option<Rc<dyn Any>> {
        self.current().and_then(|coroutine| coroutine.task())
    }

    /// Returns the task attached to the coroutine `id`.
    pub fn task_of(&self, id: CoroutineId) -> Option<Rc<dyn Any>> {
        self.get_by_id(id).and_then(|coroutine| coroutine.task())
    }

    /// Returns the number of live coroutines.
    pub fn count(&self) -> usize {
        self.inner.registry.borrow().count()
    }

    /// Returns the highest number of coroutines ever alive at once.
    pub fn peak(&self) -> usize {
        self.inner.registry.borrow().peak()
    }

    /// Returns the last id handed out, `0` if none yet.
    pub fn last_id(&self) -> u64 {
        self.inner.registry.borrow().last_id()
    }

    /// Returns the time elapsed since coroutine `id` was created.
    pub fn elapsed(&self, id: CoroutineId) -> Option<Duration> {
        self.get_by_id(id).map(|coroutine| coroutine.elapsed())
    }

    /// Returns the time elapsed since the running coroutine was created.
    pub fn current_elapsed(&self) -> Option<Duration> {
        self.current().map(|coroutine| coroutine.elapsed())
    }

    /// Returns the ids of all live coroutines, in ascending order.
    pub fn coroutines(&self) -> Vec<CoroutineId> {
        self.inner.registry.borrow().ids()
    }

    /// Returns the next live coroutine of the enumeration cursor.
    ///
    /// Coroutines that end while an enumeration is in progress are
    /// skipped. Returns `None` once the enumeration is exhausted, until
    /// [`iter_reset`](Self::iter_reset) is called.
    pub fn iter_next(&self) -> Option<Rc<Coroutine>> {
        self.inner.registry.borrow_mut().iter_next()
    }

    /// Restarts the enumeration cursor from the lowest live id.
    pub fn iter_reset(&self) {
        self.inner.registry.borrow_mut().iter_reset();
    }

    /// Logs every live coroutine at `info` level.
    pub fn dump(&self) {
        let registry = self.inner.registry.borrow();

        info!(
            count = registry.count(),
            peak = registry.peak(),
            current = ?self.inner.current.get(),
            "coroutine list"
        );

        for id in registry.ids() {
            if let Some(coroutine) = registry.get(id) {
                info!(
                    id = %coroutine.id(),
                    state = %coroutine.state(),
                    origin = ?coroutine.origin_id(),
                    elapsed = ?coroutine.elapsed(),
                    "coroutine"
                );
            }
        }
    }

    /// Returns the stack size given to new coroutines.
    pub fn stack_size(&self) -> usize {
        self.inner.stack_size.get()
    }

    /// Sets the stack size given to coroutines created from now on.
    ///
    /// The value is clamped by the stack policy (see
    /// [`clamp_stack_size`]); the size actually applied is returned.
    pub fn set_stack_size(&self, bytes: usize) -> usize {
        let size = clamp_stack_size(bytes);
        self.inner.stack_size.set(size);
        size
    }

    /// Returns the maximum number of live coroutines.
    pub fn max_coroutines(&self) -> usize {
        self.inner.max_coroutines
    }

    /// Installs the hook of `kind`, replacing the previous one.
    pub fn set_hook<F>(&self, kind: HookKind, hook: F)
    where
        F: Fn(&Scheduler) + 'static,
    {
        self.inner.hooks.set(kind, Some(Rc::new(hook)));
    }

    /// Returns the hook of `kind`, if any.
    pub fn hook(&self, kind: HookKind) -> Option<SwapHook> {
        self.inner.hooks.get(kind)
    }

    /// Removes the hook of `kind` and returns it.
    pub fn clear_hook(&self, kind: HookKind) -> Option<SwapHook> {
        self.inner.hooks.set(kind, None)
    }

    /// Installs the pre-yield hook.
    pub fn set_on_yield<F>(&self, hook: F)
    where
        F: Fn(&Scheduler) + 'static,
    {
        self.set_hook(HookKind::Yield, hook);
    }

    /// Installs the pre-resume hook.
    pub fn set_on_resume<F>(&self, hook: F)
    where
        F: Fn(&Scheduler) + 'static,
    {
        self.set_hook(HookKind::Resume, hook);
    }

    /// Installs the pre-close hook.
    pub fn set_on_close<F>(&self, hook: F)
    where
        F: Fn(&Scheduler) + 'static,
    {
        self.set_hook(HookKind::Close, hook);
    }

    /// Aborts the domain and terminates the process.
    ///
    /// From host context, `callback` runs and the process exits at once.
    /// From inside a coroutine, the callback is armed and the coroutine
    /// yields; each resumer on the way up the origin chain sees the armed
    /// bailout and yields in turn, until control reaches host context,
    /// where `callback` runs and the process exits with status `1`. No
    /// coroutine is resumed once a bailout is armed.
    ///
    /// This never returns and is never reported as an [`Error`].
    pub fn bailout<F>(&self, callback: F) -> !
    where
        F: Fn() + 'static,
    {
        let callback: BailoutHook = Rc::new(callback);

        let Some(id) = self.inner.current.get() else {
            terminate(callback);
        };

        error!(%id, "coroutine bailout requested");
        self.inner.hooks.arm_bailout(callback.clone());

        if let Ok(suspender) = self.begin_yield(false) {
            suspender.transfer_out();
        }

        // The chain never resumes a bailing coroutine.
        terminate(callback)
    }

    /// First transfer into a freshly created coroutine.
    fn run(&self, coroutine: &Rc<Coroutine>) {
        let resumer = self.park_resumer();

        coroutine.set_origin(self.inner.current.replace(Some(coroutine.id())));
        coroutine.set_state(State::Running);

        trace!(id = %coroutine.id(), origin = ?coroutine.origin_id(), "run");

        self.transfer(coroutine, resumer);
    }

    fn resume_inner(&self, id: CoroutineId, with_hooks: bool) -> Result<()> {
        let coroutine = self.get_by_id(id).ok_or(Error::End)?;

        if self.inner.hooks.is_bailing_out() {
            warn!(%id, "bailout in progress, resume refused");
            return Ok(());
        }

        if coroutine.state() != State::Waiting || coroutine.is_transferring() {
            warn!(%id, state = %coroutine.state(), "resume of a coroutine that is not waiting");
            return Err(Error::Invalid);
        }

        let origin = coroutine.origin_id();
        let resumer = self.park_resumer();

        coroutine.set_state(State::Running);
        coroutine.set_origin(self.inner.current.replace(Some(id)));

        if with_hooks {
            let fired = panic::catch_unwind(AssertUnwindSafe(|| {
                self.inner.hooks.fire(HookKind::Resume, self);
            }));

            if let Err(payload) = fired {
                warn!(%id, "resume hook panicked, resume rolled back");

                self.inner.current.set(coroutine.origin_id());
                coroutine.set_origin(origin);
                coroutine.set_state(State::Waiting);

                if let Some(resumer) = resumer {
                    resumer.set_state(State::Running);
                }

                panic::resume_unwind(payload);
            }
        }

        trace!(%id, origin = ?coroutine.origin_id(), "resume");

        self.transfer(&coroutine, resumer);

        Ok(())
    }

    /// Performs the yield bookkeeping and returns the handle that
    /// transfers out.
    ///
    /// The caller must transfer out right away. Nothing returned here
    /// keeps the domain alive across the suspension.
    pub(crate) fn begin_yield(&self, with_hooks: bool) -> Result<Suspender> {
        let coroutine = self.current_or_fail()?;
        let suspender = coroutine.suspender();

        if !suspender.is_active() {
            error!(id = %coroutine.id(), "yield called off the coroutine's own stack");
            return Err(Error::Invalid);
        }

        if with_hooks {
            self.inner.hooks.fire(HookKind::Yield, self);
        }

        coroutine.set_state(State::Waiting);
        self.inner.current.set(coroutine.origin_id());

        trace!(id = %coroutine.id(), origin = ?coroutine.origin_id(), "yield");

        Ok(suspender)
    }

    /// Moves the running coroutine, if any, out of `Running` before it
    /// transfers into another one.
    ///
    /// A parked resumer is blocked in `transfer` on its own stack and
    /// cannot be resumed until control comes back to it.
    fn park_resumer(&self) -> Option<Rc<Coroutine>> {
        let resumer = self.current()?;

        // A close hook transferring out of an ended coroutine.
        if resumer.state() != State::Running {
            return None;
        }

        resumer.set_state(State::Waiting);
        Some(resumer)
    }

    /// Transfers into `coroutine`, then runs the end-check and puts the
    /// resumer back in `Running`.
    ///
    /// A panic of the body, or else of the close hook, is re-raised here
    /// once the coroutine has been closed.
    fn transfer(&self, coroutine: &Rc<Coroutine>, resumer: Option<Rc<Coroutine>>) {
        let outcome = enter_context(self.clone(), || coroutine.transfer_in());

        let closed = self.check_end(coroutine);

        if let Some(resumer) = resumer {
            resumer.set_state(State::Running);
        }

        if let Err(payload) = outcome.and(closed) {
            panic::resume_unwind(payload);
        }
    }

    /// Decides what happens after control came back from `coroutine`.
    ///
    /// Cleanup of an ended coroutine belongs to its resumer: code cannot
    /// free the stack it is running on.
    fn check_end(&self, coroutine: &Rc<Coroutine>) -> thread::Result<()> {
        if coroutine.context_is_end() {
            return self.close(coroutine);
        }

        let Some(callback) = self.inner.hooks.bailout() else {
            return Ok(());
        };

        let Some(resumer) = self.inner.current.get() else {
            terminate(callback);
        };

        debug!(id = %resumer, "bailout unwinding through resumer");

        if let Ok(suspender) = self.begin_yield(false) {
            suspender.transfer_out();
        }

        terminate(callback)
    }

    /// Destroys an ended coroutine and deregisters it.
    ///
    /// The coroutine is gone even if the close hook panics; the panic is
    /// handed back for the resumer to re-raise.
    fn close(&self, coroutine: &Rc<Coroutine>) -> thread::Result<()> {
        debug_assert_eq!(self.inner.current.get(), Some(coroutine.id()));

        coroutine.set_state(State::End);

        let fired = panic::catch_unwind(AssertUnwindSafe(|| {
            self.inner.hooks.fire(HookKind::Close, self);
        }));

        self.inner.current.set(coroutine.origin_id());
        self.inner.registry.borrow_mut().remove(coroutine.id());
        coroutine.release_context();

        debug!(id = %coroutine.id(), count = self.count(), "coroutine closed");

        fired
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("current", &self.inner.current.get())
            .field("count", &self.count())
            .field("peak", &self.peak())
            .field("stack_size", &self.inner.stack_size.get())
            .finish()
    }
}

impl Drop for Inner {
    /// Destroys the coroutines still waiting when the domain goes away.
    ///
    /// Their stacks are unwound, so destructors of values living on them
    /// run. No hook fires.
    fn drop(&mut self) {
        let coroutines = self.registry.get_mut().drain();

        if !coroutines.is_empty() {
            debug!(count = coroutines.len(), "dropping scheduler with live coroutines");
        }

        for coroutine in coroutines {
            coroutine.set_state(State::End);
            coroutine.release_context();
        }
    }
}

/// Transfers out through `suspender`.
pub(crate) fn suspend(suspender: Suspender) -> Result<()> {
    if suspender.transfer_out() {
        Ok(())
    } else {
        Err(Error::Invalid)
    }
}

/// Runs the bailout callback and terminates the process.
fn terminate(callback: BailoutHook) -> ! {
    error!("coroutine bailout, terminating process");

    callback();

    process::exit(1)
}
