use std::cell::Cell;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::ptr::NonNull;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;

use corosensei::stack::DefaultStack;
use corosensei::{Coroutine, Yielder};

type RawYielder = Yielder<(), ()>;

/// Source of context tokens. Token `0` stands for "no context" (host).
static NEXT_TOKEN: AtomicU64 = AtomicU64::new(1);

thread_local! {
    /// Token of the context whose stack this thread is executing on.
    ///
    /// Maintained by [`ExecutionContext::transfer_in`]: set on entry,
    /// restored on return. Because transfers nest strictly, the value is
    /// always the innermost running context.
    static ACTIVE: Cell<u64> = const { Cell::new(0) };
}

/// The execution context of one coroutine.
///
/// An `ExecutionContext` owns a private, guard-paged stack and the body
/// that runs on it. It exposes the two operations the scheduler needs:
/// - [`transfer_in`](Self::transfer_in), which hands the current thread
///   to the coroutine until it yields or ends,
/// - [`is_end`](Self::is_end), which reports that the body has returned
///   and the context will never run again.
///
/// Transfer out happens from inside the body through a [`Suspender`].
///
/// Every `unsafe` operation of the crate is confined to this file.
pub(crate) struct ExecutionContext {
    /// The underlying stackful coroutine.
    inner: Coroutine<(), (), (), DefaultStack>,

    /// Handle used by the body to give control back.
    suspender: Suspender,
}

impl ExecutionContext {
    /// Allocates a stack of `stack_size` bytes and prepares `f` to run on
    /// it. The body does not start until the first
    /// [`transfer_in`](Self::transfer_in).
    ///
    /// # Errors
    ///
    /// Returns the OS error if the stack mapping fails.
    pub(crate) fn new<F>(stack_size: usize, f: F) -> io::Result<Self>
    where
        F: FnOnce() + 'static,
    {
        let stack = DefaultStack::new(stack_size)?;

        let slot = Rc::new(Slot {
            token: NEXT_TOKEN.fetch_add(1, Ordering::Relaxed),
            yielder: Cell::new(None),
        });

        let entry = slot.clone();
        let inner = Coroutine::with_stack(stack, move |yielder: &RawYielder, ()| {
            entry.yielder.set(Some(NonNull::from(yielder)));
            f();
            entry.yielder.set(None);
        });

        Ok(Self {
            inner,
            suspender: Suspender { slot },
        })
    }

    /// Starts or continues the body on this context's stack.
    ///
    /// Blocks the caller until the body suspends through its
    /// [`Suspender`], returns, or panics. A panic ends the context and is
    /// handed back as the `Err` payload so the caller can finish its
    /// bookkeeping before re-raising it.
    pub(crate) fn transfer_in(&mut self) -> thread::Result<()> {
        let prev = ACTIVE.with(|active| active.replace(self.suspender.slot.token));

        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            let _ = self.inner.resume(());
        }));

        ACTIVE.with(|active| active.set(prev));

        if self.inner.done() {
            self.suspender.slot.yielder.set(None);
        }

        result
    }

    /// Returns `true` once the body has returned or unwound.
    pub(crate) fn is_end(&self) -> bool {
        self.inner.done()
    }

    /// Returns the handle used to transfer out of this context.
    pub(crate) fn suspender(&self) -> Suspender {
        self.suspender.clone()
    }
}

/// State shared between a context and the body running on it.
struct Slot {
    /// Unique identity of the context on this thread.
    token: u64,

    /// Yielder of the running body; `None` before start and after end.
    yielder: Cell<Option<NonNull<RawYielder>>>,
}

/// Transfer-out handle of an [`ExecutionContext`].
///
/// A `Suspender` does not own the context; holding one across a
/// suspension point keeps no stack alive.
#[derive(Clone)]
pub(crate) struct Suspender {
    slot: Rc<Slot>,
}

impl Suspender {
    /// Returns `true` if the caller is executing on this context's stack,
    /// innermost.
    pub(crate) fn is_active(&self) -> bool {
        ACTIVE.with(Cell::get) == self.slot.token && self.slot.yielder.get().is_some()
    }

    /// Gives control back to whoever last called
    /// [`ExecutionContext::transfer_in`], and returns once the context is
    /// transferred into again.
    ///
    /// Returns `false` without switching if the caller is not running on
    /// this context's stack.
    pub(crate) fn transfer_out(&self) -> bool {
        if !self.is_active() {
            return false;
        }

        let Some(yielder) = self.slot.yielder.get() else {
            return false;
        };

        // SAFETY: the yielder is a local of the body's entry frame and is
        // only published while that frame is alive; `is_active` proves we
        // are on that very stack, so the frame has not returned.
        unsafe { yielder.as_ref() }.suspend(());

        true
    }
}
