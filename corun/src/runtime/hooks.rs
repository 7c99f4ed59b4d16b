use crate::runtime::core::Scheduler;

use std::cell::RefCell;
use std::rc::Rc;

/// Callback invoked right before a coroutine transition.
///
/// The hook receives the scheduling domain, not the coroutine: observers
/// read [`Scheduler::current`] themselves. During the call, `current()`
/// is the coroutine undergoing the transition.
pub type SwapHook = Rc<dyn Fn(&Scheduler)>;

/// Diagnostic callback run once, right before a bailout terminates the
/// process.
pub type BailoutHook = Rc<dyn Fn()>;

/// The transitions a [`SwapHook`] can observe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookKind {
    /// Before a running coroutine yields back to its origin.
    Yield,

    /// Before a waiting coroutine is transferred into again.
    Resume,

    /// Before an ended coroutine is deregistered and destroyed.
    Close,
}

/// Single-slot hook storage of one scheduling domain.
///
/// Each kind holds at most one hook; setting a hook discards the previous
/// one of the same kind.
#[derive(Default)]
pub(crate) struct Hooks {
    on_yield: RefCell<Option<SwapHook>>,
    on_resume: RefCell<Option<SwapHook>>,
    on_close: RefCell<Option<SwapHook>>,

    /// Armed bailout callback. Non-empty means a bailout is in progress.
    on_bailout: RefCell<Option<BailoutHook>>,
}

impl Hooks {
    fn slot(&self, kind: HookKind) -> &RefCell<Option<SwapHook>> {
        match kind {
            HookKind::Yield => &self.on_yield,
            HookKind::Resume => &self.on_resume,
            HookKind::Close => &self.on_close,
        }
    }

    pub(crate) fn set(&self, kind: HookKind, hook: Option<SwapHook>) -> Option<SwapHook> {
        self.slot(kind).replace(hook)
    }

    pub(crate) fn get(&self, kind: HookKind) -> Option<SwapHook> {
        self.slot(kind).borrow().clone()
    }

    /// Invokes the hook of `kind`, if any.
    ///
    /// The hook is cloned out of its slot first, so it may itself replace
    /// hooks without a borrow conflict.
    pub(crate) fn fire(&self, kind: HookKind, scheduler: &Scheduler) {
        if let Some(hook) = self.get(kind) {
            hook(scheduler);
        }
    }

    pub(crate) fn arm_bailout(&self, hook: BailoutHook) {
        *self.on_bailout.borrow_mut() = Some(hook);
    }

    pub(crate) fn bailout(&self) -> Option<BailoutHook> {
        self.on_bailout.borrow().clone()
    }

    pub(crate) fn is_bailing_out(&self) -> bool {
        self.on_bailout.borrow().is_some()
    }
}
