//! # corun
//!
//! **corun** is the cooperative coroutine scheduling core of the **Nebula**
//! ecosystem: stackful coroutines that suspend and resume on a single OS
//! thread, without rewriting code in an event-driven style.
//!
//! A [`Scheduler`] is one scheduling domain. It hands out coroutine ids,
//! keeps the registry of live coroutines, and moves control between them
//! with strict nesting: a coroutine that yields returns to whoever resumed
//! it, not to a top-level dispatcher.
//!
//! - **Creation** runs the new coroutine immediately, until it first
//!   yields or ends
//! - **Resume / yield** transfer control along the origin chain
//! - **Reclamation** happens in the resumer, as soon as a body returns
//! - **Hooks** observe yield, resume and close transitions
//! - **Bailout** aborts the whole domain and terminates the process
//!
//! Deciding *when* to resume a waiting coroutine (timers, sockets, an
//! event loop) is left to the embedding code.
//!
//! ## Quick Start
//!
//! ```rust
//! use corun::Scheduler;
//!
//! let scheduler = Scheduler::new();
//!
//! let id = scheduler
//!     .create(|| {
//!         println!("before yield");
//!         corun::yield_now().unwrap();
//!         println!("after resume");
//!     })
//!     .unwrap();
//!
//! assert_eq!(scheduler.count(), 1);
//!
//! scheduler.resume(id).unwrap();
//! assert_eq!(scheduler.count(), 0);
//! ```
//!
//! ## Entry Points
//!
//! `#[corun::main]` and `#[corun::test]` run a function body as the first
//! coroutine of a fresh scheduler. The body cannot hand a value back, so a
//! return type is rejected at compile time:
//!
//! ```rust,compile_fail
//! #[corun::main]
//! fn main() -> Result<(), std::io::Error> {
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`coroutine`]: Coroutine records, ids and lifecycle states
//! - [`stack`]: Stack-size policy
//!
//! ## Getting Started
//!
//! Add corun to your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! corun = { git = "https://github.com/Nebula-ecosystem/corun", package = "corun" }
//! ```

mod error;
mod runtime;

pub mod stack;

pub use error::{Error, Result};
pub use runtime::{Scheduler, WeakScheduler};
pub use runtime::builder::SchedulerBuilder;
pub use runtime::coroutine;
pub use runtime::coroutine::{Coroutine, CoroutineId, State, spawn};
pub use runtime::hooks::{BailoutHook, HookKind, SwapHook};
pub use runtime::yield_now::{current_id, yield_now};

pub use corun_macros::*;
