//! Core runtime components.
//!
//! This module contains the scheduling domain and everything it drives:
//! coroutine records, the identity registry, transition hooks and
//! cooperative yielding.
//!
//! It is responsible for:
//! - creating coroutines and transferring control in and out of them,
//! - keeping the origin chain that makes nested yields return to their
//!   immediate resumer,
//! - reclaiming a coroutine exactly once its body has returned,
//! - providing thread-local access to the active domain.

mod core;
mod registry;

pub(crate) mod builder;
pub(crate) mod context;
pub(crate) mod hooks;
pub(crate) mod yield_now;

pub mod coroutine;

pub use self::core::{Scheduler, WeakScheduler};
