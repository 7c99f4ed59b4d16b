//! Recoverable error values.
//!
//! Two failure classes are represented here:
//! - capacity errors ([`Error::Limit`], [`Error::Stack`]), reported to
//!   the creation caller with no impact on other coroutines,
//! - usage errors ([`Error::Invalid`], [`Error::End`]), raised when a
//!   coroutine-only primitive is called from the wrong place or with a
//!   dead id.
//!
//! The bailout path is intentionally absent: it never produces a value,
//! it terminates the process (see [`Scheduler::bailout`]).
//!
//! [`Scheduler::bailout`]: crate::Scheduler::bailout

use std::io;

use thiserror::Error;

/// Errors returned by scheduler operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The coroutine has already ended, or the id never existed.
    #[error("coroutine has ended or does not exist")]
    End,

    /// Creation was requested while the domain is at its coroutine limit.
    #[error("exceed max number of coroutines ({max})")]
    Limit {
        /// The configured maximum.
        max: usize,
    },

    /// A coroutine-only API was called outside of the coroutine it
    /// applies to.
    #[error("API must be called in the coroutine")]
    Invalid,

    /// The coroutine stack could not be allocated.
    #[error("failed to allocate coroutine stack")]
    Stack(#[source] io::Error),
}

impl Error {
    /// Returns the numeric code of the error.
    ///
    /// `End` is `0`, capacity errors are `-1` and usage errors are `-2`,
    /// so a negative value always means the operation did not happen.
    pub fn code(&self) -> i64 {
        match self {
            Error::End => 0,
            Error::Limit { .. } | Error::Stack(_) => -1,
            Error::Invalid => -2,
        }
    }
}

/// Shorthand for results produced by this crate.
pub type Result<T> = std::result::Result<T, Error>;
