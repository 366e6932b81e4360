//! Utilities for memory-efficient data structures.
//!
//! This module provides low-level utilities used internally by the runtime:
//! a [`Slab`] allocator used for fast indexed storage with reuse of freed
//! slots, and the fatal-error helper used when a scheduler invariant breaks.

mod slab;

pub(crate) use slab::Slab;

/// Logs `message` and aborts the process.
///
/// Used for scheduler invariant violations: the coroutine state machine can
/// no longer be trusted, and unwinding across a foreign stack is not an
/// option.
#[cold]
pub(crate) fn fatal(message: &str) -> ! {
    log::error!("fatal: {message}");
    std::process::abort()
}
