//! Coroutine-aware time utilities.
//!
//! This module provides [`sleep`], which suspends the calling coroutine on
//! a timer of its own loop instead of blocking the thread.
//!
//! One-shot and repeating timers are available directly on
//! [`LoopHandle`](crate::LoopHandle).

mod sleep;

#[doc(inline)]
pub use sleep::sleep;

pub use crate::reactor::timer::TimerId;
