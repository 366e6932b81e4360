//! Synchronization primitives for coroutines.
//!
//! This module provides:
//! - [`WaitGroup`], which suspends a coroutine until a set of operations
//!   finishes or a timeout wins the race,
//! - a crate-internal spin lock guarding the short critical sections that
//!   loops share across threads.
//!
//! Nothing here blocks a loop thread: waiting is always a coroutine pause.

pub(crate) mod spin;
mod wait_group;

pub use wait_group::{WaitGroup, WaitStatus};
