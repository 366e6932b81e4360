//! Core runtime components.
//!
//! This module contains the event loop and the plumbing around it.
//!
//! It is responsible for:
//! - running one reactor thread per [`event_loop::EventLoop`],
//! - moving tasks and replies between threads,
//! - distributing coroutine tasks through the work-stealing queues,
//! - exposing the current loop to code running on a loop thread.
//!
//! Most users interact with [`event_loop::LoopHandle`] and the coroutine
//! functions built on top of it rather than with these internals.

mod reply;

pub(crate) mod builder;
pub(crate) mod context;
pub(crate) mod event_loop;
pub(crate) mod task;
pub(crate) mod work_stealing;
