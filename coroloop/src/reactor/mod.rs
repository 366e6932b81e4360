//! Reactor core and event handling.
//!
//! This module implements the reactor half of an event loop.
//! The reactor is responsible for:
//! - driving I/O readiness through the platform poller,
//! - managing timers in a hierarchical wheel,
//! - dispatching readiness to watched descriptors.
//!
//! A reactor is single-threaded: the [`pump::EventPump`] lives on its
//! loop's thread, and other threads reach it only through the loop's
//! notifiers and command pipe.

mod event;
mod wheel;

pub(crate) mod command;
pub(crate) mod descriptor;
pub(crate) mod poller;
pub(crate) mod pump;
pub(crate) mod timer;
