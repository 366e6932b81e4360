//! Work-stealing scheduler components.
//!
//! This module implements the task queues runners pull work from.
//!
//! It consists of:
//! - [`injector`]: a process-wide queue for tasks spawned without
//!   affinity, drained by every runner,
//! - [`queue`]: per-runner local queues holding tasks bound to one loop.
//!
//! A runner always serves its local queue first and steals from the
//! injector only when the local queue is empty.

pub(crate) mod injector;
pub(crate) mod queue;
