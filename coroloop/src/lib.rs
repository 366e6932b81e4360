//! # coroloop
//!
//! **coroloop** is an M:N coroutine runtime for Linux: stackful coroutines
//! scheduled across a set of event loops, each loop owning one OS thread
//! and one epoll reactor.
//!
//! Every loop runs the same tick: wait for I/O readiness or the nearest
//! timer, dispatch descriptor callbacks, fire due timers, run the tasks
//! other threads posted to it, and finally hand the remaining time to its
//! coroutines. Coroutines suspend with [`pause`] and are continued from any
//! thread through a [`Resumer`]; they always run on the loop that created
//! them.
//!
//! The crate offers:
//!
//! - **Event loops** with cross-thread task posting, delayed tasks,
//!   task/reply pairs and timers
//! - **Stackful coroutines** spawned with [`go`] onto a process-wide
//!   work-stealing queue, or pinned to one loop with [`go_on`]
//! - **Watched descriptors** delivering epoll readiness as callbacks
//! - **Coroutine-aware** [`time::sleep`] and [`sync::WaitGroup`]
//! - **Macros** `#[coroloop::main]` and `#[coroloop::test]`
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::time::Duration;
//!
//! #[coroloop::main]
//! fn main() {
//!     let resumer = coroloop::resumer().unwrap();
//!     let owner = resumer.owner().clone();
//!
//!     owner
//!         .post_delay_task(Duration::from_millis(50), move || resumer.resume())
//!         .unwrap();
//!
//!     coroloop::pause().unwrap();
//!     println!("resumed on loop `{}`", owner.name());
//! }
//! ```
//!
//! ## Modules
//!
//! - [`coroutine`]: Spawning, pausing and resuming coroutines
//! - [`sync`]: Coroutine synchronization primitives
//! - [`time`]: Coroutine-aware sleeping and timer ids

mod error;
mod reactor;
mod runtime;
mod utils;

pub mod coroutine;
pub mod sync;
pub mod time;

pub use error::{Error, Result};

pub use reactor::descriptor::WatchedDescriptor;
pub use reactor::poller::Ready;
pub use reactor::timer::TimerId;

pub use runtime::builder::{
    DEFAULT_STACK_SIZE, LoopBuilder, MAX_PARKED_COROUTINES, MAX_POLL_TIMEOUT,
};
pub use runtime::event_loop::{BACKGROUND_LOOP_NAME, EventLoop, LoopHandle, LoopState};

pub use coroutine::{Resumer, block_on, can_yield, go, go_on, pause, resumer};

pub use coroloop_macros::{main, test};
