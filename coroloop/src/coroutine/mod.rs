//! Stackful coroutines.
//!
//! This module provides the user-facing coroutine API:
//! - [`go`] and [`go_on`] to spawn work as coroutines,
//! - [`pause`] and [`resumer`] to suspend and later continue one,
//! - [`can_yield`] and [`stats`] to inspect the calling context,
//! - [`block_on`] to run a coroutine from plain thread code and wait for it.
//!
//! Coroutines never migrate: each one lives and dies on the loop thread
//! whose runner created it.

mod arena;
mod context;
mod core;
mod resumer;

pub(crate) mod runner;
pub(crate) mod stack;

pub use resumer::Resumer;
pub use runner::RunnerStats;

use crate::runtime::event_loop::{self, LoopHandle, LoopState};
use crate::runtime::task::Task;
use crate::runtime::work_stealing::injector::Injector;
use crate::{Error, Result};

use std::panic::{self, AssertUnwindSafe, Location};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::Duration;

/// How often [`block_on`] checks whether its loop died underneath it.
const BLOCK_ON_CHECK: Duration = Duration::from_millis(100);

/// Spawns `f` as a coroutine on whichever loop gets to it first.
///
/// The task enters the process-wide work-stealing queue. The calling
/// thread's loop is woken, or the background loop when the caller is not
/// on a loop thread.
#[track_caller]
pub fn go<F>(f: F)
where
    F: FnOnce() + Send + 'static,
{
    Injector::global().push(Task::new(f));

    match LoopHandle::current() {
        Some(current) => current.wake(),
        None => match event_loop::background() {
            Some(background) => background.wake(),
            None => log::error!("no loop available to run a spawned coroutine"),
        },
    }
}

/// Spawns `f` as a coroutine on `target`, and only there.
///
/// Coroutines spawned on the same loop from the same thread start in
/// submission order.
#[track_caller]
pub fn go_on<F>(target: &LoopHandle, f: F) -> Result<()>
where
    F: FnOnce() + Send + 'static,
{
    let location = Location::caller();
    let task = Task::with_location(f, location);

    target.post(Task::with_location(
        move || {
            runner::with_runner(|runner| runner.schedule_task(task));
        },
        location,
    ))
}

/// Suspends the calling coroutine until a [`Resumer`] taken before this
/// call is invoked.
///
/// Fails with [`Error::NotYieldable`] outside a coroutine.
pub fn pause() -> Result<()> {
    runner::with_runner(|runner| runner.pause()).unwrap_or(Err(Error::NotYieldable))
}

/// A resumer for the calling coroutine's next pause, or `None` outside a
/// coroutine. See [`Resumer`] for when it goes stale.
pub fn resumer() -> Option<Resumer> {
    runner::with_runner(|runner| {
        runner
            .current_handle()
            .map(|handle| Resumer::new(runner.bind_loop().clone(), handle))
    })
    .flatten()
}

/// `true` when called from inside a coroutine.
pub fn can_yield() -> bool {
    runner::with_runner(|runner| runner.yieldable()).unwrap_or(false)
}

/// Scheduler counters of the calling thread's runner, if it has one.
pub fn stats() -> Option<RunnerStats> {
    runner::with_runner(|runner| runner.stats())
}

/// Runs `f` as a coroutine on `target` and blocks the calling thread until
/// it returns.
///
/// A panic inside `f` is resumed on the caller. Fails with
/// [`Error::InLoopThread`] when called from `target`'s own thread, and with
/// [`Error::NotRunning`] if the loop stops before `f` finishes.
#[track_caller]
pub fn block_on<F, R>(target: &LoopHandle, f: F) -> Result<R>
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    if target.is_in_loop_thread() {
        return Err(Error::InLoopThread(target.name().to_owned()));
    }

    let (sender, receiver) = mpsc::channel();

    go_on(target, move || {
        let outcome = panic::catch_unwind(AssertUnwindSafe(f));
        let _ = sender.send(outcome);
    })?;

    let outcome = loop {
        match receiver.recv_timeout(BLOCK_ON_CHECK) {
            Ok(outcome) => break outcome,
            Err(RecvTimeoutError::Timeout) if target.state() != LoopState::Stopped => {}
            Err(_) => match receiver.try_recv() {
                Ok(outcome) => break outcome,
                Err(_) => return Err(Error::NotRunning(target.name().to_owned())),
            },
        }
    };

    match outcome {
        Ok(value) => Ok(value),
        Err(payload) => panic::resume_unwind(payload),
    }
}
