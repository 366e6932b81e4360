use std::io;
use std::os::fd::RawFd;

/// Errors surfaced by the event loop and the coroutine scheduler.
///
/// Scheduler invariant violations are not represented here: they abort the
/// process. Stale resumes are not errors either; they are dropped silently.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The target loop has not been started or has already stopped.
    #[error("event loop `{0}` is not running")]
    NotRunning(String),

    /// The operation touches loop-thread-only state from another thread.
    #[error("operation must run on the thread of event loop `{0}`")]
    NotInLoopThread(String),

    /// The operation would block the loop on itself.
    #[error("operation cannot run on the thread of event loop `{0}`")]
    InLoopThread(String),

    /// The caller is not inside a coroutine, so there is nothing to suspend.
    #[error("not inside a yieldable coroutine")]
    NotYieldable,

    /// The descriptor is already registered with a pump.
    #[error("descriptor {0} is already installed")]
    AlreadyInstalled(RawFd),

    /// The descriptor is not registered with this loop.
    #[error("descriptor {0} is not installed on this loop")]
    NotInstalled(RawFd),

    /// A system call failed (epoll, eventfd, pipe, thread spawn).
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Convenience alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;
