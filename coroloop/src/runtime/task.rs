use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe, Location};

/// A single-use unit of work and the source location that created it.
///
/// Tasks move into exactly one queue, run at most once and are dropped
/// right after running. A panic inside a task is caught and logged with
/// the creation site; it never crosses into the scheduler.
pub(crate) struct Task {
    func: Box<dyn FnOnce() + Send>,
    location: &'static Location<'static>,
}

impl Task {
    /// Wraps `func`, recording the caller as the task's origin.
    #[track_caller]
    pub(crate) fn new<F>(func: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self::with_location(func, Location::caller())
    }

    pub(crate) fn with_location<F>(func: F, location: &'static Location<'static>) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            func: Box::new(func),
            location,
        }
    }

    pub(crate) fn location(&self) -> &'static Location<'static> {
        self.location
    }

    /// Runs the task to completion.
    pub(crate) fn run(self) {
        run_guarded(self.location, self.func);
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("location", &format_args!("{}", self.location))
            .finish_non_exhaustive()
    }
}

/// Runs `func`, logging instead of propagating a panic.
pub(crate) fn run_guarded<F: FnOnce()>(location: &'static Location<'static>, func: F) {
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(func)) {
        log::error!(
            "task from {location} panicked: {}",
            panic_message(payload.as_ref())
        );
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "<non-string panic payload>"
    }
}
