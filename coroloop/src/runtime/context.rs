use super::event_loop::LoopHandle;
use super::task::Task;
use crate::reactor::descriptor::WatchedDescriptor;
use crate::reactor::pump::EventPump;

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

/// State of a loop that only its own thread may touch.
pub(crate) struct LoopLocal {
    pub(crate) pump: Rc<EventPump>,

    /// Tasks posted from the loop thread itself.
    pub(crate) nested: RefCell<VecDeque<Task>>,

    /// Set by the reply notifier, cleared when replies are scanned.
    pub(crate) reply_signalled: Cell<bool>,

    /// Task, reply and command descriptors.
    pub(crate) controls: RefCell<Vec<WatchedDescriptor>>,
}

impl LoopLocal {
    pub(crate) fn new(pump: Rc<EventPump>) -> Self {
        Self {
            pump,
            nested: RefCell::new(VecDeque::new()),
            reply_signalled: Cell::new(false),
            controls: RefCell::new(Vec::new()),
        }
    }
}

thread_local! {
    /// Thread-local handle to the loop running on this thread.
    ///
    /// This is set when the loop thread starts and allows runtime
    /// components (timers, resumers, replies) to find their loop
    /// without explicit parameter passing.
    static CURRENT_LOOP: RefCell<Option<LoopHandle>> = const { RefCell::new(None) };

    /// Thread-confined half of the current loop.
    static LOOP_LOCAL: RefCell<Option<Rc<LoopLocal>>> = const { RefCell::new(None) };
}

/// Installs `handle` and `local` as this thread's loop.
pub(crate) fn enter(handle: LoopHandle, local: Rc<LoopLocal>) {
    CURRENT_LOOP.with(|current| current.replace(Some(handle)));
    LOOP_LOCAL.with(|current| current.replace(Some(local)));
}

/// Clears the thread's loop, returning the local state for teardown.
pub(crate) fn leave() -> Option<Rc<LoopLocal>> {
    CURRENT_LOOP.with(|current| current.replace(None));
    LOOP_LOCAL.with(|current| current.replace(None))
}

/// Handle to the loop running on this thread, if any.
pub(crate) fn current_loop() -> Option<LoopHandle> {
    CURRENT_LOOP
        .try_with(|current| current.borrow().clone())
        .ok()
        .flatten()
}

/// Runs `f` with the thread's loop-local state.
///
/// The `Rc` is cloned out first, so `f` may freely call back into code
/// that looks the state up again.
pub(crate) fn with_local<R>(f: impl FnOnce(&LoopLocal) -> R) -> Option<R> {
    let local = LOOP_LOCAL
        .try_with(|current| current.borrow().clone())
        .ok()
        .flatten()?;

    Some(f(&local))
}
