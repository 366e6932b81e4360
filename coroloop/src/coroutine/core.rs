use super::context::ExecutionContext;
use crate::runtime::task::Task;
use crate::utils::fatal;

use std::cell::{Cell, RefCell, UnsafeCell};
use std::fmt;
use std::ptr;

/// Lifecycle of a coroutine.
///
/// `Initialized → Running → Done` for straight-line work, with any number
/// of `Running ⇄ Paused` round trips in between. A parked coroutine goes
/// back to `Initialized`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum CoroState {
    Initialized,
    Running,
    Paused,
    Done,
}

/// A stackful execution unit with at most one bound task.
///
/// The resume generation distinguishes successive uses of the same
/// coroutine: it moves forward on every resume and every recycle, so a
/// resumer captured earlier can tell that it is stale.
pub(crate) struct Coroutine {
    context: UnsafeCell<ExecutionContext>,
    state: Cell<CoroState>,
    task: RefCell<Option<Task>>,
    generation: Cell<u64>,
}

impl Coroutine {
    /// The placeholder for the loop thread's native stack. It is running
    /// from the start since it is whatever code created it.
    pub(crate) fn main() -> Self {
        Self {
            context: UnsafeCell::new(ExecutionContext::native()),
            state: Cell::new(CoroState::Running),
            task: RefCell::new(None),
            generation: Cell::new(0),
        }
    }

    pub(crate) fn new(entry: extern "C" fn(), stack_size: usize, generation: u64) -> Self {
        Self {
            context: UnsafeCell::new(ExecutionContext::new(entry, stack_size)),
            state: Cell::new(CoroState::Initialized),
            task: RefCell::new(None),
            generation: Cell::new(generation),
        }
    }

    pub(crate) fn state(&self) -> CoroState {
        self.state.get()
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation.get()
    }

    /// Invalidates every resumer captured so far.
    pub(crate) fn bump_generation(&self) {
        self.generation.set(self.generation.get() + 1);
    }

    pub(crate) fn is_main(&self) -> bool {
        unsafe { (*self.context.get()).is_native() }
    }

    /// Stable address-based identity, used in diagnostics.
    pub(crate) fn identifier(&self) -> usize {
        self as *const Self as usize
    }

    /// Binds `task` unless one is already bound, in which case the new task
    /// is dropped and the call logged.
    pub(crate) fn bind_task(&self, task: Task) -> bool {
        let mut slot = self.task.borrow_mut();

        if let Some(bound) = slot.as_ref() {
            log::error!(
                "coroutine {:#x} already bound to a task from {}; dropping task from {}",
                self.identifier(),
                bound.location(),
                task.location()
            );
            return false;
        }

        *slot = Some(task);
        true
    }

    pub(crate) fn has_task(&self) -> bool {
        self.task.borrow().is_some()
    }

    /// Runs the bound task on the current stack and clears the binding.
    pub(crate) fn run(&self) {
        let task = self.task.borrow_mut().take();

        if let Some(task) = task {
            task.run();
        }
    }

    /// Suspends `self` and resumes `next`. Returns `false`, without
    /// switching, when the hand-over is not legal.
    pub(crate) fn transfer_to(&self, next: &Coroutine) -> bool {
        if !self.can_hand_over(next) {
            log::warn!(
                "rejected transfer {:#x} ({:?}) -> {:#x} ({:?})",
                self.identifier(),
                self.state(),
                next.identifier(),
                next.state()
            );
            return false;
        }

        self.switch(next, CoroState::Paused);
        true
    }

    /// Returns `self` to the pool state and resumes `next`. The generation
    /// has already moved past the finished task.
    pub(crate) fn park_to(&self, next: &Coroutine) {
        if !self.can_hand_over(next) {
            fatal("parking a coroutine that is not running");
        }

        self.switch(next, CoroState::Initialized);
    }

    /// Marks `self` finished and resumes `next` for good.
    pub(crate) fn exit_to(&self, next: &Coroutine) -> ! {
        if !self.can_hand_over(next) {
            fatal("exiting a coroutine that is not running");
        }

        self.switch(next, CoroState::Done);
        fatal("a finished coroutine was resumed")
    }

    fn can_hand_over(&self, next: &Coroutine) -> bool {
        self.state() == CoroState::Running
            && !ptr::eq(self, next)
            && !matches!(next.state(), CoroState::Running | CoroState::Done)
    }

    fn switch(&self, next: &Coroutine, state: CoroState) {
        log::trace!("switch {:#x} -> {:#x}", self.identifier(), next.identifier());

        self.state.set(state);
        next.state.set(CoroState::Running);

        unsafe { ExecutionContext::transfer(self.context.get(), next.context.get()) };
    }
}

impl fmt::Debug for Coroutine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Coroutine")
            .field("id", &format_args!("{:#x}", self.identifier()))
            .field("main", &self.is_main())
            .field("state", &self.state())
            .field("generation", &self.generation())
            .field("bound", &self.has_task())
            .finish()
    }
}
