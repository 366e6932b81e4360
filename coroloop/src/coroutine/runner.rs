//! The per-thread coroutine scheduler.
//!
//! Every loop thread hosts exactly one [`Runner`]. It owns the thread's
//! coroutines, a pool of parked ones ready for reuse, a graveyard of
//! finished ones whose stacks are freed from the native context, and a
//! FIFO of tasks bound to this loop.
//!
//! All context switches go through the native ("main") context: the
//! runner switches into a coroutine from [`Runner::sched`] or a resume,
//! and the coroutine switches back when it pauses, parks or exits.

use super::arena::{Arena, CoroHandle};
use super::core::{CoroState, Coroutine};
use crate::runtime::event_loop::LoopHandle;
use crate::runtime::task::Task;
use crate::runtime::work_stealing::injector::Injector;
use crate::runtime::work_stealing::queue::LocalQueue;
use crate::utils::fatal;
use crate::{Error, Result};

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::ptr;

thread_local! {
    /// The runner of the loop running on this thread.
    ///
    /// A raw pointer rather than a `RefCell`: coroutine entry points read it
    /// while another part of the runner is mid-call on the native stack.
    static RUNNER: Cell<*const Runner> = const { Cell::new(ptr::null()) };
}

/// Snapshot of a runner, as seen from its own thread.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RunnerStats {
    /// Coroutines alive: running, paused or parked.
    pub live: usize,
    /// Finished coroutines kept for reuse.
    pub parked: usize,
    /// Tasks waiting in the loop-bound queue.
    pub local_tasks: usize,
    /// `true` when the caller runs on the native stack, not in a coroutine.
    pub on_main: bool,
}

pub(crate) struct Runner {
    bind_loop: LoopHandle,
    main: Box<Coroutine>,
    /// Arena index of the running coroutine, `None` on the native stack.
    current: Cell<Option<usize>>,
    arena: RefCell<Arena>,
    parked: RefCell<VecDeque<usize>>,
    graveyard: RefCell<Vec<Box<Coroutine>>>,
    local: LocalQueue,
    stack_size: usize,
    max_parked: usize,
}

/// Creates this thread's runner, bound to `bind_loop`.
pub(crate) fn install(bind_loop: LoopHandle) {
    let existing = RUNNER.with(|runner| runner.get());
    if !existing.is_null() {
        fatal("a runner is already installed on this thread");
    }

    log::info!("runner created for loop `{}`", bind_loop.name());

    let runner = Box::new(Runner {
        stack_size: bind_loop.stack_size(),
        max_parked: bind_loop.max_parked(),
        bind_loop,
        main: Box::new(Coroutine::main()),
        current: Cell::new(None),
        arena: RefCell::new(Arena::new()),
        parked: RefCell::new(VecDeque::new()),
        graveyard: RefCell::new(Vec::new()),
        local: LocalQueue::new(),
    });

    RUNNER.with(|slot| slot.set(Box::into_raw(runner)));
}

/// Destroys this thread's runner. Must run on the native stack.
pub(crate) fn uninstall() {
    let runner = RUNNER.with(|slot| slot.replace(ptr::null()));
    if runner.is_null() {
        return;
    }

    let runner = unsafe { Box::from_raw(runner as *mut Runner) };
    if runner.current.get().is_some() {
        fatal("runner torn down from inside a coroutine");
    }

    runner.local.clear();
    runner.graveyard.borrow_mut().clear();
    runner.parked.borrow_mut().clear();

    let coroutines = runner.arena.borrow_mut().drain();
    let suspended = coroutines
        .iter()
        .filter(|coroutine| coroutine.state() == CoroState::Paused)
        .count();

    if suspended > 0 {
        log::warn!(
            "loop `{}` stopped with {suspended} suspended coroutines; their stacks are released without unwinding",
            runner.bind_loop.name()
        );
    }

    drop(coroutines);
    log::info!("runner gone for loop `{}`", runner.bind_loop.name());
}

/// Runs `f` with this thread's runner, if the thread hosts a loop.
pub(crate) fn with_runner<R>(f: impl FnOnce(&Runner) -> R) -> Option<R> {
    let runner = RUNNER.try_with(|runner| runner.get()).ok()?;

    if runner.is_null() {
        return None;
    }

    Some(f(unsafe { &*runner }))
}

/// Entry point of every coroutine stack.
///
/// Runs the bound task, then asks the runner for more work; it only stops
/// when the runner decides to destroy the coroutine.
extern "C" fn coroutine_entry() {
    let runner = RUNNER.with(|runner| runner.get());
    if runner.is_null() {
        fatal("coroutine started without a runner");
    }
    let runner = unsafe { &*runner };

    loop {
        let Some(index) = runner.current.get() else {
            fatal("coroutine running while the runner is on the native stack");
        };

        let coroutine = runner.coroutine(index);
        coroutine.run();
        // Resumers taken by the finished task must not reach the next one.
        coroutine.bump_generation();
        runner.continue_run(index);
    }
}

impl Runner {
    pub(crate) fn bind_loop(&self) -> &LoopHandle {
        &self.bind_loop
    }

    /// `true` inside a coroutine of this runner.
    pub(crate) fn yieldable(&self) -> bool {
        self.current.get().is_some()
    }

    /// `true` when a task is queued for this runner or waiting to be stolen.
    pub(crate) fn has_work(&self) -> bool {
        !self.local.is_empty() || !Injector::global().is_empty()
    }

    /// Queues a task bound to this runner.
    pub(crate) fn schedule_task(&self, task: Task) {
        self.local.push(task);
    }

    pub(crate) fn stats(&self) -> RunnerStats {
        RunnerStats {
            live: self.arena.borrow().len(),
            parked: self.parked.borrow().len(),
            local_tasks: self.local.len(),
            on_main: !self.yieldable(),
        }
    }

    /// Runs queued work until both the local queue and the injector are
    /// empty, then frees the graveyard. Only acts on the native stack.
    pub(crate) fn sched(&self) {
        if self.yieldable() {
            return;
        }

        while let Some(task) = self.next_task() {
            let index = self.retrieve();
            self.coroutine(index).bind_task(task);
            self.switch_to(index);
        }

        self.graveyard.borrow_mut().clear();
    }

    /// Handle to the running coroutine, for building a resumer.
    pub(crate) fn current_handle(&self) -> Option<CoroHandle> {
        let index = self.current.get()?;
        self.arena.borrow().handle(index)
    }

    /// Suspends the running coroutine until it is resumed.
    pub(crate) fn pause(&self) -> Result<()> {
        let Some(index) = self.current.get() else {
            return Err(Error::NotYieldable);
        };

        let coroutine = self.coroutine(index);
        self.current.set(None);

        if !coroutine.transfer_to(&self.main) {
            self.current.set(Some(index));
            fatal("running coroutine could not yield to the native context");
        }

        Ok(())
    }

    /// Resumes a paused coroutine from the native stack. Stale handles are
    /// ignored.
    pub(crate) fn do_resume(&self, handle: CoroHandle) {
        if self.yieldable() {
            fatal("resume attempted from inside a coroutine");
        }

        let target = self
            .arena
            .borrow()
            .resolve(handle)
            .filter(|coroutine| coroutine.state() == CoroState::Paused)
            .map(|coroutine| coroutine as *const Coroutine);

        let Some(target) = target else {
            log::trace!("dropping stale resume of {handle:?}");
            return;
        };

        unsafe { (*target).bump_generation() };
        self.switch_to(handle.index);
        self.graveyard.borrow_mut().clear();
    }

    /// Resumes `handle` now if this is the owning thread's native stack,
    /// otherwise posts the resume to the owning loop.
    pub(crate) fn resume_or_post(owner: &LoopHandle, handle: CoroHandle) {
        let here = owner.is_in_loop_thread()
            && with_runner(|runner| !runner.yieldable()).unwrap_or(false);

        if here {
            with_runner(|runner| runner.do_resume(handle));
            return;
        }

        let posted = owner.post_task(move || {
            with_runner(|runner| runner.do_resume(handle));
        });

        if let Err(err) = posted {
            log::debug!("resume of {handle:?} dropped: {err}");
        }
    }

    fn next_task(&self) -> Option<Task> {
        self.local.pop().or_else(|| Injector::global().steal())
    }

    /// A parked coroutine if one is available, else a fresh one.
    fn retrieve(&self) -> usize {
        if let Some(index) = self.parked.borrow_mut().pop_front() {
            return index;
        }

        let index = self
            .arena
            .borrow_mut()
            .spawn(coroutine_entry, self.stack_size);
        log::debug!("new coroutine in slot {index}");

        index
    }

    /// The coroutine in `index`.
    ///
    /// The reference is detached from the arena borrow: coroutines are
    /// boxed and only freed from the graveyard on the native stack.
    fn coroutine(&self, index: usize) -> &Coroutine {
        match self.arena.borrow().ptr(index) {
            Some(coroutine) => unsafe { &*coroutine },
            None => fatal("coroutine slot is empty"),
        }
    }

    fn switch_to(&self, index: usize) {
        let next = self.coroutine(index);

        self.current.set(Some(index));
        if !self.main.transfer_to(next) {
            log::warn!("coroutine {index} is not resumable");
        }
        self.current.set(None);
    }

    /// Decides what the coroutine in `index` does after finishing a task:
    /// take the next task, park in the pool, or exit for good.
    fn continue_run(&self, index: usize) {
        let coroutine = self.coroutine(index);

        if let Some(task) = self.next_task() {
            coroutine.bind_task(task);
            return;
        }

        if self.parked.borrow().len() < self.max_parked {
            self.parked.borrow_mut().push_back(index);
            self.current.set(None);
            coroutine.park_to(&self.main);
            return;
        }

        let Some(dead) = self.arena.borrow_mut().remove(index) else {
            fatal("exiting coroutine is not in the arena");
        };
        self.graveyard.borrow_mut().push(dead);

        self.current.set(None);
        coroutine.exit_to(&self.main);
    }
}
