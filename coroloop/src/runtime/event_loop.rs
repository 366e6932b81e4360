//! Event loops.
//!
//! An [`EventLoop`] owns one OS thread running an [`EventPump`] and one
//! coroutine runner. Other threads talk to it through a [`LoopHandle`]:
//! tasks go through a lock-free queue plus an eventfd wake-up, replies
//! through a spinlock-guarded holder list plus a second eventfd, and
//! control commands through a pipe.

use super::builder::{LoopBuilder, LoopConfig};
use super::context::{self, LoopLocal};
use super::reply::{PendingReply, ReplyGuard, ReplyHolder};
use super::task::{Task, run_guarded};
use crate::coroutine::runner;
use crate::reactor::command::{Command, CommandPipe};
use crate::reactor::descriptor::WatchedDescriptor;
use crate::reactor::poller::{Notifier, Poller};
use crate::reactor::pump::{EventPump, PumpDelegate};
use crate::reactor::timer::{TimerCallback, TimerId};
use crate::sync::spin::SpinLock;
use crate::{Error, Result};

use crossbeam::queue::SegQueue;
use std::fmt;
use std::ops::Deref;
use std::panic::Location;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, OnceLock, PoisonError};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::{Duration, Instant};

/// Name of the loop that hosts coroutines spawned outside any loop.
pub const BACKGROUND_LOOP_NAME: &str = "coro_background";

static NEXT_LOOP_ID: AtomicUsize = AtomicUsize::new(1);

/// Lifecycle of an event loop. Each transition happens once.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoopState {
    /// Built, thread not running yet.
    Initializing,
    /// The loop thread is ticking.
    Started,
    /// The loop thread has finished its teardown.
    Stopped,
}

struct Shared {
    id: usize,
    config: LoopConfig,

    state: Mutex<LoopState>,
    state_changed: Condvar,
    /// Accepts posts; cleared as soon as the pump exits.
    running: AtomicBool,

    thread: Mutex<Option<JoinHandle<()>>>,
    joined: AtomicBool,
    thread_id: OnceLock<ThreadId>,

    /// Moved into the loop thread on start.
    poller: Mutex<Option<Poller>>,

    tasks: SegQueue<Task>,
    task_notifier: Notifier,
    reply_notifier: Notifier,
    commands: CommandPipe,
    replies: SpinLock<Vec<PendingReply>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A cheap, cloneable reference to an event loop, usable from any thread.
#[derive(Clone)]
pub struct LoopHandle {
    shared: Arc<Shared>,
}

/// An event loop and its thread.
///
/// Dropping an `EventLoop` quits it and waits for its thread, unless the
/// drop happens on that very thread.
pub struct EventLoop {
    handle: LoopHandle,
}

impl EventLoop {
    /// Builds a loop named `name` with default settings.
    pub fn new(name: impl Into<String>) -> Result<Self> {
        LoopBuilder::new().name(name).build()
    }

    pub(crate) fn with_config(config: LoopConfig) -> Result<Self> {
        let shared = Shared {
            id: NEXT_LOOP_ID.fetch_add(1, Ordering::Relaxed),
            state: Mutex::new(LoopState::Initializing),
            state_changed: Condvar::new(),
            running: AtomicBool::new(false),
            thread: Mutex::new(None),
            joined: AtomicBool::new(false),
            thread_id: OnceLock::new(),
            poller: Mutex::new(Some(Poller::new()?)),
            tasks: SegQueue::new(),
            task_notifier: Notifier::new()?,
            reply_notifier: Notifier::new()?,
            commands: CommandPipe::new()?,
            replies: SpinLock::new(Vec::new()),
            config,
        };

        Ok(Self {
            handle: LoopHandle {
                shared: Arc::new(shared),
            },
        })
    }

    /// A handle that outlives borrows of this loop.
    pub fn handle(&self) -> LoopHandle {
        self.handle.clone()
    }
}

impl Deref for EventLoop {
    type Target = LoopHandle;

    fn deref(&self) -> &LoopHandle {
        &self.handle
    }
}

impl Drop for EventLoop {
    fn drop(&mut self) {
        if self.is_in_loop_thread() {
            self.quit_loop();
            return;
        }

        if self.state() != LoopState::Initializing {
            self.quit_loop();
            if let Err(err) = self.wait_loop_end() {
                log::error!("event loop `{}` did not shut down: {err}", self.name());
            }
        }
    }
}

impl fmt::Debug for EventLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.handle.fmt(f)
    }
}

impl fmt::Debug for LoopHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoopHandle")
            .field("id", &self.id())
            .field("name", &self.name())
            .field("state", &self.state())
            .finish()
    }
}

impl PartialEq for LoopHandle {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }
}

impl Eq for LoopHandle {}

impl LoopHandle {
    /// The loop running on the calling thread, if any.
    pub fn current() -> Option<LoopHandle> {
        context::current_loop()
    }

    pub fn id(&self) -> usize {
        self.shared.id
    }

    pub fn name(&self) -> &str {
        &self.shared.config.name
    }

    pub fn state(&self) -> LoopState {
        *lock(&self.shared.state)
    }

    /// `true` when called from this loop's own thread.
    pub fn is_in_loop_thread(&self) -> bool {
        self.shared.thread_id.get() == Some(&thread::current().id())
    }

    /// Spawns the loop thread and blocks until it is ticking.
    ///
    /// Starting a running loop is a no-op; a stopped loop cannot restart.
    pub fn start(&self) -> Result<()> {
        let poller = lock(&self.shared.poller).take();

        if let Some(poller) = poller {
            let shared = self.shared.clone();
            let spawned = thread::Builder::new()
                .name(self.name().to_owned())
                .spawn(move || run_loop(LoopHandle { shared }, poller));

            match spawned {
                Ok(thread) => *lock(&self.shared.thread) = Some(thread),
                Err(err) => {
                    self.set_state(LoopState::Stopped);
                    return Err(err.into());
                }
            }
        }

        let mut state = lock(&self.shared.state);
        while *state == LoopState::Initializing {
            state = self
                .shared
                .state_changed
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }

        match *state {
            LoopState::Started => Ok(()),
            _ => Err(self.not_running()),
        }
    }

    /// Blocks until the loop thread has finished, then joins it.
    ///
    /// Returns at once for a loop that was never started. Fails with
    /// [`Error::InLoopThread`] when called from the loop itself.
    pub fn wait_loop_end(&self) -> Result<()> {
        if self.is_in_loop_thread() {
            return Err(Error::InLoopThread(self.name().to_owned()));
        }

        {
            let mut state = lock(&self.shared.state);
            if *state == LoopState::Initializing && lock(&self.shared.thread).is_none() {
                return Ok(());
            }

            while *state != LoopState::Stopped {
                state = self
                    .shared
                    .state_changed
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner);
            }
        }

        if !self.shared.joined.swap(true, Ordering::AcqRel) {
            let thread = lock(&self.shared.thread).take();
            if let Some(thread) = thread {
                if thread.join().is_err() {
                    log::error!("event loop `{}` thread panicked", self.name());
                }
            }
        }

        Ok(())
    }

    /// Asks the loop to stop after its current tick.
    pub fn quit_loop(&self) {
        if self.is_in_loop_thread() {
            context::with_local(|local| local.pump.quit());
            return;
        }

        if !self.shared.running.load(Ordering::Acquire) {
            return;
        }

        if let Err(err) = self.shared.commands.send(Command::Quit) {
            log::error!("failed to send quit to `{}`: {err}", self.name());
        }
    }

    /// Queues `task` to run on the loop thread.
    ///
    /// Tasks posted from one thread run in the order they were posted.
    #[track_caller]
    pub fn post_task<F>(&self, task: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.post(Task::new(task))
    }

    pub(crate) fn post(&self, task: Task) -> Result<()> {
        if !self.shared.running.load(Ordering::Acquire) {
            return Err(self.not_running());
        }

        if self.is_in_loop_thread() {
            let pushed = context::with_local(|local| local.nested.borrow_mut().push_back(task));
            return pushed.ok_or_else(|| self.not_running());
        }

        self.enqueue(task);
        Ok(())
    }

    /// Pushes a cross-thread task. A push that races with teardown is
    /// dropped here, since the loop will not drain its queue again.
    fn enqueue(&self, task: Task) {
        self.shared.tasks.push(task);

        if self.shared.running.load(Ordering::Acquire) {
            self.wake();
            return;
        }

        let mut dropped = 0;
        while self.shared.tasks.pop().is_some() {
            dropped += 1;
        }
        if dropped > 0 {
            log::debug!("event loop `{}` is stopping; dropped {dropped} late tasks", self.name());
        }
    }

    /// Runs `task` on the loop thread once `delay` has passed.
    ///
    /// The delay is measured from this call, whichever thread makes it.
    #[track_caller]
    pub fn post_delay_task<F>(&self, delay: Duration, task: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.add_timer(delay, task).map(|_| ())
    }

    /// Runs `task` here, then `reply` on the calling thread's loop (or on
    /// this loop when the caller is not on a loop thread).
    ///
    /// The reply runs exactly once, after the task has finished.
    #[track_caller]
    pub fn post_task_and_reply<T, R>(&self, task: T, reply: R) -> Result<()>
    where
        T: FnOnce() + Send + 'static,
        R: FnOnce() + Send + 'static,
    {
        let reply_loop = LoopHandle::current().unwrap_or_else(|| self.clone());
        self.post_task_and_reply_on(task, reply, &reply_loop)
    }

    /// Like [`post_task_and_reply`](Self::post_task_and_reply) with an
    /// explicit reply loop.
    #[track_caller]
    pub fn post_task_and_reply_on<T, R>(
        &self,
        task: T,
        reply: R,
        reply_loop: &LoopHandle,
    ) -> Result<()>
    where
        T: FnOnce() + Send + 'static,
        R: FnOnce() + Send + 'static,
    {
        let location = Location::caller();
        let holder = Arc::new(ReplyHolder::default());

        reply_loop.register_reply(PendingReply {
            holder: holder.clone(),
            reply: Task::with_location(reply, location),
        })?;

        let guard = ReplyGuard::new(holder, reply_loop.clone());
        self.post(Task::with_location(
            move || {
                let mut guard = guard;
                guard.arm();
                task();
            },
            location,
        ))
    }

    /// Fires `callback` once after `delay`.
    ///
    /// Callable from any thread: the id is returned at once, and an
    /// off-thread insertion is applied on the loop in posting order.
    #[track_caller]
    pub fn add_timer<F>(&self, delay: Duration, callback: F) -> Result<TimerId>
    where
        F: FnOnce() + Send + 'static,
    {
        let location = Location::caller();
        let mut callback = Some(callback);

        self.arm(
            delay,
            None,
            Box::new(move || {
                if let Some(callback) = callback.take() {
                    run_guarded(location, callback);
                }
            }),
        )
    }

    /// Fires `callback` every `interval`, each time measured from the end
    /// of the previous run.
    #[track_caller]
    pub fn add_repeating_timer<F>(&self, interval: Duration, mut callback: F) -> Result<TimerId>
    where
        F: FnMut() + Send + 'static,
    {
        let location = Location::caller();

        self.arm(
            interval,
            Some(interval),
            Box::new(move || run_guarded(location, &mut callback)),
        )
    }

    /// Cancels a timer. Unknown or already fired ids are ignored.
    pub fn remove_timer(&self, id: TimerId) -> Result<()> {
        if self.is_in_loop_thread() {
            context::with_local(|local| local.pump.remove_timer(id));
            return Ok(());
        }

        self.post_task(move || {
            context::with_local(|local| local.pump.remove_timer(id));
        })
    }

    /// Inserts a timer; off the loop thread the insertion is posted, and the
    /// time spent in the queue is taken off the first delay.
    fn arm(
        &self,
        delay: Duration,
        interval: Option<Duration>,
        callback: Box<dyn FnMut() + Send>,
    ) -> Result<TimerId> {
        let id = TimerId::next();

        if self.is_in_loop_thread() {
            context::with_local(|local| local.pump.add_timer(id, delay, interval, callback))
                .ok_or_else(|| self.not_running())?;
            return Ok(id);
        }

        let scheduled = Instant::now();
        self.post(Task::new(move || {
            let remaining = delay.saturating_sub(scheduled.elapsed());
            let callback: TimerCallback = callback;
            context::with_local(|local| local.pump.add_timer(id, remaining, interval, callback));
        }))?;

        Ok(id)
    }

    /// Registers `descriptor` with this loop's poller.
    ///
    /// Must be called on the loop thread.
    pub fn install_watched_descriptor(&self, descriptor: &WatchedDescriptor) -> Result<()> {
        self.ensure_in_loop_thread()?;

        if descriptor.is_installed() {
            return Err(Error::AlreadyInstalled(descriptor.fd()));
        }

        context::with_local(|local| local.pump.install(descriptor.inner()))
            .ok_or_else(|| self.not_running())??;

        Ok(())
    }

    /// Unregisters `descriptor`. Its callbacks stop firing immediately.
    ///
    /// Must be called on the loop thread.
    pub fn remove_watched_descriptor(&self, descriptor: &WatchedDescriptor) -> Result<()> {
        self.ensure_in_loop_thread()?;

        if !descriptor.inner().detach() {
            return Err(Error::NotInstalled(descriptor.fd()));
        }

        Ok(())
    }

    /// Wakes the loop if it may be blocked in a readiness wait.
    pub(crate) fn wake(&self) {
        if self.is_in_loop_thread() {
            return;
        }

        if let Err(err) = self.shared.task_notifier.notify() {
            log::error!("failed to wake `{}`: {err}", self.name());
        }
    }

    pub(crate) fn stack_size(&self) -> usize {
        self.shared.config.stack_size
    }

    pub(crate) fn max_parked(&self) -> usize {
        self.shared.config.max_parked
    }

    fn register_reply(&self, pending: PendingReply) -> Result<()> {
        if !self.shared.running.load(Ordering::Acquire) {
            return Err(self.not_running());
        }

        self.shared.replies.lock().push(pending);
        Ok(())
    }

    pub(crate) fn discard_reply(&self, holder: &Arc<ReplyHolder>) {
        let discarded = {
            let mut replies = self.shared.replies.lock();
            let index = replies
                .iter()
                .position(|pending| Arc::ptr_eq(&pending.holder, holder));
            index.map(|index| replies.swap_remove(index))
        };
        drop(discarded);
    }

    pub(crate) fn notify_reply(&self) {
        if let Err(err) = self.shared.reply_notifier.notify() {
            log::error!("failed to signal reply on `{}`: {err}", self.name());
        }
    }

    /// Runs every committed reply once, outside the spinlock.
    fn run_committed_replies(&self) {
        let committed: Vec<PendingReply> = {
            let mut replies = self.shared.replies.lock();
            let (committed, waiting) = std::mem::take(&mut *replies)
                .into_iter()
                .partition(|pending| pending.holder.is_committed());
            *replies = waiting;
            committed
        };

        for pending in committed {
            pending.reply.run();
        }
    }

    fn ensure_in_loop_thread(&self) -> Result<()> {
        if self.is_in_loop_thread() {
            Ok(())
        } else {
            Err(Error::NotInLoopThread(self.name().to_owned()))
        }
    }

    fn not_running(&self) -> Error {
        Error::NotRunning(self.name().to_owned())
    }

    fn set_state(&self, state: LoopState) {
        *lock(&self.shared.state) = state;
        self.shared.state_changed.notify_all();
    }
}

/// The process-wide loop hosting coroutines spawned off any loop.
///
/// Started on first use and never stopped.
pub(crate) fn background() -> Option<&'static LoopHandle> {
    static BACKGROUND: OnceLock<Option<EventLoop>> = OnceLock::new();

    BACKGROUND
        .get_or_init(|| {
            let started = EventLoop::new(BACKGROUND_LOOP_NAME).and_then(|event_loop| {
                event_loop.start()?;
                Ok(event_loop)
            });

            match started {
                Ok(event_loop) => Some(event_loop),
                Err(err) => {
                    log::error!("failed to start the background loop: {err}");
                    None
                }
            }
        })
        .as_ref()
        .map(|event_loop| &event_loop.handle)
}

/// Per-tick hooks the pump calls back into.
struct Scheduled<'a> {
    handle: &'a LoopHandle,
    local: &'a LoopLocal,
}

impl PumpDelegate for Scheduled<'_> {
    fn has_pending_work(&self) -> bool {
        !self.local.nested.borrow().is_empty()
            || runner::with_runner(|runner| runner.has_work()).unwrap_or(false)
    }

    fn run_scheduled_tasks(&self) {
        let nested = std::mem::take(&mut *self.local.nested.borrow_mut());
        for task in nested {
            task.run();
        }

        // Tasks posted while draining wait for the next tick.
        let queued = self.handle.shared.tasks.len();
        for _ in 0..queued {
            match self.handle.shared.tasks.pop() {
                Some(task) => task.run(),
                None => break,
            }
        }

        if self.local.reply_signalled.replace(false) {
            self.handle.run_committed_replies();
        }

        runner::with_runner(|runner| runner.sched());
    }
}

/// Body of a loop thread.
fn run_loop(handle: LoopHandle, poller: Poller) {
    let _ = handle.shared.thread_id.set(thread::current().id());

    let pump = EventPump::new(poller, handle.shared.config.max_poll_timeout);
    let local = Rc::new(LoopLocal::new(pump.clone()));
    context::enter(handle.clone(), local.clone());

    if let Err(err) = install_controls(&handle, &local) {
        log::error!("event loop `{}` failed to start: {err}", handle.name());
        context::leave();
        handle.set_state(LoopState::Stopped);
        return;
    }

    runner::install(handle.clone());

    handle.shared.running.store(true, Ordering::Release);
    handle.set_state(LoopState::Started);
    log::info!("event loop `{}` started", handle.name());

    pump.run(&Scheduled {
        handle: &handle,
        local: &local,
    });

    handle.shared.running.store(false, Ordering::Release);

    runner::uninstall();
    teardown(&handle, &local);
    context::leave();

    log::info!("event loop `{}` stopped", handle.name());
    handle.set_state(LoopState::Stopped);
}

fn install_controls(handle: &LoopHandle, local: &LoopLocal) -> Result<()> {
    let shared = &handle.shared;

    let tasks = WatchedDescriptor::borrowed(shared.task_notifier.fd());
    let notifier = handle.clone();
    tasks.set_read_callback(move || {
        notifier.shared.task_notifier.drain();
    });

    let replies = WatchedDescriptor::borrowed(shared.reply_notifier.fd());
    let notifier = handle.clone();
    replies.set_read_callback(move || {
        notifier.shared.reply_notifier.drain();
        context::with_local(|local| local.reply_signalled.set(true));
    });

    let commands = WatchedDescriptor::borrowed(shared.commands.fd());
    let receiver = handle.clone();
    commands.set_read_callback(move || {
        for command in receiver.shared.commands.receive() {
            match command {
                Command::Quit => {
                    log::debug!("event loop `{}` received quit", receiver.name());
                    context::with_local(|local| local.pump.quit());
                }
            }
        }
    });

    for descriptor in [tasks, replies, commands] {
        local.pump.install(descriptor.inner())?;
        local.controls.borrow_mut().push(descriptor);
    }

    Ok(())
}

/// Releases everything the loop still holds, on the loop thread.
fn teardown(handle: &LoopHandle, local: &LoopLocal) {
    let nested = std::mem::take(&mut *local.nested.borrow_mut());
    let mut dropped = nested.len();
    drop(nested);

    while handle.shared.tasks.pop().is_some() {
        dropped += 1;
    }

    if dropped > 0 {
        log::debug!("event loop `{}` dropped {dropped} pending tasks", handle.name());
    }

    let replies = std::mem::take(&mut *handle.shared.replies.lock());
    drop(replies);

    let timers = local.pump.timer_count();
    if timers > 0 {
        log::debug!("event loop `{}` cancelled {timers} timers", handle.name());
    }
    local.pump.clear_timers();
    local.controls.borrow_mut().clear();

    let watched = local.pump.descriptor_count();
    if watched > 0 {
        log::warn!(
            "event loop `{}` stopped with {watched} descriptors still installed",
            handle.name()
        );
    }
}
