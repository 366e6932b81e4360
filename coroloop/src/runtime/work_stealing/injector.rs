use crate::runtime::task::Task;

use crossbeam::queue::SegQueue;
use std::sync::LazyLock;

/// Process-wide queue every runner steals from.
static GLOBAL: LazyLock<Injector> = LazyLock::new(Injector::new);

/// Global task injector for the work-stealing scheduler.
///
/// Tasks spawned with [`go`](crate::coroutine::go) land here and are
/// picked up by whichever runner gets to them first. The queue is
/// lock-free, and each pop hands a task to exactly one caller.
pub(crate) struct Injector {
    /// Queue holding globally injected tasks.
    queue: SegQueue<Task>,
}

impl Injector {
    /// Creates a new empty injector.
    pub(crate) fn new() -> Self {
        Injector {
            queue: SegQueue::new(),
        }
    }

    /// The process-wide injector.
    pub(crate) fn global() -> &'static Injector {
        &GLOBAL
    }

    /// Pushes a new task into the injector.
    pub(crate) fn push(&self, task: Task) {
        self.queue.push(task);
    }

    /// Steals a task from the injector.
    ///
    /// Tasks are taken in FIFO order.
    /// Returns `None` if no tasks are available.
    pub(crate) fn steal(&self) -> Option<Task> {
        self.queue.pop()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}
