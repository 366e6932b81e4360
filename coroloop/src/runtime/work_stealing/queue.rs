use crate::runtime::task::Task;

use std::cell::RefCell;
use std::collections::VecDeque;

/// A per-runner local task queue.
///
/// `LocalQueue` stores tasks with affinity to one loop, submitted through
/// [`go_on`](crate::coroutine::go_on). It is only touched by its runner's
/// thread, and tasks run in submission order.
pub(crate) struct LocalQueue {
    inner: RefCell<VecDeque<Task>>,
}

impl LocalQueue {
    /// Creates an empty local task queue.
    pub(crate) fn new() -> Self {
        Self {
            inner: RefCell::new(VecDeque::new()),
        }
    }

    /// Pushes a task to the back of the queue.
    pub(crate) fn push(&self, task: Task) {
        self.inner.borrow_mut().push_back(task);
    }

    /// Pops the oldest task.
    pub(crate) fn pop(&self) -> Option<Task> {
        self.inner.borrow_mut().pop_front()
    }

    pub(crate) fn len(&self) -> usize {
        self.inner.borrow().len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.inner.borrow().is_empty()
    }

    /// Drops every queued task.
    pub(crate) fn clear(&self) {
        let dropped = std::mem::take(&mut *self.inner.borrow_mut());
        drop(dropped);
    }
}
