use crate::coroutine::{self, Resumer};
use crate::{Error, Result};

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// How a [`WaitGroup::wait`] ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WaitStatus {
    /// The counter reached zero.
    Done,
    /// The timeout fired first.
    TimedOut,
}

struct Inner {
    count: AtomicUsize,
    /// Coroutines suspended in `wait`, keyed by wait id. Whoever removes an
    /// entry owns the right to resume it.
    waiters: Mutex<HashMap<u64, Resumer>>,
    next_waiter: AtomicU64,
}

/// Waits for a set of operations to finish.
///
/// Work is counted with [`add`](Self::add) and [`done`](Self::done); a
/// coroutine calling [`wait`](Self::wait) is suspended until the count drops
/// to zero. A wait may carry a timeout: completion and timeout race to claim
/// the waiter, and the loser does nothing.
///
/// # Examples
///
/// ```rust,ignore
/// let group = WaitGroup::new();
/// for _ in 0..3 {
///     group.add(1);
///     let group = group.clone();
///     coroloop::go(move || {
///         /* work */
///         group.done();
///     });
/// }
/// group.wait(None)?;
/// ```
#[derive(Clone)]
pub struct WaitGroup {
    inner: Arc<Inner>,
}

impl WaitGroup {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                count: AtomicUsize::new(0),
                waiters: Mutex::new(HashMap::new()),
                next_waiter: AtomicU64::new(0),
            }),
        }
    }

    /// Adds `n` pending operations.
    pub fn add(&self, n: usize) {
        self.inner.count.fetch_add(n, Ordering::AcqRel);
    }

    /// Marks one operation finished, waking every waiter on the last one.
    ///
    /// Calling `done` more often than `add` is ignored.
    pub fn done(&self) {
        let previous = self
            .inner
            .count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| {
                count.checked_sub(1)
            });

        if previous == Ok(1) {
            let waiters: Vec<Resumer> = self
                .inner
                .waiters
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .drain()
                .map(|(_, resumer)| resumer)
                .collect();

            for resumer in waiters {
                resumer.resume();
            }
        }
    }

    /// Number of operations still pending.
    pub fn count(&self) -> usize {
        self.inner.count.load(Ordering::Acquire)
    }

    /// Suspends the calling coroutine until the count is zero or `timeout`
    /// passes.
    ///
    /// Fails with [`Error::NotYieldable`] outside a coroutine.
    pub fn wait(&self, timeout: Option<Duration>) -> Result<WaitStatus> {
        if self.count() == 0 {
            return Ok(WaitStatus::Done);
        }

        let resumer = coroutine::resumer().ok_or(Error::NotYieldable)?;
        let id = self.inner.next_waiter.fetch_add(1, Ordering::Relaxed);

        {
            let mut waiters = self
                .inner
                .waiters
                .lock()
                .unwrap_or_else(PoisonError::into_inner);

            if self.count() == 0 {
                return Ok(WaitStatus::Done);
            }
            waiters.insert(id, resumer.clone());
        }

        let timed_out = Arc::new(AtomicBool::new(false));
        let timer = match timeout {
            Some(timeout) => {
                let inner = self.inner.clone();
                let flag = timed_out.clone();
                let owner = resumer.owner().clone();

                let armed = owner.add_timer(timeout, move || {
                    let claimed = inner
                        .waiters
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .remove(&id);

                    if let Some(resumer) = claimed {
                        flag.store(true, Ordering::Release);
                        resumer.resume();
                    }
                });

                match armed {
                    Ok(timer) => Some((owner, timer)),
                    Err(err) => {
                        self.forget(id);
                        return Err(err);
                    }
                }
            }
            None => None,
        };

        coroutine::pause()?;

        if let Some((owner, timer)) = timer {
            let _ = owner.remove_timer(timer);
        }

        if timed_out.load(Ordering::Acquire) {
            Ok(WaitStatus::TimedOut)
        } else {
            Ok(WaitStatus::Done)
        }
    }

    fn forget(&self, id: u64) {
        self.inner
            .waiters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
    }
}

impl Default for WaitGroup {
    fn default() -> Self {
        Self::new()
    }
}
