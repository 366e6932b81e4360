use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Identifier of a timer registered on an event loop.
///
/// Ids come from a process-wide counter and are never reused, so removing
/// a timer that already fired (or was never added to this loop) is a no-op.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

static NEXT_TIMER_ID: AtomicU64 = AtomicU64::new(1);

impl TimerId {
    pub(crate) fn next() -> Self {
        TimerId(NEXT_TIMER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Callback invoked when a timer fires. Repeating timers call it again.
pub(crate) type TimerCallback = Box<dyn FnMut()>;

/// An entry in the timer wheel.
///
/// `when` is expressed in wheel ticks (milliseconds since the wheel was
/// created). The callback is taken out while it runs, so an entry with no
/// callback is a repeating timer currently being invoked.
pub(crate) struct TimerEntry {
    /// Tick at which the timer fires.
    pub(crate) when: u64,

    /// Re-arm interval for repeating timers.
    pub(crate) interval: Option<Duration>,

    /// The user callback.
    pub(crate) callback: Option<TimerCallback>,
}
