use super::event_loop::EventLoop;
use crate::Result;
use crate::coroutine::stack::page_size;

use std::time::Duration;

/// Default usable stack size of a coroutine.
pub const DEFAULT_STACK_SIZE: usize = 256 * 1024;

/// Default bound on finished coroutines a runner keeps for reuse.
pub const MAX_PARKED_COROUTINES: usize = 500;

/// Default upper bound on a single readiness wait.
pub const MAX_POLL_TIMEOUT: Duration = Duration::from_millis(2000);

/// Construction-time settings of one event loop.
#[derive(Clone, Debug)]
pub(crate) struct LoopConfig {
    pub(crate) name: String,
    pub(crate) stack_size: usize,
    pub(crate) max_parked: usize,
    pub(crate) max_poll_timeout: Duration,
}

/// Builder for configuring and creating an event loop.
///
/// `LoopBuilder` customizes a loop before its thread exists. Every value
/// is fixed for the lifetime of the loop.
///
/// # Examples
///
/// ```rust,ignore
/// let event_loop = LoopBuilder::new()
///     .name("io")
///     .max_parked(64)
///     .build()?;
/// event_loop.start()?;
/// ```
pub struct LoopBuilder {
    config: LoopConfig,
}

impl LoopBuilder {
    /// Creates a new `LoopBuilder` with default configuration.
    ///
    /// Loops are named `coroloop` unless [`name`](Self::name) is called.
    pub fn new() -> Self {
        Self {
            config: LoopConfig {
                name: String::from("coroloop"),
                stack_size: DEFAULT_STACK_SIZE,
                max_parked: MAX_PARKED_COROUTINES,
                max_poll_timeout: MAX_POLL_TIMEOUT,
            },
        }
    }

    /// Sets the loop name, also used as its thread name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = name.into();
        self
    }

    /// Sets the stack size of coroutines created by this loop's runner.
    ///
    /// # Panics
    ///
    /// Panics if `size` is smaller than one memory page.
    pub fn stack_size(mut self, size: usize) -> Self {
        assert!(
            size >= page_size(),
            "stack_size must be at least one page ({} bytes)",
            page_size()
        );

        self.config.stack_size = size;
        self
    }

    /// Sets how many finished coroutines the runner keeps for reuse.
    ///
    /// Zero disables reuse: every coroutine is destroyed once idle.
    pub fn max_parked(mut self, count: usize) -> Self {
        self.config.max_parked = count;
        self
    }

    /// Caps how long one readiness wait may block.
    ///
    /// # Panics
    ///
    /// Panics if `timeout` is zero.
    pub fn max_poll_timeout(mut self, timeout: Duration) -> Self {
        assert!(!timeout.is_zero(), "max_poll_timeout must be > 0");

        self.config.max_poll_timeout = timeout;
        self
    }

    /// Builds the loop with the configured options.
    ///
    /// This allocates the poller and the wake-up descriptors; the thread is
    /// only spawned by [`start`](super::event_loop::LoopHandle::start).
    pub fn build(self) -> Result<EventLoop> {
        EventLoop::with_config(self.config)
    }
}

impl Default for LoopBuilder {
    /// Creates a default `LoopBuilder`.
    fn default() -> Self {
        Self::new()
    }
}
