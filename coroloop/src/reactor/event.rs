use super::poller::Ready;

/// An I/O event reported by the poller.
///
/// An `Event` represents readiness information for a registered
/// file descriptor. It is produced by the poller and consumed
/// by the pump to invoke the matching descriptor callbacks.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Event {
    /// Token associated with the registered file descriptor.
    ///
    /// This token is the descriptor's slot in the pump's registry.
    pub(crate) token: usize,

    /// Readiness categories reported for the descriptor.
    pub(crate) ready: Ready,
}
