use super::arena::CoroHandle;
use super::runner::Runner;
use crate::runtime::event_loop::LoopHandle;

use std::fmt;

/// A callable that resumes one suspension of one coroutine.
///
/// Resumers are cheap to clone and may be invoked from any thread; the
/// actual switch always happens on the coroutine's own loop thread.
///
/// A resumer is only good for the next pause after it was taken. Any
/// resume in between makes it stale, including the ones inside
/// [`sleep`](crate::time::sleep) and
/// [`WaitGroup::wait`](crate::sync::WaitGroup::wait), and so does the end
/// of the task that took it. Only the first resume of a given suspension
/// has an effect; stale resumes are ignored.
#[derive(Clone)]
pub struct Resumer {
    owner: LoopHandle,
    handle: CoroHandle,
}

impl Resumer {
    pub(crate) fn new(owner: LoopHandle, handle: CoroHandle) -> Self {
        Self { owner, handle }
    }

    /// The loop the coroutine belongs to.
    pub fn owner(&self) -> &LoopHandle {
        &self.owner
    }

    /// Requests the coroutine to continue after its current pause.
    pub fn resume(&self) {
        Runner::resume_or_post(&self.owner, self.handle);
    }
}

impl fmt::Debug for Resumer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resumer")
            .field("loop", &self.owner.name())
            .field("slot", &self.handle.index)
            .field("generation", &self.handle.generation)
            .finish()
    }
}
