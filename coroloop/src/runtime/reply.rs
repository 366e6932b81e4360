use super::event_loop::LoopHandle;
use super::task::Task;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Completion flag shared between a posted task and its reply.
#[derive(Debug, Default)]
pub(crate) struct ReplyHolder {
    committed: AtomicBool,
}

impl ReplyHolder {
    pub(crate) fn commit(&self) {
        self.committed.store(true, Ordering::Release);
    }

    pub(crate) fn is_committed(&self) -> bool {
        self.committed.load(Ordering::Acquire)
    }
}

/// A reply waiting on its loop for the task side to commit.
pub(crate) struct PendingReply {
    pub(crate) holder: Arc<ReplyHolder>,
    pub(crate) reply: Task,
}

/// Travels with the posted task.
///
/// Armed when the task starts, it commits on drop, so the reply still runs
/// when the task panics. Dropped unarmed, because the task was discarded
/// without running, it withdraws the reply from its loop instead.
pub(crate) struct ReplyGuard {
    holder: Arc<ReplyHolder>,
    reply_loop: LoopHandle,
    armed: bool,
}

impl ReplyGuard {
    pub(crate) fn new(holder: Arc<ReplyHolder>, reply_loop: LoopHandle) -> Self {
        Self {
            holder,
            reply_loop,
            armed: false,
        }
    }

    pub(crate) fn arm(&mut self) {
        self.armed = true;
    }
}

impl Drop for ReplyGuard {
    fn drop(&mut self) {
        if self.armed {
            self.holder.commit();
            self.reply_loop.notify_reply();
        } else {
            self.reply_loop.discard_reply(&self.holder);
        }
    }
}
