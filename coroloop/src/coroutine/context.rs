use super::stack::Stack;
use crate::utils::fatal;

use libc::{getcontext, makecontext, swapcontext, ucontext_t};
use std::{mem, ptr};

/// Saved CPU state of one execution stack.
///
/// A context either runs on its own [`Stack`] from a fixed entry point,
/// or stands for the thread's native stack, in which case it is filled in
/// the first time control leaves it.
///
/// The `ucontext_t` is boxed: glibc stores a pointer into the structure
/// itself, so it must never move once captured.
pub(crate) struct ExecutionContext {
    uctx: Box<ucontext_t>,
    stack: Option<Stack>,
}

impl ExecutionContext {
    /// A placeholder for the calling thread's own stack.
    pub(crate) fn native() -> Self {
        Self {
            uctx: Box::new(unsafe { mem::zeroed() }),
            stack: None,
        }
    }

    /// A context that starts at `entry` on a fresh stack of `stack_size`
    /// bytes the first time it is transferred to.
    ///
    /// `entry` must never return: there is no successor context.
    pub(crate) fn new(entry: extern "C" fn(), stack_size: usize) -> Self {
        let stack = Stack::new(stack_size);
        let mut uctx: Box<ucontext_t> = Box::new(unsafe { mem::zeroed() });

        if unsafe { getcontext(&mut *uctx) } != 0 {
            fatal("getcontext failed");
        }

        uctx.uc_stack.ss_sp = stack.bottom();
        uctx.uc_stack.ss_size = stack.size();
        uctx.uc_stack.ss_flags = 0;
        uctx.uc_link = ptr::null_mut();

        unsafe { makecontext(&mut *uctx, entry, 0) };

        Self {
            uctx,
            stack: Some(stack),
        }
    }

    pub(crate) fn is_native(&self) -> bool {
        self.stack.is_none()
    }

    /// Saves the current CPU state into `from` and resumes `to`.
    ///
    /// Returns when some other context transfers back to `from`.
    ///
    /// # Safety
    ///
    /// `from` must describe the stack currently executing, `to` must be a
    /// context created on this thread, and neither may be freed while
    /// suspended.
    pub(crate) unsafe fn transfer(from: *mut ExecutionContext, to: *const ExecutionContext) {
        let rc = unsafe { swapcontext(&mut *(*from).uctx, &*(*to).uctx) };
        if rc != 0 {
            fatal("swapcontext failed");
        }
    }
}
