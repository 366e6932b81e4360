//! Watched descriptors.
//!
//! A [`WatchedDescriptor`] is one file descriptor plugged into a loop's
//! readiness poller, together with the interest mask and the callbacks run
//! when it becomes ready. The higher-level object that created it owns it;
//! the pump only keeps a weak, token-indexed reference, so dropping the
//! descriptor is enough to unregister it.
//!
//! Descriptors live on the loop thread and are deliberately `!Send`.

use super::poller::Ready;
use super::poller::platform::sys_close;
use super::pump::EventPump;

use std::cell::{Cell, RefCell};
use std::fmt;
use std::os::fd::{IntoRawFd, OwnedFd, RawFd};
use std::rc::{Rc, Weak};

type Callback = Box<dyn FnMut()>;

pub(crate) struct DescriptorInner {
    fd: RawFd,
    owns_fd: bool,
    interest: Cell<Ready>,
    edge: Cell<bool>,
    /// Slot in the pump registry while installed.
    token: Cell<Option<usize>>,
    pump: RefCell<Weak<EventPump>>,
    on_read: RefCell<Option<Callback>>,
    on_write: RefCell<Option<Callback>>,
    on_error: RefCell<Option<Callback>>,
    on_close: RefCell<Option<Callback>>,
}

/// A file descriptor monitored by an event loop.
///
/// Readiness is level-triggered unless [`set_edge_triggered`] is enabled.
/// Callbacks run on the loop thread in the order close, error, read,
/// write; a callback that removes the descriptor stops the remaining ones.
///
/// [`set_edge_triggered`]: WatchedDescriptor::set_edge_triggered
pub struct WatchedDescriptor {
    inner: Rc<DescriptorInner>,
}

impl WatchedDescriptor {
    /// Watches `fd` and closes it when the descriptor is dropped.
    ///
    /// The descriptor starts with read interest enabled.
    pub fn new(fd: OwnedFd) -> Self {
        Self::with_ownership(fd.into_raw_fd(), true)
    }

    /// Watches a descriptor owned by someone else; it is never closed here.
    pub fn borrowed(fd: RawFd) -> Self {
        Self::with_ownership(fd, false)
    }

    fn with_ownership(fd: RawFd, owns_fd: bool) -> Self {
        Self {
            inner: Rc::new(DescriptorInner {
                fd,
                owns_fd,
                interest: Cell::new(Ready::READABLE),
                edge: Cell::new(false),
                token: Cell::new(None),
                pump: RefCell::new(Weak::new()),
                on_read: RefCell::new(None),
                on_write: RefCell::new(None),
                on_error: RefCell::new(None),
                on_close: RefCell::new(None),
            }),
        }
    }

    pub fn fd(&self) -> RawFd {
        self.inner.fd
    }

    /// Current interest mask (only [`Ready::READABLE`] and [`Ready::WRITABLE`]
    /// are meaningful; errors and hang-ups are always reported).
    pub fn interest(&self) -> Ready {
        self.inner.interest.get()
    }

    pub fn is_installed(&self) -> bool {
        self.inner.token.get().is_some()
    }

    pub fn is_reading(&self) -> bool {
        self.interest().contains(Ready::READABLE)
    }

    pub fn is_writing(&self) -> bool {
        self.interest().contains(Ready::WRITABLE)
    }

    pub fn set_read_callback<F: FnMut() + 'static>(&self, callback: F) {
        *self.inner.on_read.borrow_mut() = Some(Box::new(callback));
    }

    pub fn set_write_callback<F: FnMut() + 'static>(&self, callback: F) {
        *self.inner.on_write.borrow_mut() = Some(Box::new(callback));
    }

    pub fn set_error_callback<F: FnMut() + 'static>(&self, callback: F) {
        *self.inner.on_error.borrow_mut() = Some(Box::new(callback));
    }

    pub fn set_close_callback<F: FnMut() + 'static>(&self, callback: F) {
        *self.inner.on_close.borrow_mut() = Some(Box::new(callback));
    }

    /// Drops every callback, breaking cycles through captured state.
    pub fn reset_callbacks(&self) {
        self.inner.on_read.borrow_mut().take();
        self.inner.on_write.borrow_mut().take();
        self.inner.on_error.borrow_mut().take();
        self.inner.on_close.borrow_mut().take();
    }

    /// Switches between edge- and level-triggered readiness.
    pub fn set_edge_triggered(&self, edge: bool) {
        self.inner.edge.set(edge);
        self.inner.update();
    }

    pub fn enable_reading(&self) {
        self.set_interest(self.interest() | Ready::READABLE);
    }

    pub fn disable_reading(&self) {
        self.set_interest(self.interest() - Ready::READABLE);
    }

    pub fn enable_writing(&self) {
        self.set_interest(self.interest() | Ready::WRITABLE);
    }

    pub fn disable_writing(&self) {
        self.set_interest(self.interest() - Ready::WRITABLE);
    }

    pub fn disable_all(&self) {
        self.set_interest(Ready::empty());
    }

    fn set_interest(&self, interest: Ready) {
        if self.inner.interest.replace(interest) != interest {
            self.inner.update();
        }
    }

    pub(crate) fn inner(&self) -> &Rc<DescriptorInner> {
        &self.inner
    }
}

impl fmt::Debug for WatchedDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchedDescriptor")
            .field("fd", &self.inner.fd)
            .field("interest", &self.inner.interest.get())
            .field("installed", &self.is_installed())
            .finish()
    }
}

impl Drop for WatchedDescriptor {
    fn drop(&mut self) {
        self.inner.detach();
    }
}

impl DescriptorInner {
    pub(crate) fn fd(&self) -> RawFd {
        self.fd
    }

    pub(crate) fn interest(&self) -> Ready {
        self.interest.get()
    }

    pub(crate) fn edge(&self) -> bool {
        self.edge.get()
    }

    pub(crate) fn token(&self) -> Option<usize> {
        self.token.get()
    }

    /// Records the registry slot and owning pump after installation.
    pub(crate) fn attach(&self, token: usize, pump: Weak<EventPump>) {
        self.token.set(Some(token));
        *self.pump.borrow_mut() = pump;
    }

    /// Unregisters from the pump, if installed. Returns `true` when it was.
    pub(crate) fn detach(&self) -> bool {
        let Some(token) = self.token.take() else {
            return false;
        };

        let pump = std::mem::take(&mut *self.pump.borrow_mut());
        if let Some(pump) = pump.upgrade() {
            pump.forget(token, self.fd);
        }

        true
    }

    fn update(&self) {
        let Some(token) = self.token.get() else {
            return;
        };

        if let Some(pump) = self.pump.borrow().upgrade() {
            pump.update(token, self);
        }
    }

    /// Runs the callbacks matching `ready`.
    pub(crate) fn handle(&self, ready: Ready) {
        log::trace!("fd {} ready: {:?}", self.fd, ready);

        let slots = [
            (Ready::CLOSED, &self.on_close),
            (Ready::ERROR, &self.on_error),
            (Ready::READABLE, &self.on_read),
            (Ready::WRITABLE, &self.on_write),
        ];

        for (flag, slot) in slots {
            if !ready.contains(flag) {
                continue;
            }

            if self.token.get().is_none() {
                return;
            }

            invoke(slot);
        }
    }
}

/// Calls the callback in `slot` without holding the borrow, then puts it
/// back unless the callback installed a replacement.
fn invoke(slot: &RefCell<Option<Callback>>) {
    let Some(mut callback) = slot.borrow_mut().take() else {
        return;
    };

    callback();

    let mut slot = slot.borrow_mut();
    if slot.is_none() {
        *slot = Some(callback);
    }
}

impl Drop for DescriptorInner {
    fn drop(&mut self) {
        if self.owns_fd {
            sys_close(self.fd);
        }
    }
}
