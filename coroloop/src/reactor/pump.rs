use super::descriptor::DescriptorInner;
use super::event::Event;
use super::poller::Poller;
use super::timer::{TimerCallback, TimerId};
use super::wheel::TimerWheel;
use crate::utils::Slab;

use std::cell::{Cell, RefCell};
use std::io;
use std::rc::{Rc, Weak};
use std::time::{Duration, Instant};

/// Work the pump hands back to its owner once per tick.
pub(crate) trait PumpDelegate {
    /// `true` when queued work is waiting, so the next poll must not block.
    fn has_pending_work(&self) -> bool;

    /// Runs queued tasks, replies and the coroutine scheduler.
    fn run_scheduled_tasks(&self);
}

/// The single-threaded reactor of one event loop.
///
/// Each tick:
/// 1. waits for readiness, bounded by the nearest timer deadline and the
///    maximum poll timeout,
/// 2. dispatches ready descriptors,
/// 3. fires due timers,
/// 4. lets the delegate drain its task inboxes.
///
/// Nothing is borrowed while user callbacks run, so callbacks may freely
/// add or remove timers and descriptors.
pub(crate) struct EventPump {
    poller: RefCell<Poller>,
    wheel: RefCell<TimerWheel>,
    descriptors: RefCell<Slab<Weak<DescriptorInner>>>,
    quit: Cell<bool>,
    max_poll_timeout: Duration,
}

impl EventPump {
    pub(crate) fn new(poller: Poller, max_poll_timeout: Duration) -> Rc<Self> {
        Rc::new(Self {
            poller: RefCell::new(poller),
            wheel: RefCell::new(TimerWheel::new(Instant::now())),
            descriptors: RefCell::new(Slab::new(16)),
            quit: Cell::new(false),
            max_poll_timeout,
        })
    }

    /// Runs ticks until [`quit`](Self::quit) is called.
    pub(crate) fn run(&self, delegate: &dyn PumpDelegate) {
        let mut events = Vec::new();

        while !self.quit.get() {
            let timeout = if delegate.has_pending_work() {
                Duration::ZERO
            } else {
                self.wheel
                    .borrow()
                    .next_timeout(Instant::now())
                    .map_or(self.max_poll_timeout, |t| t.min(self.max_poll_timeout))
            };

            if let Err(err) = self.poller.borrow_mut().poll(&mut events, Some(timeout)) {
                log::error!("readiness poll failed: {err}");
            }

            for event in &events {
                self.dispatch(*event);
            }

            self.run_timers();

            delegate.run_scheduled_tasks();
        }
    }

    /// Stops the pump at the end of the current tick.
    pub(crate) fn quit(&self) {
        self.quit.set(true);
    }

    fn dispatch(&self, event: Event) {
        let target = self
            .descriptors
            .borrow()
            .get(event.token)
            .and_then(Weak::upgrade);

        if let Some(descriptor) = target {
            descriptor.handle(event.ready);
        }
    }

    fn run_timers(&self) {
        let expired = self.wheel.borrow_mut().poll_expired(Instant::now());

        for id in expired {
            let Some(mut callback) = self.wheel.borrow_mut().take_callback(id) else {
                continue;
            };

            callback();

            self.wheel.borrow_mut().rearm(id, Instant::now(), callback);
        }
    }

    pub(crate) fn add_timer(
        &self,
        id: TimerId,
        delay: Duration,
        interval: Option<Duration>,
        callback: TimerCallback,
    ) {
        log::trace!("timer {id:?} armed for {delay:?}");

        self.wheel
            .borrow_mut()
            .insert(id, Instant::now(), delay, interval, callback);
    }

    pub(crate) fn remove_timer(&self, id: TimerId) -> bool {
        self.wheel.borrow_mut().remove(id)
    }

    pub(crate) fn timer_count(&self) -> usize {
        self.wheel.borrow().len()
    }

    /// Drops every timer. Called when the loop winds down.
    pub(crate) fn clear_timers(&self) {
        let mut wheel = self.wheel.borrow_mut();
        wheel.clear();
    }

    /// Registers a descriptor with the poller.
    pub(crate) fn install(self: &Rc<Self>, descriptor: &Rc<DescriptorInner>) -> io::Result<()> {
        let token = self
            .descriptors
            .borrow_mut()
            .insert(Rc::downgrade(descriptor));

        let registered = self.poller.borrow().register(
            descriptor.fd(),
            token,
            descriptor.interest(),
            descriptor.edge(),
        );

        if let Err(err) = registered {
            self.descriptors.borrow_mut().remove(token);
            return Err(err);
        }

        descriptor.attach(token, Rc::downgrade(self));
        log::debug!("fd {} installed as token {token}", descriptor.fd());

        Ok(())
    }

    /// Pushes a changed interest mask to the poller.
    pub(crate) fn update(&self, token: usize, descriptor: &DescriptorInner) {
        let result = self.poller.borrow().reregister(
            descriptor.fd(),
            token,
            descriptor.interest(),
            descriptor.edge(),
        );

        if let Err(err) = result {
            log::error!("failed to update fd {}: {err}", descriptor.fd());
        }
    }

    /// Drops the registry slot and unregisters the fd.
    pub(crate) fn forget(&self, token: usize, fd: std::os::fd::RawFd) {
        self.descriptors.borrow_mut().remove(token);

        if let Err(err) = self.poller.borrow().deregister(fd) {
            log::error!("failed to deregister fd {fd}: {err}");
        }
        log::debug!("fd {fd} removed");
    }

    pub(crate) fn descriptor_count(&self) -> usize {
        self.descriptors.borrow().len()
    }
}
