//! Linux `epoll`-based poller implementation.
//!
//! This module provides the readiness backend of the event pump.
//!
//! Responsibilities:
//! - Register file descriptors with a readiness interest and a token
//! - Block waiting for I/O readiness, bounded by the timer deadline
//! - Translate raw `epoll` bits into the four [`Ready`] categories
//!
//! Every registration also asks for `EPOLLRDHUP` so that a peer closing
//! its half of a connection is reported as [`Ready::CLOSED`].

use super::common::Ready;
use crate::reactor::event::Event;

use libc::{
    EPOLL_CLOEXEC, EPOLL_CTL_ADD, EPOLL_CTL_DEL, EPOLL_CTL_MOD, EPOLLERR, EPOLLET, EPOLLHUP,
    EPOLLIN, EPOLLOUT, EPOLLRDHUP, epoll_create1, epoll_ctl, epoll_event, epoll_wait,
};
use std::io;
use std::os::unix::io::RawFd;
use std::time::Duration;

/// Initial size of the kernel event buffer; it doubles when filled.
const INITIAL_EVENTS: usize = 64;

/// Linux `epoll` poller.
///
/// This poller owns:
/// - an `epoll` instance,
/// - a reusable event buffer.
///
/// It is created by whichever thread builds the loop and then moved into
/// the loop thread, where it is used exclusively.
pub(crate) struct EpollPoller {
    /// Epoll file descriptor.
    epoll: RawFd,

    /// Reusable buffer for epoll events.
    events: Vec<epoll_event>,
}

unsafe impl Send for EpollPoller {}

impl EpollPoller {
    /// Create a new `EpollPoller`.
    pub(crate) fn new() -> io::Result<Self> {
        let epoll = unsafe { epoll_create1(EPOLL_CLOEXEC) };
        if epoll < 0 {
            return Err(io::Error::last_os_error());
        }

        Ok(Self {
            epoll,
            events: Vec::with_capacity(INITIAL_EVENTS),
        })
    }

    /// Register a file descriptor with the poller.
    pub(crate) fn register(
        &self,
        fd: RawFd,
        token: usize,
        interest: Ready,
        edge: bool,
    ) -> io::Result<()> {
        self.control(EPOLL_CTL_ADD, fd, token, interest, edge)
    }

    /// Update interest flags for an already registered descriptor.
    pub(crate) fn reregister(
        &self,
        fd: RawFd,
        token: usize,
        interest: Ready,
        edge: bool,
    ) -> io::Result<()> {
        self.control(EPOLL_CTL_MOD, fd, token, interest, edge)
    }

    /// Remove a file descriptor from the poller.
    pub(crate) fn deregister(&self, fd: RawFd) -> io::Result<()> {
        let rc = unsafe { epoll_ctl(self.epoll, EPOLL_CTL_DEL, fd, std::ptr::null_mut()) };
        if rc < 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(())
        }
    }

    fn control(
        &self,
        op: i32,
        fd: RawFd,
        token: usize,
        interest: Ready,
        edge: bool,
    ) -> io::Result<()> {
        let mut flags = EPOLLRDHUP;

        if interest.contains(Ready::READABLE) {
            flags |= EPOLLIN;
        }
        if interest.contains(Ready::WRITABLE) {
            flags |= EPOLLOUT;
        }
        if edge {
            flags |= EPOLLET;
        }

        let mut event = epoll_event {
            events: flags as u32,
            u64: token as u64,
        };

        let rc = unsafe { epoll_ctl(self.epoll, op, fd, &mut event) };
        if rc < 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(())
        }
    }

    /// Poll for I/O readiness events.
    ///
    /// Blocks until:
    /// - at least one file descriptor becomes ready,
    /// - or the optional timeout expires.
    ///
    /// An interrupted wait returns with no events.
    pub(crate) fn poll(
        &mut self,
        events: &mut Vec<Event>,
        timeout: Option<Duration>,
    ) -> io::Result<()> {
        // Round up so a sub-millisecond deadline does not turn into a spin.
        let timeout_ms = timeout
            .map(|t| t.as_nanos().div_ceil(1_000_000).min(i32::MAX as u128) as i32)
            .unwrap_or(-1);

        events.clear();

        let n = unsafe {
            epoll_wait(
                self.epoll,
                self.events.as_mut_ptr(),
                self.events.capacity() as i32,
                timeout_ms,
            )
        };

        if n < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                return Ok(());
            }
            return Err(err);
        }

        unsafe {
            self.events.set_len(n as usize);
        }

        for ev in &self.events {
            events.push(Event {
                token: ev.u64 as usize,
                ready: translate(ev.events),
            });
        }

        if self.events.len() == self.events.capacity() {
            self.events.reserve(self.events.capacity());
        }
        self.events.clear();

        Ok(())
    }
}

/// Maps raw `epoll` bits onto readiness categories.
fn translate(bits: u32) -> Ready {
    let mut ready = Ready::empty();

    if bits & EPOLLERR as u32 != 0 {
        ready |= Ready::ERROR;
    }
    if bits & (EPOLLIN | EPOLLHUP) as u32 != 0 {
        ready |= Ready::READABLE;
    }
    if bits & EPOLLOUT as u32 != 0 {
        ready |= Ready::WRITABLE;
    }
    if bits & EPOLLRDHUP as u32 != 0 {
        ready |= Ready::CLOSED;
    }

    ready
}

impl Drop for EpollPoller {
    fn drop(&mut self) {
        unsafe { libc::close(self.epoll) };
    }
}
