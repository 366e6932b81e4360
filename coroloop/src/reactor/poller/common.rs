use super::platform::{sys_close, sys_eventfd, sys_read, sys_write};

use std::io;
use std::os::fd::RawFd;

bitflags::bitflags! {
    /// Readiness categories a watched descriptor can be interested in, and
    /// that the poller reports back.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct Ready: u8 {
        /// Data can be read, or the peer hung up and EOF can be read.
        const READABLE = 0b0001;
        /// The descriptor accepts writes.
        const WRITABLE = 0b0010;
        /// An error condition is pending on the descriptor.
        const ERROR = 0b0100;
        /// The peer closed its end of the connection.
        const CLOSED = 0b1000;
    }
}

/// Number of times a notifier retries a write interrupted by `EINTR`/`EAGAIN`.
const MAX_NOTIFY_RETRIES: usize = 3;

/// A cross-thread wake-up signal backed by an `eventfd`.
///
/// Any thread may call [`notify`](Self::notify); the loop thread watches
/// [`fd`](Self::fd) for readability and calls [`drain`](Self::drain) from its
/// read callback. Each loop owns two of them: one signalling queued tasks and
/// one signalling committed replies.
pub(crate) struct Notifier(RawFd);

unsafe impl Send for Notifier {}
unsafe impl Sync for Notifier {}

impl Notifier {
    /// Creates a non-blocking, close-on-exec `eventfd`.
    pub(crate) fn new() -> io::Result<Self> {
        sys_eventfd().map(Notifier)
    }

    /// The descriptor to register for readability.
    pub(crate) fn fd(&self) -> RawFd {
        self.0
    }

    /// Increments the eventfd counter, waking the loop.
    ///
    /// Interrupted or would-block writes are retried a few times before the
    /// error is returned to the caller.
    pub(crate) fn notify(&self) -> io::Result<()> {
        let buf = 1u64.to_ne_bytes();
        let mut retries = 0;

        loop {
            if sys_write(self.0, &buf) == buf.len() as isize {
                return Ok(());
            }

            let err = io::Error::last_os_error();
            let transient = matches!(
                err.kind(),
                io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock
            );

            if !transient || retries >= MAX_NOTIFY_RETRIES {
                return Err(err);
            }
            retries += 1;
        }
    }

    /// Resets the counter and returns how many notifications were pending.
    pub(crate) fn drain(&self) -> u64 {
        let mut buf = [0u8; 8];

        if sys_read(self.0, &mut buf) == buf.len() as isize {
            u64::from_ne_bytes(buf)
        } else {
            0
        }
    }
}

impl Drop for Notifier {
    fn drop(&mut self) {
        sys_close(self.0);
    }
}
