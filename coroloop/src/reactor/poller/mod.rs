//! Platform-specific I/O poller abstraction.
//!
//! This module provides the readiness primitive used by the event pump.
//!
//! The poller is used by the pump to:
//! - wait for I/O readiness events,
//! - bound that wait by the nearest timer deadline,
//! - report readiness as a [`Ready`] mask per registered token.
//!
//! Cross-thread wake-ups are ordinary descriptors ([`Notifier`] eventfds
//! and the command pipe) registered like any other.

pub(crate) mod common;

pub use common::Ready;
pub(crate) use common::Notifier;

#[cfg(target_os = "linux")]
mod epoll;

#[cfg(target_os = "linux")]
pub(crate) type Poller = epoll::EpollPoller;

#[cfg(unix)]
pub(crate) mod unix;

#[cfg(unix)]
pub(crate) use unix as platform;
