//! Event-fd pair used by one ring pair to signal work in each direction.
//!
//! `enq_fd` is written by the bridge (producer) to wake the client; `deq_fd`
//! is written by the client (producer from the bridge's perspective as
//! consumer) to wake the bridge's dequeue node. Both are level-triggered:
//! a non-zero counter means "work pending," and reading resets the counter
//! to zero, per `eventfd(2)` semantics.

use std::os::fd::{AsRawFd, BorrowedFd, RawFd};

use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use vmm_sys_util::eventfd::EventFd as RawEventFd;

/// A single non-blocking event-fd.
pub struct EventFd(RawEventFd);

impl EventFd {
    /// Create a new non-blocking event-fd with an initial counter of zero.
    pub fn new() -> std::io::Result<Self> {
        let fd = RawEventFd::new(libc::EFD_NONBLOCK).map_err(std::io::Error::other)?;
        Ok(Self(fd))
    }

    /// Signal the fd (write `1` to the counter). Used at a batch boundary,
    /// not per descriptor, so the client takes one wakeup per batch rather
    /// than one syscall per packet.
    pub fn signal(&self) {
        // A full counter (EAGAIN) means a wakeup is already pending; folding
        // multiple signals into one pending wakeup is correct for a
        // level-triggered notification.
        let _ = self.0.write(1);
    }

    /// Drain the counter back to zero. Call after fully consuming a ring,
    /// never before, to avoid losing a wakeup for work that arrived between
    /// the last read and the drain.
    pub fn drain(&self) {
        let _ = self.0.read();
    }

    /// Non-blocking readiness check: `true` if the counter is currently
    /// non-zero (there is a pending wakeup).
    #[must_use]
    pub fn is_ready(&self) -> bool {
        // SAFETY: the fd is owned by `self.0` for the duration of this call.
        let borrowed = unsafe { BorrowedFd::borrow_raw(self.0.as_raw_fd()) };
        let mut fds = [PollFd::new(borrowed, PollFlags::POLLIN)];
        matches!(poll(&mut fds, PollTimeout::ZERO), Ok(n) if n > 0)
    }

    /// The raw fd, for passing to the client via `SCM_RIGHTS`.
    #[must_use]
    pub fn as_raw_fd(&self) -> RawFd {
        self.0.as_raw_fd()
    }
}

impl std::fmt::Debug for EventFd {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("EventFd").field(&self.0.as_raw_fd()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signal_then_is_ready_then_drain_clears() {
        let efd = EventFd::new().unwrap();
        assert!(!efd.is_ready());
        efd.signal();
        assert!(efd.is_ready());
        efd.drain();
        assert!(!efd.is_ready());
    }

    #[test]
    fn multiple_signals_collapse_to_one_pending_wakeup() {
        let efd = EventFd::new().unwrap();
        efd.signal();
        efd.signal();
        efd.signal();
        assert!(efd.is_ready());
        efd.drain();
        assert!(!efd.is_ready());
    }
}
