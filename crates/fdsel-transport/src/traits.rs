use std::os::fd::RawFd;

use crate::interest::Interest;

/// Something a selector can poll.
///
/// The selector only reads the descriptor and interest set, and writes the
/// readiness it observed. Ownership of the descriptor always stays with the
/// implementor.
///
/// Implemented by [`FdHandle`](crate::FdHandle) and
/// [`UnixSocket`](crate::UnixSocket). Application types usually implement it
/// by delegating to a handle they own.
pub trait Selectable {
    /// The polled descriptor, or `-1` when the handle is empty.
    ///
    /// A negative descriptor is skipped by the selector.
    fn raw_fd(&self) -> RawFd;

    /// Current interest set.
    fn interest(&self) -> Interest;

    /// Replace the interest set. Takes effect on the next poll.
    fn set_interest(&mut self, interest: Interest);

    /// Readiness observed by the most recent poll that covered this handle.
    ///
    /// Empty until the handle has been through at least one poll.
    fn readiness(&self) -> Interest;

    /// Publish readiness. Called by the selector only.
    fn set_readiness(&mut self, readiness: Interest);

    fn is_readable(&self) -> bool {
        self.readiness().contains(Interest::READ)
    }

    fn is_writable(&self) -> bool {
        self.readiness().contains(Interest::WRITE)
    }

    /// A pending connect has resolved. Check
    /// [`UnixSocket::is_connected`](crate::UnixSocket::is_connected) to learn
    /// whether it succeeded.
    fn is_connectable(&self) -> bool {
        self.readiness().contains(Interest::CONNECT)
    }

    fn is_acceptable(&self) -> bool {
        self.readiness().contains(Interest::ACCEPT)
    }
}

impl<T: Selectable + ?Sized> Selectable for Box<T> {
    fn raw_fd(&self) -> RawFd {
        (**self).raw_fd()
    }

    fn interest(&self) -> Interest {
        (**self).interest()
    }

    fn set_interest(&mut self, interest: Interest) {
        (**self).set_interest(interest)
    }

    fn readiness(&self) -> Interest {
        (**self).readiness()
    }

    fn set_readiness(&mut self, readiness: Interest) {
        (**self).set_readiness(readiness)
    }
}
