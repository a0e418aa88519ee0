use std::io;
use std::time::Duration;

use fdsel_transport::{Interest, Selectable};
use tracing::{debug, trace};

use crate::error::{Result, SelectorError};
use crate::token::{Handles, Token};

/// Readiness selector built on `poll(2)`.
///
/// Holds tokens, not handles. Registration order is the order handles are
/// handed to the OS and the order of [`selected`](Selector::selected); no
/// fairness beyond that is promised.
///
/// `poll` takes `&mut self`, so one selector can never be polled from two
/// places at once. Run one selector per thread, each over its own handles.
#[derive(Debug, Default)]
pub struct Selector {
    registered: Vec<Token>,
    selected: Vec<Token>,
}

impl Selector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start watching `token` for `interest`.
    ///
    /// Sets the handle's interest and clears its readiness.
    pub fn register<A>(&mut self, handles: &mut A, token: Token, interest: Interest) -> Result<()>
    where
        A: Handles + ?Sized,
    {
        if self.is_registered(token) {
            return Err(SelectorError::DuplicateRegistration(token));
        }
        let handle = handles
            .handle_mut(token)
            .ok_or(SelectorError::UnknownHandle(token))?;
        handle.set_interest(interest);
        handle.set_readiness(Interest::empty());
        self.registered.push(token);
        debug!(?token, fd = handle.raw_fd(), ?interest, "registered handle");
        Ok(())
    }

    /// Replace the interest of a registered handle; effective on the next
    /// poll.
    ///
    /// Returns `false` and changes nothing if `token` is not registered or has
    /// no handle.
    pub fn update_interest<A>(&mut self, handles: &mut A, token: Token, interest: Interest) -> bool
    where
        A: Handles + ?Sized,
    {
        if !self.is_registered(token) {
            return false;
        }
        match handles.handle_mut(token) {
            Some(handle) => {
                handle.set_interest(interest);
                trace!(?token, ?interest, "updated interest");
                true
            }
            None => false,
        }
    }

    /// Stop watching `token`. Returns whether it was registered.
    ///
    /// The token is also dropped from the current [`selected`](Selector::selected)
    /// snapshot. The handle keeps whatever readiness it last saw.
    pub fn unregister(&mut self, token: Token) -> bool {
        let before = self.registered.len();
        self.registered.retain(|t| *t != token);
        self.selected.retain(|t| *t != token);
        let removed = self.registered.len() != before;
        if removed {
            debug!(?token, "unregistered handle");
        }
        removed
    }

    pub fn is_registered(&self, token: Token) -> bool {
        self.registered.contains(&token)
    }

    /// Registered tokens in registration order.
    pub fn registered(&self) -> &[Token] {
        &self.registered
    }

    pub fn len(&self) -> usize {
        self.registered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registered.is_empty()
    }

    /// Tokens found ready by the last successful poll. Valid until the next
    /// poll; copy it (`to_vec()`) to register or unregister while iterating.
    pub fn selected(&self) -> &[Token] {
        &self.selected
    }

    /// Wait until a registered handle is ready or `timeout` elapses.
    ///
    /// - `None` waits indefinitely.
    /// - `Some(Duration::ZERO)` checks once and returns immediately.
    /// - `Some(d)` waits up to `d`, rounded up to whole milliseconds.
    ///
    /// Returns the number of ready handles, `0` on timeout. On success every
    /// registered handle's readiness is replaced by what this poll observed
    /// (empty when nothing), and [`selected`](Selector::selected) lists
    /// exactly the handles with non-empty readiness. On failure, including
    /// `EINTR`, nothing is changed.
    ///
    /// Hang-up and error conditions mark both the read side and the write
    /// side of the interest ready, so the next operation on the handle
    /// surfaces the condition.
    pub fn poll<A>(&mut self, handles: &mut A, timeout: Option<Duration>) -> Result<usize>
    where
        A: Handles + ?Sized,
    {
        let mut polled = Vec::with_capacity(self.registered.len());
        let mut pollfds = Vec::with_capacity(self.registered.len());

        for &token in &self.registered {
            let Some(handle) = handles.handle(token) else {
                trace!(?token, "registered token has no handle; skipping");
                continue;
            };
            let events = poll_events(handle.interest());
            let fd = handle.raw_fd();
            pollfds.push(libc::pollfd {
                // poll(2) ignores negative descriptors.
                fd: if events == 0 { -1 } else { fd },
                events,
                revents: 0,
            });
            polled.push(token);
        }

        let timeout_ms = timeout_millis(timeout);
        trace!(handles = pollfds.len(), timeout_ms, "polling");

        // SAFETY: `pollfds` is a valid, writable array of `pollfds.len()`
        // entries for the duration of the call.
        let ret = unsafe {
            libc::poll(
                pollfds.as_mut_ptr(),
                pollfds.len() as libc::nfds_t,
                timeout_ms,
            )
        };
        if ret < 0 {
            return Err(SelectorError::Poll(io::Error::last_os_error()));
        }

        self.selected.clear();
        for (token, pollfd) in polled.into_iter().zip(&pollfds) {
            let Some(handle) = handles.handle_mut(token) else {
                continue;
            };
            let readiness = readiness_from(handle.interest(), pollfd.revents);
            handle.set_readiness(readiness);
            if !readiness.is_empty() {
                self.selected.push(token);
            }
        }

        trace!(ready = self.selected.len(), "poll returned");
        Ok(self.selected.len())
    }
}

fn poll_events(interest: Interest) -> libc::c_short {
    let mut events = 0;
    if !interest.read_side().is_empty() {
        events |= libc::POLLIN;
    }
    if !interest.write_side().is_empty() {
        events |= libc::POLLOUT;
    }
    events
}

fn readiness_from(interest: Interest, revents: libc::c_short) -> Interest {
    if revents & libc::POLLNVAL != 0 {
        return interest;
    }

    let failed = revents & (libc::POLLERR | libc::POLLHUP) != 0;
    let mut readiness = Interest::empty();
    if failed || revents & libc::POLLIN != 0 {
        readiness |= interest.read_side();
    }
    if failed || revents & libc::POLLOUT != 0 {
        readiness |= interest.write_side();
    }
    readiness
}

fn timeout_millis(timeout: Option<Duration>) -> libc::c_int {
    let Some(timeout) = timeout else {
        return -1;
    };
    let mut millis = timeout.as_millis();
    if timeout.subsec_nanos() % 1_000_000 != 0 {
        millis += 1;
    }
    millis.min(libc::c_int::MAX as u128) as libc::c_int
}
