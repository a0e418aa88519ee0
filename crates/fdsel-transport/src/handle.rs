use std::io;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, FromRawFd, OwnedFd, RawFd};

use tracing::trace;

use crate::error::{Result, TransportError};
use crate::interest::Interest;
use crate::traits::Selectable;

/// Converts a `-1` syscall return into the last OS error.
pub(crate) fn cvt(ret: libc::c_int) -> io::Result<libc::c_int> {
    if ret == -1 {
        Err(io::Error::last_os_error())
    } else {
        Ok(ret)
    }
}

pub(crate) fn cvt_size(ret: libc::ssize_t) -> io::Result<usize> {
    if ret < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(ret as usize)
    }
}

/// Owns at most one file descriptor plus the bits a selector needs.
///
/// The descriptor is closed exactly once: by [`close`](FdHandle::close) or when
/// the handle is dropped. [`release`](FdHandle::release) hands it to a new
/// owner without closing it. `FdHandle` is not `Clone`; moving it moves the
/// descriptor.
#[derive(Debug, Default)]
pub struct FdHandle {
    fd: Option<OwnedFd>,
    interest: Interest,
    readiness: Interest,
}

impl FdHandle {
    /// Take ownership of an open descriptor.
    pub fn new(fd: OwnedFd) -> Self {
        Self {
            fd: Some(fd),
            interest: Interest::empty(),
            readiness: Interest::empty(),
        }
    }

    /// A handle with no descriptor yet.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Take ownership of a raw descriptor.
    ///
    /// # Safety
    ///
    /// `fd` must be open and not owned by anything else; the handle will
    /// close it.
    pub unsafe fn from_raw_fd(fd: RawFd) -> Self {
        // SAFETY: forwarded to the caller.
        Self::new(unsafe { OwnedFd::from_raw_fd(fd) })
    }

    pub fn is_open(&self) -> bool {
        self.fd.is_some()
    }

    /// Borrow the descriptor, if one is owned.
    pub fn fd(&self) -> Option<BorrowedFd<'_>> {
        self.fd.as_ref().map(AsFd::as_fd)
    }

    /// Store a newly created descriptor in an empty handle.
    ///
    /// Any descriptor already owned is closed first.
    pub(crate) fn replace(&mut self, fd: OwnedFd) {
        self.close();
        self.fd = Some(fd);
    }

    pub(crate) fn require_fd(&self) -> Result<RawFd> {
        self.fd
            .as_ref()
            .map(AsRawFd::as_raw_fd)
            .ok_or(TransportError::NotOpen)
    }

    /// Switch between blocking and non-blocking mode.
    ///
    /// Returns without a second syscall when the descriptor is already in the
    /// requested mode.
    pub fn configure_blocking(&self, blocking: bool) -> Result<()> {
        let fd = self.require_fd()?;

        // SAFETY: `fd` is owned by this handle and open for its lifetime.
        let flags = cvt(unsafe { libc::fcntl(fd, libc::F_GETFL) })?;
        let new_flags = if blocking {
            flags & !libc::O_NONBLOCK
        } else {
            flags | libc::O_NONBLOCK
        };

        if new_flags == flags {
            return Ok(());
        }

        // SAFETY: as above; only the status flags are changed.
        cvt(unsafe { libc::fcntl(fd, libc::F_SETFL, new_flags) })?;
        trace!(fd, blocking, "changed blocking mode");
        Ok(())
    }

    /// Whether the descriptor is currently in blocking mode.
    pub fn is_blocking(&self) -> Result<bool> {
        let fd = self.require_fd()?;
        // SAFETY: `fd` is owned by this handle.
        let flags = cvt(unsafe { libc::fcntl(fd, libc::F_GETFL) })?;
        Ok(flags & libc::O_NONBLOCK == 0)
    }

    /// One `read(2)`. No retry on interruption or short reads.
    pub fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        let fd = self.require_fd().map_err(not_open)?;
        // SAFETY: `buf` is valid for `buf.len()` writable bytes.
        cvt_size(unsafe { libc::read(fd, buf.as_mut_ptr().cast(), buf.len()) })
    }

    /// One `write(2)`. No retry on interruption or short writes.
    pub fn write(&self, buf: &[u8]) -> io::Result<usize> {
        let fd = self.require_fd().map_err(not_open)?;
        // SAFETY: `buf` is valid for `buf.len()` readable bytes.
        cvt_size(unsafe { libc::write(fd, buf.as_ptr().cast(), buf.len()) })
    }

    /// Close the descriptor. Calling it again is a no-op.
    pub fn close(&mut self) {
        if let Some(fd) = self.fd.take() {
            trace!(fd = fd.as_raw_fd(), "closing descriptor");
            drop(fd);
        }
        self.readiness = Interest::empty();
    }

    /// Give up ownership without closing.
    ///
    /// The handle becomes empty and its interest and readiness are cleared.
    pub fn release(&mut self) -> Option<OwnedFd> {
        self.interest = Interest::empty();
        self.readiness = Interest::empty();
        self.fd.take()
    }
}

fn not_open(err: TransportError) -> io::Error {
    match err {
        TransportError::Io(err) => err,
        other => io::Error::new(io::ErrorKind::NotConnected, other),
    }
}

impl From<OwnedFd> for FdHandle {
    fn from(fd: OwnedFd) -> Self {
        Self::new(fd)
    }
}

impl AsRawFd for FdHandle {
    fn as_raw_fd(&self) -> RawFd {
        self.raw_fd()
    }
}

impl Selectable for FdHandle {
    fn raw_fd(&self) -> RawFd {
        self.fd.as_ref().map_or(-1, AsRawFd::as_raw_fd)
    }

    fn interest(&self) -> Interest {
        self.interest
    }

    fn set_interest(&mut self, interest: Interest) {
        self.interest = interest;
    }

    fn readiness(&self) -> Interest {
        self.readiness
    }

    fn set_readiness(&mut self, readiness: Interest) {
        self.readiness = readiness;
    }
}

impl io::Read for FdHandle {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        FdHandle::read(self, buf)
    }
}

impl io::Write for FdHandle {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        FdHandle::write(self, buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
