use std::ffi::OsStr;
use std::io;
use std::mem;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::{FileTypeExt, MetadataExt, PermissionsExt};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::handle::{cvt, cvt_size, FdHandle};
use crate::interest::Interest;
use crate::traits::Selectable;

/// Listen backlog used by [`UnixSocket::bind`].
pub const DEFAULT_BACKLOG: i32 = 50;

/// Unix domain socket type.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum SocketType {
    #[default]
    Stream,
    SeqPacket,
    Datagram,
}

impl SocketType {
    fn as_raw(self) -> libc::c_int {
        match self {
            SocketType::Stream => libc::SOCK_STREAM,
            SocketType::SeqPacket => libc::SOCK_SEQPACKET,
            SocketType::Datagram => libc::SOCK_DGRAM,
        }
    }

    /// Whether `listen(2)` applies to this type.
    pub fn is_connection_oriented(self) -> bool {
        !matches!(self, SocketType::Datagram)
    }
}

/// Options for [`UnixSocket::bind_with`].
#[derive(Debug, Clone)]
pub struct BindConfig {
    /// Socket type. Default: stream.
    pub socket_type: SocketType,
    /// Pending connection queue length. Default: [`DEFAULT_BACKLOG`].
    pub backlog: i32,
    /// Permission bits applied to a filesystem socket entry. Default: left as
    /// created (umask applies).
    pub mode: Option<u32>,
    /// Remove an existing socket file at the path before binding. A path that
    /// exists but is not a socket is never removed. Default: false.
    pub remove_stale: bool,
}

impl Default for BindConfig {
    fn default() -> Self {
        Self {
            socket_type: SocketType::Stream,
            backlog: DEFAULT_BACKLOG,
            mode: None,
            remove_stale: false,
        }
    }
}

/// A Unix domain socket endpoint.
///
/// Created by [`bind`](UnixSocket::bind) (listening side),
/// [`connect`](UnixSocket::connect) (connecting side) or
/// [`accept`](UnixSocket::accept) (accepted side).
///
/// A path starting with a NUL byte names a socket in the Linux abstract
/// namespace; it has no filesystem entry. For any other path, only the
/// listener that created the entry removes it when dropped, and only while the
/// entry is still the socket it created. A connecting endpoint never touches
/// the peer's path.
#[derive(Debug)]
pub struct UnixSocket {
    handle: FdHandle,
    path: Option<PathBuf>,
    socket_type: SocketType,
    created_inode: Option<(u64, u64)>,
    /// Whether the path should be removed on drop (filesystem listeners only).
    cleanup_on_drop: bool,
}

impl UnixSocket {
    /// Bind a stream socket to `path` and listen with [`DEFAULT_BACKLOG`].
    pub fn bind(path: impl AsRef<Path>) -> Result<Self> {
        Self::bind_with(path, &BindConfig::default())
    }

    /// Create a socket, bind it to `path` and, for connection-oriented types,
    /// listen with `config.backlog`.
    ///
    /// On failure the partially created descriptor is closed before the error
    /// is returned; the error keeps the failing syscall's OS error code.
    pub fn bind_with(path: impl AsRef<Path>, config: &BindConfig) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let bind_err = |source: io::Error| TransportError::Bind {
            path: path.clone(),
            source,
        };

        let (addr, addr_len) = socket_addr(&path)?;
        let abstract_name = is_abstract_path(&path);

        if config.remove_stale && !abstract_name {
            remove_stale_socket(&path).map_err(bind_err)?;
        }

        let fd = new_socket(config.socket_type).map_err(bind_err)?;

        // SAFETY: `addr` is an initialised sockaddr_un and `addr_len` does not
        // exceed its size.
        cvt(unsafe {
            libc::bind(
                fd.as_raw_fd(),
                (&addr as *const libc::sockaddr_un).cast(),
                addr_len,
            )
        })
        .map_err(bind_err)?;

        let mut created_inode = None;
        if !abstract_name {
            created_inode = Some(Self::finish_fs_entry(&path, config.mode).map_err(bind_err)?);
        }

        if config.socket_type.is_connection_oriented() {
            // SAFETY: `fd` is a freshly bound socket owned here.
            if let Err(err) = cvt(unsafe { libc::listen(fd.as_raw_fd(), config.backlog) }) {
                if created_inode.is_some() {
                    let _ = std::fs::remove_file(&path);
                }
                return Err(bind_err(err));
            }
        }

        info!(path = %display_path(&path), socket_type = ?config.socket_type, backlog = config.backlog, "listening on unix domain socket");

        Ok(Self {
            handle: FdHandle::new(fd),
            path: Some(path),
            socket_type: config.socket_type,
            cleanup_on_drop: created_inode.is_some(),
            created_inode,
        })
    }

    /// Apply `mode` to a freshly bound socket file and record its identity.
    ///
    /// On any failure the entry is removed again.
    fn finish_fs_entry(path: &Path, mode: Option<u32>) -> io::Result<(u64, u64)> {
        let result = (|| -> io::Result<(u64, u64)> {
            if let Some(mode) = mode {
                std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))?;
            }
            let metadata = std::fs::symlink_metadata(path)?;
            Ok((metadata.dev(), metadata.ino()))
        })();
        if result.is_err() {
            let _ = std::fs::remove_file(path);
        }
        result
    }

    /// Create a stream socket and connect it to `path` (blocking).
    pub fn connect(path: impl AsRef<Path>) -> Result<Self> {
        Self::connect_with(path, SocketType::Stream)
    }

    /// Create a socket of `socket_type` and connect it to `path` (blocking).
    ///
    /// On failure the descriptor is closed before the error is returned.
    pub fn connect_with(path: impl AsRef<Path>, socket_type: SocketType) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let connect_err = |source: io::Error| TransportError::Connect {
            path: path.clone(),
            source,
        };

        let (addr, addr_len) = socket_addr(&path)?;
        let fd = new_socket(socket_type).map_err(connect_err)?;

        // SAFETY: `addr` is an initialised sockaddr_un and `addr_len` does not
        // exceed its size.
        cvt(unsafe {
            libc::connect(
                fd.as_raw_fd(),
                (&addr as *const libc::sockaddr_un).cast(),
                addr_len,
            )
        })
        .map_err(connect_err)?;

        debug!(path = %display_path(&path), "connected to unix domain socket");

        Ok(Self {
            handle: FdHandle::new(fd),
            path: Some(path),
            socket_type,
            created_inode: None,
            cleanup_on_drop: false,
        })
    }

    /// A connected pair of stream sockets.
    pub fn pair() -> Result<(Self, Self)> {
        let (a, b) = UnixStream::pair()?;
        Ok((Self::from(a), Self::from(b)))
    }

    /// Accept one pending connection.
    ///
    /// On a non-blocking listener with nothing pending this fails with
    /// `WouldBlock` inside [`TransportError::Accept`].
    pub fn accept(&self) -> Result<UnixSocket> {
        let listener = self.handle.require_fd()?;
        let fd = accept_cloexec(listener).map_err(TransportError::Accept)?;
        debug!(listener, fd = fd.as_raw_fd(), "accepted connection");

        Ok(Self {
            handle: FdHandle::new(fd),
            path: None,
            socket_type: self.socket_type,
            created_inode: None,
            cleanup_on_drop: false,
        })
    }

    /// Whether the socket has no pending error.
    ///
    /// Returns false if the `SO_ERROR` query itself fails.
    pub fn is_connected(&self) -> bool {
        matches!(self.option(libc::SO_ERROR), Ok(0))
    }

    /// Take the pending socket error (`SO_ERROR`), if any.
    pub fn take_error(&self) -> Result<Option<io::Error>> {
        let code = self.option(libc::SO_ERROR)?;
        Ok((code != 0).then(|| io::Error::from_raw_os_error(code)))
    }

    /// Set an integer `SOL_SOCKET` option.
    pub fn set_option(&self, name: libc::c_int, value: libc::c_int) -> Result<()> {
        let fd = self.handle.require_fd()?;
        // SAFETY: `value` is a valid c_int for the duration of the call and
        // the length matches.
        cvt(unsafe {
            libc::setsockopt(
                fd,
                libc::SOL_SOCKET,
                name,
                (&value as *const libc::c_int).cast(),
                mem::size_of::<libc::c_int>() as libc::socklen_t,
            )
        })?;
        Ok(())
    }

    /// Read an integer `SOL_SOCKET` option.
    pub fn option(&self, name: libc::c_int) -> Result<libc::c_int> {
        let fd = self.handle.require_fd()?;
        let mut value: libc::c_int = 0;
        let mut len = mem::size_of::<libc::c_int>() as libc::socklen_t;
        // SAFETY: `value` and `len` are valid writable pointers for the sizes
        // given.
        cvt(unsafe {
            libc::getsockopt(
                fd,
                libc::SOL_SOCKET,
                name,
                (&mut value as *mut libc::c_int).cast(),
                &mut len,
            )
        })?;
        Ok(value)
    }

    /// One `send(2)` with no flags.
    pub fn send(&self, buf: &[u8]) -> io::Result<usize> {
        self.send_with_flags(buf, 0)
    }

    /// One `send(2)`. No retry, no framing.
    pub fn send_with_flags(&self, buf: &[u8], flags: libc::c_int) -> io::Result<usize> {
        let fd = self.raw_fd();
        // SAFETY: `buf` is valid for `buf.len()` readable bytes.
        cvt_size(unsafe { libc::send(fd, buf.as_ptr().cast(), buf.len(), flags) })
    }

    /// One `recv(2)` with no flags. `Ok(0)` means the peer closed.
    pub fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
        self.recv_with_flags(buf, 0)
    }

    /// One `recv(2)`. No retry, no framing.
    pub fn recv_with_flags(&self, buf: &mut [u8], flags: libc::c_int) -> io::Result<usize> {
        let fd = self.raw_fd();
        // SAFETY: `buf` is valid for `buf.len()` writable bytes.
        cvt_size(unsafe { libc::recv(fd, buf.as_mut_ptr().cast(), buf.len(), flags) })
    }

    /// Get the credentials of the connected peer (Linux only).
    ///
    /// Returns `(uid, gid, pid)` via `SO_PEERCRED`, or `None` if unavailable.
    #[cfg(target_os = "linux")]
    pub fn peer_credentials(&self) -> Option<(u32, u32, u32)> {
        let fd = self.handle.require_fd().ok()?;

        let mut cred = libc::ucred {
            pid: 0,
            uid: 0,
            gid: 0,
        };
        let mut len = mem::size_of::<libc::ucred>() as libc::socklen_t;

        // SAFETY: `cred` and `len` are valid writable pointers for the provided sizes,
        // and `fd` is an open Unix socket descriptor owned by this endpoint.
        let rc = unsafe {
            libc::getsockopt(
                fd,
                libc::SOL_SOCKET,
                libc::SO_PEERCRED,
                (&mut cred as *mut libc::ucred).cast::<libc::c_void>(),
                &mut len,
            )
        };

        if rc == 0 && len as usize == mem::size_of::<libc::ucred>() {
            Some((cred.uid, cred.gid, cred.pid as u32))
        } else {
            None
        }
    }

    /// Get the credentials of the connected peer.
    ///
    /// Returns `None` on platforms that do not expose peer credentials.
    #[cfg(not(target_os = "linux"))]
    pub fn peer_credentials(&self) -> Option<(u32, u32, u32)> {
        None
    }

    /// The path this socket was bound or connected to. `None` for accepted
    /// and paired sockets.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Whether the path names an abstract-namespace socket.
    pub fn is_abstract(&self) -> bool {
        self.path.as_deref().is_some_and(is_abstract_path)
    }

    /// Whether dropping this endpoint removes its filesystem entry.
    pub fn owns_path(&self) -> bool {
        self.cleanup_on_drop
    }

    pub fn socket_type(&self) -> SocketType {
        self.socket_type
    }

    /// The underlying descriptor handle.
    pub fn handle(&self) -> &FdHandle {
        &self.handle
    }

    pub fn handle_mut(&mut self) -> &mut FdHandle {
        &mut self.handle
    }

    pub fn is_open(&self) -> bool {
        self.handle.is_open()
    }

    /// See [`FdHandle::configure_blocking`].
    pub fn configure_blocking(&self, blocking: bool) -> Result<()> {
        self.handle.configure_blocking(blocking)
    }

    /// Close the descriptor. Idempotent. Path cleanup still happens on drop.
    pub fn close(&mut self) {
        self.handle.close();
    }

    /// Give up the descriptor without closing it. Path cleanup responsibility
    /// stays with this endpoint.
    pub fn release(&mut self) -> Option<OwnedFd> {
        self.handle.release()
    }

    /// Transport name for diagnostics.
    pub fn transport_name(&self) -> &'static str {
        if self.is_abstract() {
            "unix-abstract-socket"
        } else {
            "unix-domain-socket"
        }
    }
}

impl From<OwnedFd> for UnixSocket {
    fn from(fd: OwnedFd) -> Self {
        Self {
            handle: FdHandle::new(fd),
            path: None,
            socket_type: SocketType::Stream,
            created_inode: None,
            cleanup_on_drop: false,
        }
    }
}

impl From<UnixStream> for UnixSocket {
    fn from(stream: UnixStream) -> Self {
        Self::from(OwnedFd::from(stream))
    }
}

impl AsRawFd for UnixSocket {
    fn as_raw_fd(&self) -> RawFd {
        self.handle.raw_fd()
    }
}

impl Selectable for UnixSocket {
    fn raw_fd(&self) -> RawFd {
        self.handle.raw_fd()
    }

    fn interest(&self) -> Interest {
        self.handle.interest()
    }

    fn set_interest(&mut self, interest: Interest) {
        self.handle.set_interest(interest)
    }

    fn readiness(&self) -> Interest {
        self.handle.readiness()
    }

    fn set_readiness(&mut self, readiness: Interest) {
        self.handle.set_readiness(readiness)
    }
}

impl io::Read for UnixSocket {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.handle.read(buf)
    }
}

impl io::Write for UnixSocket {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.handle.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for UnixSocket {
    fn drop(&mut self) {
        if !self.cleanup_on_drop {
            return;
        }
        let (Some(path), Some((expected_dev, expected_ino))) = (&self.path, self.created_inode)
        else {
            return;
        };
        if let Ok(metadata) = std::fs::symlink_metadata(path) {
            if metadata.file_type().is_socket()
                && metadata.dev() == expected_dev
                && metadata.ino() == expected_ino
            {
                debug!(?path, "cleaning up socket file");
                let _ = std::fs::remove_file(path);
            } else {
                debug!(?path, "socket path identity changed; skipping cleanup");
            }
        }
    }
}

fn is_abstract_path(path: &Path) -> bool {
    path.as_os_str().as_bytes().first() == Some(&0)
}

/// Printable form of a socket path; abstract names are shown with a leading `@`.
pub(crate) fn display_path(path: &Path) -> String {
    let bytes = path.as_os_str().as_bytes();
    match bytes.split_first() {
        Some((0, name)) => format!("@{}", OsStr::from_bytes(name).to_string_lossy()),
        _ => path.display().to_string(),
    }
}

fn socket_addr(path: &Path) -> Result<(libc::sockaddr_un, libc::socklen_t)> {
    let bytes = path.as_os_str().as_bytes();

    // SAFETY: an all-zero sockaddr_un is a valid value.
    let mut addr: libc::sockaddr_un = unsafe { mem::zeroed() };
    addr.sun_family = libc::AF_UNIX as libc::sa_family_t;

    // Filesystem paths keep room for the terminating NUL.
    let max = if is_abstract_path(path) {
        addr.sun_path.len()
    } else {
        addr.sun_path.len() - 1
    };
    if bytes.len() > max {
        return Err(TransportError::PathTooLong {
            path: path.to_path_buf(),
            len: bytes.len(),
            max,
        });
    }

    for (dst, src) in addr.sun_path.iter_mut().zip(bytes) {
        *dst = *src as libc::c_char;
    }

    let mut len = mem::offset_of!(libc::sockaddr_un, sun_path) + bytes.len();
    if !is_abstract_path(path) {
        len += 1;
    }
    Ok((addr, len as libc::socklen_t))
}

fn remove_stale_socket(path: &Path) -> io::Result<()> {
    let metadata = match std::fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(err) => return Err(err),
    };
    if metadata.file_type().is_socket() {
        debug!(?path, "removing stale socket");
        std::fs::remove_file(path)
    } else {
        Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            "existing path is not a unix socket",
        ))
    }
}

#[cfg(any(target_os = "linux", target_os = "android", target_os = "freebsd"))]
fn new_socket(socket_type: SocketType) -> io::Result<OwnedFd> {
    // SAFETY: plain socket(2) call; the returned descriptor is owned below.
    let fd = cvt(unsafe {
        libc::socket(libc::AF_UNIX, socket_type.as_raw() | libc::SOCK_CLOEXEC, 0)
    })?;
    // SAFETY: `fd` was just created and is owned by nothing else.
    Ok(unsafe { OwnedFd::from_raw_fd(fd) })
}

#[cfg(not(any(target_os = "linux", target_os = "android", target_os = "freebsd")))]
fn new_socket(socket_type: SocketType) -> io::Result<OwnedFd> {
    // SAFETY: plain socket(2) call; the returned descriptor is owned below.
    let fd = cvt(unsafe { libc::socket(libc::AF_UNIX, socket_type.as_raw(), 0) })?;
    // SAFETY: `fd` was just created and is owned by nothing else.
    let fd = unsafe { OwnedFd::from_raw_fd(fd) };
    set_cloexec(fd.as_raw_fd())?;
    Ok(fd)
}

#[cfg(any(target_os = "linux", target_os = "android", target_os = "freebsd"))]
fn accept_cloexec(listener: RawFd) -> io::Result<OwnedFd> {
    // SAFETY: null address pointers are allowed when the peer address is not
    // wanted.
    let fd = cvt(unsafe {
        libc::accept4(
            listener,
            std::ptr::null_mut(),
            std::ptr::null_mut(),
            libc::SOCK_CLOEXEC,
        )
    })?;
    // SAFETY: `fd` was just returned by accept4 and is owned by nothing else.
    Ok(unsafe { OwnedFd::from_raw_fd(fd) })
}

#[cfg(not(any(target_os = "linux", target_os = "android", target_os = "freebsd")))]
fn accept_cloexec(listener: RawFd) -> io::Result<OwnedFd> {
    // SAFETY: null address pointers are allowed when the peer address is not
    // wanted.
    let fd = cvt(unsafe { libc::accept(listener, std::ptr::null_mut(), std::ptr::null_mut()) })?;
    // SAFETY: `fd` was just returned by accept and is owned by nothing else.
    let fd = unsafe { OwnedFd::from_raw_fd(fd) };
    set_cloexec(fd.as_raw_fd())?;
    Ok(fd)
}

#[cfg(not(any(target_os = "linux", target_os = "android", target_os = "freebsd")))]
fn set_cloexec(fd: RawFd) -> io::Result<()> {
    // SAFETY: `fd` is open; only the descriptor flags are changed.
    unsafe {
        let flags = cvt(libc::fcntl(fd, libc::F_GETFD))?;
        cvt(libc::fcntl(fd, libc::F_SETFD, flags | libc::FD_CLOEXEC)).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::sync::atomic::{AtomicUsize, Ordering};

    static NEXT: AtomicUsize = AtomicUsize::new(0);

    fn test_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "fdsel-{tag}-{}-{}",
            std::process::id(),
            NEXT.fetch_add(1, Ordering::Relaxed)
        ));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn abstract_name(tag: &str) -> PathBuf {
        PathBuf::from(format!(
            "\0fdsel-{tag}-{}-{}.sock",
            std::process::id(),
            NEXT.fetch_add(1, Ordering::Relaxed)
        ))
    }

    #[test]
    fn test_bind_accept_connect() {
        let dir = test_dir("uds");
        let sock_path = dir.join("test.sock");

        let listener = UnixSocket::bind(&sock_path).unwrap();
        assert!(sock_path.exists());
        assert!(listener.owns_path());

        let path_clone = sock_path.clone();
        let handle = std::thread::spawn(move || {
            let mut client = UnixSocket::connect(&path_clone).unwrap();
            assert!(!client.owns_path());
            client.write_all(b"hello").unwrap();
        });

        let mut server = listener.accept().unwrap();
        assert!(server.path().is_none());
        let mut buf = [0u8; 5];
        server.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"hello");

        handle.join().unwrap();

        drop(listener);
        assert!(
            !sock_path.exists(),
            "socket file should be cleaned up on drop"
        );
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_client_drop_keeps_server_path() {
        let dir = test_dir("client-drop");
        let sock_path = dir.join("server.sock");

        let listener = UnixSocket::bind(&sock_path).unwrap();
        let client = UnixSocket::connect(&sock_path).unwrap();
        drop(client);
        assert!(sock_path.exists(), "client must not remove the peer's path");

        drop(listener);
        assert!(!sock_path.exists());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_abstract_namespace_has_no_entry() {
        let name = abstract_name("abstract");
        let listener = UnixSocket::bind(&name).unwrap();
        assert!(listener.is_abstract());
        assert!(!listener.owns_path());
        assert_eq!(listener.transport_name(), "unix-abstract-socket");

        let client = UnixSocket::connect(&name).unwrap();
        assert!(client.is_connected());
        let accepted = listener.accept().unwrap();
        assert_eq!(client.send(b"abc").unwrap(), 3);
        let mut buf = [0u8; 8];
        assert_eq!(accepted.recv(&mut buf).unwrap(), 3);
        assert_eq!(&buf[..3], b"abc");
    }

    #[test]
    fn test_path_too_long() {
        let long_path = "/tmp/".to_string() + &"a".repeat(200) + ".sock";
        let result = UnixSocket::bind(&long_path);
        assert!(matches!(result, Err(TransportError::PathTooLong { .. })));
        let result = UnixSocket::connect(&long_path);
        assert!(matches!(result, Err(TransportError::PathTooLong { .. })));
    }

    #[test]
    fn test_bind_failure_keeps_os_error() {
        let result = UnixSocket::bind("/nonexistent-fdsel-dir/x.sock");
        match result {
            Err(err @ TransportError::Bind { .. }) => {
                assert_eq!(err.raw_os_error(), Some(libc::ENOENT));
            }
            other => panic!("expected bind error, got {other:?}"),
        }
    }

    #[test]
    fn test_bind_existing_path_fails_without_remove_stale() {
        let dir = test_dir("in-use");
        let sock_path = dir.join("busy.sock");
        let first = UnixSocket::bind(&sock_path).unwrap();

        let second = UnixSocket::bind(&sock_path);
        match second {
            Err(err @ TransportError::Bind { .. }) => {
                assert_eq!(err.raw_os_error(), Some(libc::EADDRINUSE));
            }
            other => panic!("expected bind error, got {other:?}"),
        }
        // The failed bind must not have removed the live listener's entry.
        assert!(sock_path.exists());

        drop(first);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_connect_failure() {
        let name = abstract_name("nobody");
        let result = UnixSocket::connect(&name);
        match result {
            Err(err @ TransportError::Connect { .. }) => {
                assert_eq!(err.raw_os_error(), Some(libc::ECONNREFUSED));
            }
            other => panic!("expected connect error, got {other:?}"),
        }
    }

    #[test]
    fn test_bind_applies_mode() {
        let dir = test_dir("perms");
        let sock_path = dir.join("perm.sock");

        let config = BindConfig {
            mode: Some(0o600),
            ..BindConfig::default()
        };
        let listener = UnixSocket::bind_with(&sock_path, &config).unwrap();
        let mode = std::fs::metadata(&sock_path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);

        drop(listener);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_fs_entry_setup_failure_removes_entry() {
        let dir = test_dir("entry");
        let link = dir.join("dangling.sock");
        std::os::unix::fs::symlink(dir.join("missing"), &link).unwrap();

        // chmod follows the link and fails; the entry itself must not survive.
        let err = UnixSocket::finish_fs_entry(&link, Some(0o600)).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
        assert!(std::fs::symlink_metadata(&link).is_err());

        let gone = dir.join("gone.sock");
        assert!(UnixSocket::finish_fs_entry(&gone, None).is_err());
        assert!(std::fs::symlink_metadata(&gone).is_err());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_fs_entry_records_bound_inode() {
        let dir = test_dir("inode");
        let sock_path = dir.join("inode.sock");
        let listener = UnixSocket::bind(&sock_path).unwrap();

        let metadata = std::fs::symlink_metadata(&sock_path).unwrap();
        let identity = UnixSocket::finish_fs_entry(&sock_path, None).unwrap();
        assert_eq!(identity, (metadata.dev(), metadata.ino()));
        assert_eq!(listener.created_inode, Some(identity));

        drop(listener);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_remove_stale_rejects_non_socket_file() {
        let dir = test_dir("bind-file");
        let sock_path = dir.join("not-a-socket.sock");
        std::fs::write(&sock_path, b"regular-file").unwrap();

        let config = BindConfig {
            remove_stale: true,
            ..BindConfig::default()
        };
        let result = UnixSocket::bind_with(&sock_path, &config);
        assert!(matches!(result, Err(TransportError::Bind { .. })));
        assert!(sock_path.exists());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_remove_stale_replaces_leftover_socket() {
        let dir = test_dir("stale");
        let sock_path = dir.join("stale.sock");

        // Leave a socket file behind by releasing cleanup responsibility.
        let mut leftover = UnixSocket::bind(&sock_path).unwrap();
        leftover.cleanup_on_drop = false;
        drop(leftover);
        assert!(sock_path.exists());

        let config = BindConfig {
            remove_stale: true,
            ..BindConfig::default()
        };
        let listener = UnixSocket::bind_with(&sock_path, &config).unwrap();
        assert!(listener.owns_path());

        drop(listener);
        assert!(!sock_path.exists());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_drop_does_not_remove_replaced_path() {
        let dir = test_dir("drop-race");
        let sock_path = dir.join("drop.sock");

        let listener = UnixSocket::bind(&sock_path).unwrap();
        assert!(sock_path.exists());

        // Replace path while listener is alive.
        std::fs::remove_file(&sock_path).unwrap();
        std::fs::write(&sock_path, b"replacement-file").unwrap();

        drop(listener);
        assert!(
            sock_path.exists(),
            "drop must not remove path if inode identity changed"
        );

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_accept_would_block_when_nonblocking() {
        let name = abstract_name("accept-nb");
        let listener = UnixSocket::bind(&name).unwrap();
        listener.configure_blocking(false).unwrap();

        match listener.accept() {
            Err(TransportError::Accept(err)) => {
                assert_eq!(err.kind(), io::ErrorKind::WouldBlock)
            }
            other => panic!("expected WouldBlock, got {other:?}"),
        }
    }

    #[test]
    fn test_socket_options() {
        let (a, _b) = UnixSocket::pair().unwrap();
        a.set_option(libc::SO_SNDBUF, 64 * 1024).unwrap();
        assert!(a.option(libc::SO_SNDBUF).unwrap() > 0);
        assert!(a.take_error().unwrap().is_none());
        assert!(a.is_connected());
    }

    #[test]
    fn test_closed_socket_is_not_connected() {
        let (mut a, _b) = UnixSocket::pair().unwrap();
        a.close();
        assert!(!a.is_connected());
        assert!(matches!(a.take_error(), Err(TransportError::NotOpen)));
        a.close();
    }

    #[test]
    fn test_seqpacket_preserves_boundaries() {
        let name = abstract_name("seqpacket");
        let config = BindConfig {
            socket_type: SocketType::SeqPacket,
            backlog: 4,
            ..BindConfig::default()
        };
        let listener = UnixSocket::bind_with(&name, &config).unwrap();
        let client = UnixSocket::connect_with(&name, SocketType::SeqPacket).unwrap();
        let server = listener.accept().unwrap();
        assert_eq!(server.socket_type(), SocketType::SeqPacket);

        client.send(b"one").unwrap();
        client.send(b"two").unwrap();
        let mut buf = [0u8; 16];
        assert_eq!(server.recv(&mut buf).unwrap(), 3);
        assert_eq!(&buf[..3], b"one");
        assert_eq!(server.recv(&mut buf).unwrap(), 3);
        assert_eq!(&buf[..3], b"two");
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_peer_credentials() {
        let (a, _b) = UnixSocket::pair().unwrap();
        let (_uid, _gid, pid) = a.peer_credentials().expect("credentials on linux");
        assert_eq!(pid, std::process::id());
    }

    #[test]
    fn test_display_path() {
        assert_eq!(display_path(Path::new("\0test.sock")), "@test.sock");
        assert_eq!(display_path(Path::new("/tmp/x.sock")), "/tmp/x.sock");
    }
}
