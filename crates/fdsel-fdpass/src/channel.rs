use std::fs::File;
use std::io;
use std::mem;
use std::os::fd::{AsRawFd, BorrowedFd, OwnedFd};

use bytes::Bytes;
use tracing::{debug, warn};

use crate::codec::{decode_rights, ControlBuffer, MAX_FDS_PER_MESSAGE};
use crate::error::{FdPassError, Result};

/// Default receive buffer: 4 KiB.
pub const DEFAULT_BUFFER_CAPACITY: usize = 4 * 1024;

#[cfg(any(target_os = "linux", target_os = "android"))]
const SEND_FLAGS: libc::c_int = libc::MSG_NOSIGNAL;
#[cfg(not(any(target_os = "linux", target_os = "android")))]
const SEND_FLAGS: libc::c_int = 0;

#[cfg(any(target_os = "linux", target_os = "android", target_os = "freebsd"))]
const RECV_FLAGS: libc::c_int = libc::MSG_CMSG_CLOEXEC;
#[cfg(not(any(target_os = "linux", target_os = "android", target_os = "freebsd")))]
const RECV_FLAGS: libc::c_int = 0;

/// Receive-side limits.
#[derive(Debug, Clone)]
pub struct FdPassConfig {
    /// Payload buffer size in bytes. Default: 4 KiB.
    pub buffer_capacity: usize,
    /// Descriptors the receiver reserves room for. More than this is an
    /// error, never a silent drop. Default: 1.
    pub max_fds: usize,
}

impl Default for FdPassConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            max_fds: 1,
        }
    }
}

/// One received message.
#[derive(Debug)]
pub struct Received {
    /// Payload bytes.
    pub payload: Bytes,
    /// Descriptors now owned by this process. Their numbers are unrelated to
    /// the sender's.
    pub fds: Vec<OwnedFd>,
}

impl Received {
    /// Move the received descriptors out as files.
    pub fn take_files(&mut self) -> Vec<File> {
        self.fds.drain(..).map(File::from).collect()
    }
}

/// Send and receive descriptor bundles over a connected Unix domain socket.
///
/// Implemented for everything with a raw descriptor, so it works on
/// `UnixSocket`, `FdHandle` and `std::os::unix::net::UnixStream` alike. A
/// closed handle reports `-1`, so calls on it fail with `EBADF`.
pub trait DescriptorChannel {
    /// Send `payload` with `fds` attached, in one `sendmsg(2)`.
    ///
    /// Returns the number of payload bytes sent; on stream sockets this may be
    /// less than `payload.len()` and the rest is the caller's to send. The
    /// descriptors travel with the first byte.
    ///
    /// The descriptors are only borrowed. After a successful send the peer
    /// holds its own duplicates and the caller still owns, and must close,
    /// the originals. On error assume nothing was transferred.
    fn send_with_fds(&self, payload: &[u8], fds: &[BorrowedFd<'_>]) -> Result<usize>;

    /// Receive one message with room for `buffer_capacity` payload bytes and
    /// `max_fds` descriptors, in one `recvmsg(2)`.
    ///
    /// Returns an empty `fds` when the peer attached none. Fails with
    /// [`FdPassError::Truncated`] when the peer sent more than `max_fds`
    /// descriptors; whatever did arrive is closed first. A `max_fds` above
    /// [`MAX_FDS_PER_MESSAGE`] reserves room for that maximum.
    fn recv_with_fds(&self, buffer_capacity: usize, max_fds: usize) -> Result<Received>;

    /// [`recv_with_fds`](DescriptorChannel::recv_with_fds) with limits from
    /// `config`.
    fn recv_with_config(&self, config: &FdPassConfig) -> Result<Received> {
        self.recv_with_fds(config.buffer_capacity, config.max_fds)
    }
}

impl<T: AsRawFd + ?Sized> DescriptorChannel for T {
    fn send_with_fds(&self, payload: &[u8], fds: &[BorrowedFd<'_>]) -> Result<usize> {
        if payload.is_empty() {
            // A zero-length stream write carries no ancillary data.
            return Err(FdPassError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                "payload must not be empty",
            )));
        }

        let mut control = ControlBuffer::encode_rights(fds)?;
        let mut iov = libc::iovec {
            iov_base: payload.as_ptr() as *mut libc::c_void,
            iov_len: payload.len(),
        };

        // SAFETY: an all-zero msghdr is valid; the fields set below point at
        // `iov` and `control`, which outlive the call.
        let mut msg: libc::msghdr = unsafe { mem::zeroed() };
        msg.msg_iov = &mut iov;
        msg.msg_iovlen = 1;
        msg.msg_control = control.as_mut_ptr();
        msg.msg_controllen = control.len() as _;

        let fd = self.as_raw_fd();
        // SAFETY: `msg` is fully initialised and the kernel only reads from
        // the payload through `iov`.
        let sent = unsafe { libc::sendmsg(fd, &msg, SEND_FLAGS) };
        if sent < 0 {
            return Err(FdPassError::Io(io::Error::last_os_error()));
        }
        if sent == 0 {
            return Err(FdPassError::Io(io::Error::new(
                io::ErrorKind::WriteZero,
                "sendmsg sent no bytes",
            )));
        }

        debug!(fd, bytes = sent, fds = fds.len(), "sent message");
        Ok(sent as usize)
    }

    fn recv_with_fds(&self, buffer_capacity: usize, max_fds: usize) -> Result<Received> {
        // The kernel never attaches more than this to one message.
        let max_fds = max_fds.min(MAX_FDS_PER_MESSAGE);
        let mut payload = vec![0u8; buffer_capacity];
        let mut control = ControlBuffer::for_fds(max_fds);
        let mut iov = libc::iovec {
            iov_base: payload.as_mut_ptr().cast(),
            iov_len: payload.len(),
        };

        // SAFETY: an all-zero msghdr is valid; the fields set below point at
        // `iov` and `control`, which outlive the call.
        let mut msg: libc::msghdr = unsafe { mem::zeroed() };
        msg.msg_iov = &mut iov;
        msg.msg_iovlen = 1;
        msg.msg_control = control.as_mut_ptr();
        msg.msg_controllen = control.len() as _;

        let fd = self.as_raw_fd();
        // SAFETY: the kernel writes at most `iov_len` payload bytes and
        // `msg_controllen` control bytes into buffers we own.
        let received = unsafe { libc::recvmsg(fd, &mut msg, RECV_FLAGS) };
        if received < 0 {
            return Err(FdPassError::Io(io::Error::last_os_error()));
        }

        // Own every installed descriptor before any early return so none leak.
        // SAFETY: `msg` was just filled by a successful recvmsg.
        let fds = unsafe { decode_rights(&msg) };

        // Control space is rounded up for alignment, so the kernel may fit
        // more than `max_fds` without reporting MSG_CTRUNC.
        if msg.msg_flags & libc::MSG_CTRUNC != 0 || fds.len() > max_fds {
            warn!(
                fd,
                max_fds,
                delivered = fds.len(),
                "ancillary data truncated; closing delivered descriptors"
            );
            drop(fds);
            return Err(FdPassError::Truncated { max_fds });
        }

        if msg.msg_flags & libc::MSG_TRUNC != 0 {
            drop(fds);
            return Err(FdPassError::PayloadTruncated {
                capacity: buffer_capacity,
            });
        }

        let received = received as usize;
        if received == 0 && fds.is_empty() {
            return Err(FdPassError::ConnectionClosed);
        }

        payload.truncate(received);
        debug!(fd, bytes = received, fds = fds.len(), "received message");

        Ok(Received {
            payload: Bytes::from(payload),
            fds,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Seek, SeekFrom, Write};
    use std::os::fd::AsFd;
    use std::os::unix::net::UnixStream;

    use fdsel_transport::UnixSocket;

    fn temp_file(tag: &str, contents: &[u8]) -> (std::path::PathBuf, File) {
        let path = std::env::temp_dir().join(format!(
            "fdsel-fdpass-{tag}-{}.txt",
            std::process::id()
        ));
        let mut file = File::options()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)
            .unwrap();
        file.write_all(contents).unwrap();
        file.seek(SeekFrom::Start(0)).unwrap();
        (path, file)
    }

    #[test]
    fn test_payload_and_descriptor_round_trip() {
        let (a, b) = UnixSocket::pair().unwrap();
        let (path, file) = temp_file("roundtrip", b"AB");

        let sent = a.send_with_fds(b"x", &[file.as_fd()]).unwrap();
        assert_eq!(sent, 1);

        let mut received = b.recv_with_fds(64, 1).unwrap();
        assert_eq!(received.payload.as_ref(), b"x");
        assert_eq!(received.fds.len(), 1);

        let mut files = received.take_files();
        let mut buf = [0u8; 2];
        files[0].read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"AB");

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_received_descriptor_shares_kernel_object() {
        let (a, b) = UnixStream::pair().unwrap();
        let (pipe_read, pipe_write) = UnixStream::pair().unwrap();

        a.send_with_fds(b"pipe", &[pipe_write.as_fd()]).unwrap();
        let mut received = b.recv_with_fds(16, 1).unwrap();
        let mut remote_write = received.take_files().remove(0);
        assert_ne!(remote_write.as_raw_fd(), pipe_write.as_raw_fd());

        remote_write.write_all(b"through the copy").unwrap();
        drop(remote_write);
        drop(pipe_write);

        let mut out = String::new();
        (&pipe_read).read_to_string(&mut out).unwrap();
        assert_eq!(out, "through the copy");
    }

    #[test]
    fn test_multiple_descriptors() {
        let (a, b) = UnixStream::pair().unwrap();
        let (path1, f1) = temp_file("multi-1", b"one");
        let (path2, f2) = temp_file("multi-2", b"two");

        a.send_with_fds(b"pair", &[f1.as_fd(), f2.as_fd()]).unwrap();
        let mut received = b.recv_with_fds(16, 4).unwrap();
        assert_eq!(received.payload.as_ref(), b"pair");

        let contents: Vec<String> = received
            .take_files()
            .into_iter()
            .map(|mut f| {
                let mut s = String::new();
                f.read_to_string(&mut s).unwrap();
                s
            })
            .collect();
        assert_eq!(contents, vec!["one".to_string(), "two".to_string()]);

        let _ = std::fs::remove_file(&path1);
        let _ = std::fs::remove_file(&path2);
    }

    #[test]
    fn test_no_ancillary_data_yields_empty_bundle() {
        let (a, b) = UnixStream::pair().unwrap();
        a.send_with_fds(b"plain", &[]).unwrap();
        let received = b.recv_with_config(&FdPassConfig::default()).unwrap();
        assert_eq!(received.payload.as_ref(), b"plain");
        assert!(received.fds.is_empty());
    }

    #[test]
    fn test_zero_capacity_truncates_and_sender_keeps_descriptor() {
        let (a, b) = UnixStream::pair().unwrap();
        let (path, mut file) = temp_file("truncated", b"AB");

        a.send_with_fds(b"x", &[file.as_fd()]).unwrap();
        let result = b.recv_with_fds(16, 0);
        assert!(matches!(result, Err(FdPassError::Truncated { max_fds: 0 })));

        // The sender's descriptor is untouched and still usable.
        let mut buf = [0u8; 2];
        file.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"AB");

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_more_descriptors_than_reserved_is_truncation() {
        let (a, b) = UnixStream::pair().unwrap();
        let null = File::open("/dev/null").unwrap();
        a.send_with_fds(b"three", &[null.as_fd(), null.as_fd(), null.as_fd()])
            .unwrap();
        let result = b.recv_with_fds(16, 1);
        assert!(matches!(result, Err(FdPassError::Truncated { max_fds: 1 })));
    }

    #[test]
    fn test_oversized_limit_is_capped_not_wrapped() {
        let (a, b) = UnixStream::pair().unwrap();
        let null = File::open("/dev/null").unwrap();

        a.send_with_fds(b"x", &[null.as_fd()]).unwrap();
        let received = b.recv_with_fds(16, 1 << 30).unwrap();
        assert_eq!(&received.payload[..], b"x");
        assert_eq!(received.fds.len(), 1);

        a.send_with_fds(b"y", &[null.as_fd(), null.as_fd()]).unwrap();
        let received = b.recv_with_fds(16, usize::MAX).unwrap();
        assert_eq!(&received.payload[..], b"y");
        assert_eq!(received.fds.len(), 2);
    }

    #[test]
    fn test_padding_does_not_widen_the_limit() {
        let (a, b) = UnixStream::pair().unwrap();
        let null = File::open("/dev/null").unwrap();
        a.send_with_fds(b"two", &[null.as_fd(), null.as_fd()]).unwrap();
        let result = b.recv_with_fds(16, 1);
        assert!(matches!(result, Err(FdPassError::Truncated { max_fds: 1 })));
    }

    #[test]
    fn test_empty_payload_rejected() {
        let (a, _b) = UnixStream::pair().unwrap();
        let null = File::open("/dev/null").unwrap();
        let result = a.send_with_fds(b"", &[null.as_fd()]);
        match result {
            Err(FdPassError::Io(err)) => assert_eq!(err.kind(), io::ErrorKind::InvalidInput),
            other => panic!("expected invalid input, got {other:?}"),
        }
    }

    #[test]
    fn test_peer_closed() {
        let (a, b) = UnixStream::pair().unwrap();
        drop(a);
        let result = b.recv_with_fds(16, 1);
        assert!(matches!(result, Err(FdPassError::ConnectionClosed)));
    }

    #[test]
    fn test_send_to_closed_peer_fails() {
        let (a, b) = UnixStream::pair().unwrap();
        drop(b);
        let result = a.send_with_fds(b"x", &[]);
        match result {
            Err(err @ FdPassError::Io(_)) => assert_eq!(err.raw_os_error(), Some(libc::EPIPE)),
            other => panic!("expected EPIPE, got {other:?}"),
        }
    }

    #[test]
    fn test_closed_handle_reports_os_error() {
        let (mut a, _b) = UnixSocket::pair().unwrap();
        a.close();
        let result = a.send_with_fds(b"x", &[]);
        match result {
            Err(err @ FdPassError::Io(_)) => assert_eq!(err.raw_os_error(), Some(libc::EBADF)),
            other => panic!("expected EBADF, got {other:?}"),
        }
    }
}
