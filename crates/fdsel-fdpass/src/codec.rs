use std::mem;
use std::os::fd::{AsRawFd, BorrowedFd, FromRawFd, OwnedFd, RawFd};

use crate::error::{FdPassError, Result};

/// Maximum descriptors in one `SCM_RIGHTS` message (Linux `SCM_MAX_FD`).
pub const MAX_FDS_PER_MESSAGE: usize = 253;

/// Control buffer bytes needed to carry `count` descriptors.
///
/// Zero descriptors need no control buffer at all. Counts above
/// [`MAX_FDS_PER_MESSAGE`] are sized as that maximum, since no single message
/// can carry more.
pub fn rights_space(count: usize) -> usize {
    if count == 0 {
        return 0;
    }
    // SAFETY: CMSG_SPACE is pure arithmetic on its argument.
    unsafe { libc::CMSG_SPACE(rights_data_len(count)) as usize }
}

fn rights_len(count: usize) -> usize {
    // SAFETY: CMSG_LEN is pure arithmetic on its argument.
    unsafe { libc::CMSG_LEN(rights_data_len(count)) as usize }
}

fn rights_data_len(count: usize) -> libc::c_uint {
    // At most 253 * 4 bytes, which always fits.
    (count.min(MAX_FDS_PER_MESSAGE) * mem::size_of::<RawFd>()) as libc::c_uint
}

/// Aligned storage for a control message block.
///
/// Backed by `u64` words so every `cmsghdr` inside is suitably aligned.
#[derive(Debug)]
pub struct ControlBuffer {
    words: Vec<u64>,
    len: usize,
}

impl ControlBuffer {
    /// A zeroed buffer with room for `max_fds` descriptors.
    pub fn for_fds(max_fds: usize) -> Self {
        let len = rights_space(max_fds);
        Self {
            words: vec![0u64; len.div_ceil(mem::size_of::<u64>())],
            len,
        }
    }

    /// Encode `fds` as one `SCM_RIGHTS` control message.
    ///
    /// An empty slice yields an empty buffer (no control message).
    pub fn encode_rights(fds: &[BorrowedFd<'_>]) -> Result<Self> {
        if fds.len() > MAX_FDS_PER_MESSAGE {
            return Err(FdPassError::TooManyDescriptors {
                count: fds.len(),
                max: MAX_FDS_PER_MESSAGE,
            });
        }

        let mut buf = Self::for_fds(fds.len());
        if fds.is_empty() {
            return Ok(buf);
        }

        // SAFETY: an all-zero msghdr is valid; only the control fields are
        // used, to let CMSG_FIRSTHDR locate the header inside `buf`.
        let mut msg: libc::msghdr = unsafe { mem::zeroed() };
        msg.msg_control = buf.as_mut_ptr();
        msg.msg_controllen = buf.len() as _;

        // SAFETY: `buf` holds CMSG_SPACE(n * sizeof(int)) aligned bytes, so the
        // first header and `n` descriptors after CMSG_DATA fit inside it.
        unsafe {
            let cmsg = libc::CMSG_FIRSTHDR(&msg);
            debug_assert!(!cmsg.is_null());
            (*cmsg).cmsg_level = libc::SOL_SOCKET;
            (*cmsg).cmsg_type = libc::SCM_RIGHTS;
            (*cmsg).cmsg_len = rights_len(fds.len()) as _;

            let data = libc::CMSG_DATA(cmsg).cast::<RawFd>();
            for (i, fd) in fds.iter().enumerate() {
                data.add(i).write_unaligned(fd.as_raw_fd());
            }
        }

        Ok(buf)
    }

    /// Length in bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Pointer for `msg_control`; null when the buffer is empty.
    pub fn as_mut_ptr(&mut self) -> *mut libc::c_void {
        if self.len == 0 {
            std::ptr::null_mut()
        } else {
            self.words.as_mut_ptr().cast()
        }
    }
}

/// Take ownership of every descriptor carried in `msg`'s control messages.
///
/// Control messages other than `SOL_SOCKET`/`SCM_RIGHTS` are skipped.
///
/// # Safety
///
/// `msg` must describe a control buffer just filled by a successful
/// `recvmsg(2)`, and its descriptors must not already be owned elsewhere.
pub unsafe fn decode_rights(msg: &libc::msghdr) -> Vec<OwnedFd> {
    let mut fds = Vec::new();
    if msg.msg_control.is_null() || msg.msg_controllen == 0 {
        return fds;
    }

    let header_len = rights_len(0);
    // SAFETY: forwarded to the caller; the kernel wrote valid headers and
    // CMSG_NXTHDR stops at the end of msg_controllen.
    unsafe {
        let mut cmsg = libc::CMSG_FIRSTHDR(msg);
        while !cmsg.is_null() {
            if (*cmsg).cmsg_level == libc::SOL_SOCKET && (*cmsg).cmsg_type == libc::SCM_RIGHTS {
                let data_len = ((*cmsg).cmsg_len as usize).saturating_sub(header_len);
                let count = data_len / mem::size_of::<RawFd>();
                let data = libc::CMSG_DATA(cmsg).cast::<RawFd>();
                for i in 0..count {
                    let raw = data.add(i).read_unaligned();
                    fds.push(OwnedFd::from_raw_fd(raw));
                }
            }
            cmsg = libc::CMSG_NXTHDR(msg, cmsg);
        }
    }
    fds
}
