//! Open file descriptor passing over Unix domain sockets.
//!
//! A message carries a byte payload plus zero or more descriptors encoded as a
//! single `SOL_SOCKET`/`SCM_RIGHTS` control message:
//!
//! ```text
//! sendmsg(2) ──► iov[0]      payload bytes (must not be empty)
//!                msg_control cmsghdr { level: SOL_SOCKET, type: SCM_RIGHTS,
//!                                      len: CMSG_LEN(n * sizeof(int)) }
//!                            int fds[n]
//! ```
//!
//! The kernel duplicates the descriptors into the receiving process. Sending
//! never consumes the sender's descriptors: they are borrowed, and the sender
//! closes its own copies when it no longer needs them.

pub mod channel;
pub mod codec;
pub mod error;

pub use channel::{DescriptorChannel, FdPassConfig, Received, DEFAULT_BUFFER_CAPACITY};
pub use codec::{rights_space, ControlBuffer, MAX_FDS_PER_MESSAGE};
pub use error::{FdPassError, Result};
