/// Errors that can occur while passing descriptors.
#[derive(Debug, thiserror::Error)]
pub enum FdPassError {
    /// The underlying `sendmsg`/`recvmsg` failed, or sent nothing.
    #[error("descriptor passing I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The peer sent more descriptors than the receiver reserved room for.
    ///
    /// Descriptors that did arrive have been closed.
    #[error("ancillary data truncated (room for {max_fds} descriptors)")]
    Truncated { max_fds: usize },

    /// The message payload did not fit the receive buffer (datagram and
    /// sequenced-packet sockets only).
    #[error("message payload truncated (buffer capacity {capacity} bytes)")]
    PayloadTruncated { capacity: usize },

    /// More descriptors than one message can carry.
    #[error("too many descriptors ({count}, max {max})")]
    TooManyDescriptors { count: usize, max: usize },

    /// The peer closed the connection before sending a message.
    #[error("connection closed")]
    ConnectionClosed,
}

impl FdPassError {
    /// The OS error code carried by this error, if any.
    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            FdPassError::Io(err) => err.raw_os_error(),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, FdPassError>;
