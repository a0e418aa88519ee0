use std::path::PathBuf;

/// Errors that can occur on descriptor handles and socket endpoints.
///
/// Every variant that wraps an [`std::io::Error`] keeps the OS error code of
/// the failing syscall.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to create, bind or listen on the specified address.
    #[error("failed to bind to {path}: {source}")]
    Bind {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to create a socket or connect it to the specified address.
    #[error("failed to connect to {path}: {source}")]
    Connect {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to accept an incoming connection.
    #[error("failed to accept connection: {0}")]
    Accept(std::io::Error),

    /// Any other syscall failure on an owned descriptor.
    #[error("descriptor I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The socket path does not fit the platform address structure.
    #[error("socket path too long ({len} bytes, max {max}): {path}")]
    PathTooLong {
        path: PathBuf,
        len: usize,
        max: usize,
    },

    /// The handle does not own a descriptor (never opened, closed or released).
    #[error("handle has no open descriptor")]
    NotOpen,
}

impl TransportError {
    /// The OS error code carried by this error, if any.
    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            TransportError::Bind { source, .. }
            | TransportError::Connect { source, .. }
            | TransportError::Accept(source)
            | TransportError::Io(source) => source.raw_os_error(),
            TransportError::PathTooLong { .. } | TransportError::NotOpen => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, TransportError>;
