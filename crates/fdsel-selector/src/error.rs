use crate::token::Token;

/// Errors that can occur in selector operations.
#[derive(Debug, thiserror::Error)]
pub enum SelectorError {
    /// The token is already registered.
    #[error("{0:?} is already registered")]
    DuplicateRegistration(Token),

    /// The arena has no handle for the token.
    #[error("no handle for {0:?}")]
    UnknownHandle(Token),

    /// `poll(2)` failed. Readiness from the previous poll is left in place.
    #[error("poll failed: {0}")]
    Poll(std::io::Error),
}

impl SelectorError {
    /// The OS error code carried by this error, if any.
    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            SelectorError::Poll(err) => err.raw_os_error(),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, SelectorError>;
