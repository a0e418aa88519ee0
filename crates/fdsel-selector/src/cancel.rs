use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared stop flag for a polling loop.
///
/// Clones observe the same flag. A signal handler calls
/// [`cancel`](CancellationToken::cancel); the loop checks
/// [`is_cancelled`](CancellationToken::is_cancelled) between polls, so the
/// poll timeout bounds how long a stop request can go unnoticed.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}
