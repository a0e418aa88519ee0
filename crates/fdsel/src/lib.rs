//! Readiness polling and descriptor passing over Unix domain sockets.
//!
//! # Crate Structure
//!
//! - [`transport`]: owned descriptors, interest bits and Unix domain sockets
//! - [`fdpass`]: `SCM_RIGHTS` descriptor passing alongside a payload
//! - [`selector`]: single-threaded `poll(2)` selector over caller-owned handles

/// Re-export transport types.
pub mod transport {
    pub use fdsel_transport::*;
}

/// Re-export descriptor passing types.
pub mod fdpass {
    pub use fdsel_fdpass::*;
}

/// Re-export selector types.
pub mod selector {
    pub use fdsel_selector::*;
}
