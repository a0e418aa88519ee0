//! Owned descriptor handles and Unix domain socket endpoints.
//!
//! This is the lowest layer of fdsel. It provides:
//! - [`FdHandle`], a move-only owner of one file descriptor that also carries
//!   the interest and readiness bits a selector works with
//! - [`UnixSocket`], a handle specialised for Unix domain sockets
//!   (bind/listen, connect, accept, socket options, send/recv)
//! - [`Selectable`], the capability trait a selector polls through
//!
//! Everything else builds on the types exported here.

pub mod error;
pub mod interest;

#[cfg(unix)]
pub mod handle;
#[cfg(unix)]
pub mod traits;
#[cfg(unix)]
pub mod uds;

pub use error::{Result, TransportError};
pub use interest::Interest;

#[cfg(unix)]
pub use handle::FdHandle;
#[cfg(unix)]
pub use traits::Selectable;
#[cfg(unix)]
pub use uds::{BindConfig, SocketType, UnixSocket, DEFAULT_BACKLOG};
