//! Single-threaded readiness selector over caller-owned handles.
//!
//! The caller keeps its handles in an arena (a `Vec`, or a `slab::Slab` with
//! the default `slab` feature) and registers them by [`Token`]. The
//! [`Selector`] never owns a handle: it reads each handle's descriptor and
//! interest through [`Selectable`](fdsel_transport::Selectable), waits in
//! `poll(2)`, and writes the observed readiness back.
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use fdsel_selector::{CancellationToken, Selector, Token};
//! use fdsel_transport::{Interest, Selectable, UnixSocket};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut sockets = vec![UnixSocket::bind("\0example.sock")?];
//! let mut selector = Selector::new();
//! selector.register(&mut sockets, Token(0), Interest::ACCEPT)?;
//!
//! let cancel = CancellationToken::new();
//! while !cancel.is_cancelled() {
//!     if selector.poll(&mut sockets, Some(Duration::from_millis(500)))? == 0 {
//!         continue;
//!     }
//!     for token in selector.selected().to_vec() {
//!         if sockets[token.0].is_acceptable() {
//!             let client = sockets[token.0].accept()?;
//!             sockets.push(client);
//!             let token = Token(sockets.len() - 1);
//!             selector.register(&mut sockets, token, Interest::READ)?;
//!         }
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod cancel;
pub mod error;
pub mod selector;
pub mod token;

pub use cancel::CancellationToken;
pub use error::{Result, SelectorError};
pub use selector::Selector;
pub use token::{Handles, Token};
