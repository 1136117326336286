//! Unix domain socket transport for the BITS message center client.
//!
//! This is the lowest layer of bitsipc: it opens the stream socket the
//! message center listens on and hands back an [`IpcStream`] that the
//! framing layer reads and writes.

pub mod error;
pub mod traits;

#[cfg(unix)]
pub mod uds;

pub use error::{Result, TransportError};
pub use traits::IpcStream;

#[cfg(unix)]
pub use uds::UnixDomainSocket;
