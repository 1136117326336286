//! Client for the BITS message center over local IPC.
//!
//! The message center routes JSON events and requests between processes.
//! This crate re-exports the layers that talk to it:
//!
//! # Crate Structure
//!
//! - [`transport`]: Unix domain socket connection to the message center
//! - [`frame`]: form-feed delimited message framing
//! - [`client`]: events, correlated requests and listener dispatch (behind `client` feature)

/// Re-export transport types.
pub mod transport {
    pub use bitsipc_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use bitsipc_frame::*;
}

/// Re-export client types (requires `client` feature).
#[cfg(feature = "client")]
pub mod client {
    pub use bitsipc_client::*;
}
