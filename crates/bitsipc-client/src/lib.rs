//! Client for the BITS message center.
//!
//! This is the "just works" layer. Connect to the message center socket,
//! send events and requests, and register listeners for the events and
//! requests it routes back to this process.

pub mod client;
pub mod config;
pub mod connector;
pub mod correlation;
pub mod dispatch;
pub mod error;
pub mod listeners;
pub mod message;
pub mod stats;

pub use client::{Client, DispatchMode};
pub use config::ClientConfig;
pub use connector::Connection;
pub use correlation::{CorrelationRegistry, PendingResponse, RequestCanceller};
pub use dispatch::MessageSink;
pub use error::{ClientError, Result};
pub use listeners::{EventCallback, ListenerRegistry, RequestHandler};
pub use message::{decode, encode, Envelope, Message, Scopes, ENVELOPE_TYPE};
pub use stats::{ClientStats, StatsSnapshot};
