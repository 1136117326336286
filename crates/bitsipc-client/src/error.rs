use std::time::Duration;

/// Errors that can occur in client operations.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Transport-level error (socket creation, connect, timeouts).
    #[error("transport error: {0}")]
    Transport(#[from] bitsipc_transport::TransportError),

    /// Frame-level error, including incomplete writes.
    #[error("frame error: {0}")]
    Frame(#[from] bitsipc_frame::FrameError),

    /// JSON serialization/deserialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// A well-formed JSON document that is not a bits-ipc message.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The client configuration is unusable.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The client has not been started or has been stopped.
    #[error("not connected to the message center")]
    NotConnected,

    /// `start` was called on a running client.
    #[error("client already started")]
    AlreadyStarted,

    /// Another context is already reading from the connection.
    #[error("dispatch loop is already reading from the connection")]
    ReaderBusy,

    /// A blocking request was issued from inside the dispatch loop.
    #[error("request issued from the dispatch thread would never see its response")]
    ReentrantRequest,

    /// A request id is already waiting for a response.
    #[error("request id {0} is already outstanding")]
    DuplicateRequestId(String),

    /// Request timed out.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// Request was cancelled before a response arrived.
    #[error("request cancelled")]
    Cancelled,

    /// Connection to the message center ended.
    #[error("disconnected: {0}")]
    Disconnected(String),

    /// The remote request handler reported an error.
    #[error("remote error: {0}")]
    Remote(serde_json::Value),
}

pub type Result<T> = std::result::Result<T, ClientError>;
