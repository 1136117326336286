use std::io::ErrorKind;

/// Errors that can occur during frame encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The payload exceeds the configured maximum size.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// The payload contains the reserved delimiter byte.
    #[error("payload contains the frame delimiter at offset {offset}")]
    DelimiterInPayload { offset: usize },

    /// The stream failed after part of a frame was written.
    ///
    /// The peer has seen a truncated frame; the message counts as not delivered.
    #[error("incomplete frame write ({written} of {total} bytes): {source}")]
    PartialWrite {
        written: usize,
        total: usize,
        source: std::io::Error,
    },

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The connection was closed by the peer.
    #[error("connection closed")]
    ConnectionClosed,
}

impl FrameError {
    /// True when a read timed out without completing a frame.
    ///
    /// Buffered bytes are kept; the read can simply be retried.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            FrameError::Io(err) if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut)
        )
    }
}

pub type Result<T> = std::result::Result<T, FrameError>;
