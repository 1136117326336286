use std::io::{ErrorKind, Read};

use bitsipc_transport::IpcStream;
use bytes::Bytes;

use crate::codec::FrameConfig;
use crate::error::{FrameError, Result};
use crate::reassembler::Reassembler;

const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Reads complete delimited payloads from any `Read` stream.
///
/// Handles partial reads internally; callers always get complete payloads.
/// A read timeout on the underlying stream surfaces as an
/// [`FrameError::Io`] for which [`FrameError::is_timeout`] is true; buffered
/// bytes are kept, so the call can simply be repeated.
pub struct FrameReader<T> {
    inner: T,
    reassembler: Reassembler,
    config: FrameConfig,
}

impl<T: Read> FrameReader<T> {
    /// Create a new frame reader with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame reader with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            reassembler: Reassembler::with_max_payload(config.max_payload_size),
            config,
        }
    }

    /// Read the next complete payload (blocking).
    ///
    /// Returns `Err(FrameError::ConnectionClosed)` when EOF is reached.
    pub fn read_frame(&mut self) -> Result<Bytes> {
        loop {
            if let Some(frame) = self.reassembler.next_frame()? {
                return Ok(frame);
            }

            let mut chunk = [0u8; READ_CHUNK_SIZE];
            let read = match self.inner.read(&mut chunk) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            };

            if read == 0 {
                return Err(FrameError::ConnectionClosed);
            }

            self.reassembler.push(&chunk[..read]);
        }
    }

    /// Bytes received but not yet terminated by a delimiter.
    pub fn buffered_len(&self) -> usize {
        self.reassembler.buffered_len()
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Current frame reader configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

impl FrameReader<IpcStream> {
    /// Create a frame reader for `IpcStream` and apply read timeout from config.
    pub fn with_config_ipc(inner: IpcStream, config: FrameConfig) -> Result<Self> {
        inner
            .set_read_timeout(config.read_timeout)
            .map_err(transport_to_frame_error)?;
        Ok(Self::with_config(inner, config))
    }
}

pub(crate) fn transport_to_frame_error(err: bitsipc_transport::TransportError) -> FrameError {
    match err {
        bitsipc_transport::TransportError::Io(io) => FrameError::Io(io),
        bitsipc_transport::TransportError::Connect { source, .. } => FrameError::Io(source),
        other => FrameError::Io(std::io::Error::other(other.to_string())),
    }
}
