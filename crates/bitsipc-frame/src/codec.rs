use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};

/// Message delimiter used by node-ipc: form-feed.
pub const DELIMITER: u8 = 0x0C;

/// Default maximum payload size: 16 MiB.
pub const DEFAULT_MAX_PAYLOAD: usize = 16 * 1024 * 1024;

/// Position of the first delimiter byte in `buf`, if any.
pub fn find_delimiter(buf: &[u8]) -> Option<usize> {
    buf.iter().position(|&b| b == DELIMITER)
}

/// Encode a payload into the wire format.
///
/// Wire format:
/// ```text
/// ┌──────────────────────────┬───────────┐
/// │ Payload (UTF-8 JSON)     │ 0x0C      │
/// └──────────────────────────┴───────────┘
/// ```
pub fn encode_frame(payload: &[u8], dst: &mut BytesMut) -> Result<()> {
    if let Some(offset) = find_delimiter(payload) {
        return Err(FrameError::DelimiterInPayload { offset });
    }
    dst.reserve(payload.len() + 1);
    dst.put_slice(payload);
    dst.put_u8(DELIMITER);
    Ok(())
}

/// Decode one payload from the front of a buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a delimiter yet. On
/// success the payload and its delimiter are removed from `src`; any bytes
/// after the delimiter stay in place for the next call.
///
/// A complete payload longer than `max_payload` is consumed and reported as
/// [`FrameError::PayloadTooLarge`]. An unterminated buffer that already
/// exceeds `max_payload` is reported without consuming anything.
pub fn decode_frame(src: &mut BytesMut, max_payload: usize) -> Result<Option<Bytes>> {
    match find_delimiter(src) {
        Some(idx) => {
            let payload = src.split_to(idx).freeze();
            src.advance(1);
            if payload.len() > max_payload {
                return Err(FrameError::PayloadTooLarge {
                    size: payload.len(),
                    max: max_payload,
                });
            }
            Ok(Some(payload))
        }
        None if src.len() > max_payload => Err(FrameError::PayloadTooLarge {
            size: src.len(),
            max: max_payload,
        }),
        None => Ok(None), // Need more data
    }
}

/// Configuration for the frame codec.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum payload size in bytes. Default: 16 MiB.
    pub max_payload_size: usize,
    /// Read timeout for blocking operations.
    pub read_timeout: Option<std::time::Duration>,
    /// Write timeout for blocking operations.
    pub write_timeout: Option<std::time::Duration>,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_payload_size: DEFAULT_MAX_PAYLOAD,
            read_timeout: None,
            write_timeout: None,
        }
    }
}
