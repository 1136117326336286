use bytes::{Buf, Bytes, BytesMut};
use tracing::debug;

use crate::codec::{decode_frame, find_delimiter, DEFAULT_MAX_PAYLOAD};
use crate::error::{FrameError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;

/// Incrementally rebuilds delimited payloads from arbitrary byte batches.
///
/// Bytes are appended with [`push`](Self::push); complete payloads are taken
/// with [`next_frame`](Self::next_frame) in arrival order. A batch may carry
/// part of a payload, several payloads, or the tail of one and the head of
/// the next.
///
/// When a payload grows past the size limit it is reported once as
/// [`FrameError::PayloadTooLarge`] and its bytes are dropped up to the next
/// delimiter, so the accumulator stays bounded and the stream resynchronises
/// on the following payload.
#[derive(Debug)]
pub struct Reassembler {
    buf: BytesMut,
    max_payload: usize,
    discarding: bool,
}

impl Reassembler {
    /// Create a reassembler with the default payload limit.
    pub fn new() -> Self {
        Self::with_max_payload(DEFAULT_MAX_PAYLOAD)
    }

    /// Create a reassembler with an explicit payload limit.
    pub fn with_max_payload(max_payload: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            max_payload,
            discarding: false,
        }
    }

    /// Append newly read bytes.
    pub fn push(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Take the next complete payload, if one is buffered.
    pub fn next_frame(&mut self) -> Result<Option<Bytes>> {
        if self.discarding {
            match find_delimiter(&self.buf) {
                Some(idx) => {
                    self.buf.advance(idx + 1);
                    self.discarding = false;
                    debug!("resynchronised after oversized payload");
                }
                None => {
                    self.buf.clear();
                    return Ok(None);
                }
            }
        }

        match decode_frame(&mut self.buf, self.max_payload) {
            Err(FrameError::PayloadTooLarge { size, max }) => {
                if find_delimiter(&self.buf).is_none() && self.buf.len() > max {
                    self.buf.clear();
                    self.discarding = true;
                }
                Err(FrameError::PayloadTooLarge { size, max })
            }
            other => other,
        }
    }

    /// Number of bytes waiting for a delimiter.
    pub fn buffered_len(&self) -> usize {
        self.buf.len()
    }

    /// Drop any buffered partial payload.
    pub fn clear(&mut self) {
        self.buf.clear();
        self.discarding = false;
    }
}

impl Default for Reassembler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(r: &mut Reassembler) -> Vec<Vec<u8>> {
        let mut out = Vec::new();
        while let Some(frame) = r.next_frame().unwrap() {
            out.push(frame.to_vec());
        }
        out
    }

    #[test]
    fn split_at_every_offset_yields_both_messages() {
        let wire = b"{\"type\":\"bits-ipc\",\"data\":{\"n\":1}}\x0c{\"type\":\"bits-ipc\",\"data\":{\"n\":2}}\x0c";

        for split in 0..=wire.len() {
            let mut r = Reassembler::new();
            let mut seen = Vec::new();

            r.push(&wire[..split]);
            seen.extend(drain(&mut r));
            r.push(&wire[split..]);
            seen.extend(drain(&mut r));

            assert_eq!(
                seen,
                vec![
                    b"{\"type\":\"bits-ipc\",\"data\":{\"n\":1}}".to_vec(),
                    b"{\"type\":\"bits-ipc\",\"data\":{\"n\":2}}".to_vec(),
                ],
                "split at {split}"
            );
            assert_eq!(r.buffered_len(), 0);
        }
    }

    #[test]
    fn byte_by_byte_feed() {
        let wire = b"alpha\x0cbeta\x0cgamma\x0c";
        let mut r = Reassembler::new();
        let mut seen = Vec::new();
        for byte in wire {
            r.push(std::slice::from_ref(byte));
            seen.extend(drain(&mut r));
        }
        assert_eq!(
            seen,
            vec![b"alpha".to_vec(), b"beta".to_vec(), b"gamma".to_vec()]
        );
    }

    #[test]
    fn partial_message_waits_for_delimiter() {
        let mut r = Reassembler::new();
        r.push(b"done\x0cpart");
        assert_eq!(r.next_frame().unwrap().unwrap().as_ref(), b"done");
        assert!(r.next_frame().unwrap().is_none());
        assert_eq!(r.buffered_len(), 4);

        r.push(b"ial\x0c");
        assert_eq!(r.next_frame().unwrap().unwrap().as_ref(), b"partial");
    }

    #[test]
    fn oversized_unterminated_payload_is_skipped() {
        let mut r = Reassembler::with_max_payload(8);
        r.push(b"0123456789abc");
        assert!(matches!(
            r.next_frame(),
            Err(FrameError::PayloadTooLarge { .. })
        ));
        assert_eq!(r.buffered_len(), 0);

        // Rest of the oversized payload, then a good one.
        r.push(b"def\x0cok\x0c");
        assert_eq!(r.next_frame().unwrap().unwrap().as_ref(), b"ok");
        assert!(r.next_frame().unwrap().is_none());
    }

    #[test]
    fn oversized_terminated_payload_is_skipped() {
        let mut r = Reassembler::with_max_payload(4);
        r.push(b"too-long\x0cok\x0c");
        assert!(matches!(
            r.next_frame(),
            Err(FrameError::PayloadTooLarge { size: 8, max: 4 })
        ));
        assert_eq!(r.next_frame().unwrap().unwrap().as_ref(), b"ok");
    }

    #[test]
    fn clear_resets_state() {
        let mut r = Reassembler::with_max_payload(2);
        r.push(b"xyz");
        let _ = r.next_frame();
        r.clear();
        r.push(b"ab\x0c");
        assert_eq!(r.next_frame().unwrap().unwrap().as_ref(), b"ab");
    }
}
