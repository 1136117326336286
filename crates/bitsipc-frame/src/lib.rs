//! Form-feed delimited message framing for the BITS message center protocol.
//!
//! Every message on the wire is a UTF-8 JSON document followed by a single
//! `0x0C` byte. JSON encoders escape control characters inside strings, so
//! the delimiter never occurs inside a payload.
//!
//! Partial reads and multi-message reads are handled by [`Reassembler`];
//! callers of [`FrameReader`] only ever see complete payloads.

pub mod codec;
pub mod error;
pub mod reader;
pub mod reassembler;
pub mod writer;

pub use codec::{decode_frame, encode_frame, find_delimiter, FrameConfig, DEFAULT_MAX_PAYLOAD, DELIMITER};
pub use error::{FrameError, Result};
pub use reader::FrameReader;
pub use reassembler::Reassembler;
pub use writer::FrameWriter;
