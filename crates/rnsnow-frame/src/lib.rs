//! HDLC-style framing for the serial link.
//!
//! Frames on the serial side are delimited and byte-stuffed:
//! - `0x7E` marks the start and end of every frame
//! - `0x7D` escapes the next byte, which is XORed with `0x20`
//!
//! [`FrameDecoder`] recovers frame boundaries from a continuous byte stream
//! one chunk at a time. [`FrameWriter`] writes encoded frames to any `Write`.

pub mod codec;
pub mod error;
pub mod writer;

pub use codec::{
    decode_frame, encode_frame, escape_into, DecoderState, DecoderStats, FrameConfig,
    FrameDecoder, DEFAULT_MAX_FRAME, ESC, ESC_MASK, FLAG,
};
pub use error::{FrameError, Result};
pub use writer::FrameWriter;
