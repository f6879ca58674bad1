use bytes::{BufMut, Bytes, BytesMut};
use tracing::{debug, trace};

use crate::error::{FrameError, Result};

/// Frame delimiter.
pub const FLAG: u8 = 0x7E;

/// Escape byte.
pub const ESC: u8 = 0x7D;

/// XOR mask applied to an escaped byte.
pub const ESC_MASK: u8 = 0x20;

/// Default maximum decoded frame size: 64 KiB.
pub const DEFAULT_MAX_FRAME: usize = 64 * 1024;

/// Append the byte-stuffed form of `payload` to `dst`.
///
/// Every `FLAG` and `ESC` byte becomes `ESC, byte ^ ESC_MASK`.
pub fn escape_into(payload: &[u8], dst: &mut BytesMut) {
    let extra = payload.iter().filter(|&&b| b == FLAG || b == ESC).count();
    dst.reserve(payload.len() + extra);
    for &b in payload {
        if b == FLAG || b == ESC {
            dst.put_u8(ESC);
            dst.put_u8(b ^ ESC_MASK);
        } else {
            dst.put_u8(b);
        }
    }
}

/// Encode a frame into the wire format.
///
/// Wire format:
/// ```text
/// ┌────────┬──────────────────────────────┬────────┐
/// │ 0x7E   │ Payload, 0x7E/0x7D stuffed   │ 0x7E   │
/// │        │ as 0x7D (b ^ 0x20)           │        │
/// └────────┴──────────────────────────────┴────────┘
/// ```
pub fn encode_frame(payload: &[u8], dst: &mut BytesMut) {
    dst.reserve(payload.len() + 2);
    dst.put_u8(FLAG);
    escape_into(payload, dst);
    dst.put_u8(FLAG);
}

/// Decode exactly one encoded frame.
///
/// This is the inverse of [`encode_frame`]: `framed` must start and end with
/// `FLAG`, contain no bare `FLAG` in between, and only escape `FLAG` or `ESC`.
/// An empty frame (`7E 7E`) decodes to an empty payload.
pub fn decode_frame(framed: &[u8]) -> Result<Bytes> {
    if framed.len() < 2 || framed[0] != FLAG || framed[framed.len() - 1] != FLAG {
        return Err(FrameError::MissingDelimiter);
    }

    let inner = &framed[1..framed.len() - 1];
    let mut out = BytesMut::with_capacity(inner.len());
    let mut bytes = inner.iter();
    while let Some(&b) = bytes.next() {
        match b {
            FLAG => return Err(FrameError::MissingDelimiter),
            ESC => {
                let next = *bytes.next().ok_or(FrameError::IncompleteEscape)?;
                let unescaped = next ^ ESC_MASK;
                if unescaped != FLAG && unescaped != ESC {
                    return Err(FrameError::InvalidEscape(next));
                }
                out.put_u8(unescaped);
            }
            other => out.put_u8(other),
        }
    }
    Ok(out.freeze())
}

/// Configuration for the frame decoder.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum decoded frame size in bytes. Default: 64 KiB.
    pub max_frame_size: usize,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_frame_size: DEFAULT_MAX_FRAME,
        }
    }
}

/// Where the decoder is within the byte stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderState {
    /// Between frames, waiting for a delimiter.
    Idle,
    /// Inside a frame, accumulating payload.
    InFrame,
    /// The previous byte was an escape.
    Escaped,
}

/// Diagnostic counters kept by [`FrameDecoder`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecoderStats {
    /// Frames emitted.
    pub frames: u64,
    /// Frames discarded because of a bad escape sequence.
    pub malformed: u64,
    /// Frames discarded for exceeding `max_frame_size`.
    pub oversized: u64,
    /// Bytes seen outside of any frame.
    pub noise_bytes: u64,
}

/// Streaming decoder that recovers frames from a serial byte stream.
///
/// Bytes may arrive in arbitrary chunks; a frame split across calls is
/// completed on a later call. Empty frames are treated as inter-frame
/// padding and never emitted. Malformed input resets the decoder and
/// discards the frame in progress; decoding never fails.
#[derive(Debug)]
pub struct FrameDecoder {
    state: DecoderState,
    buf: BytesMut,
    config: FrameConfig,
    stats: DecoderStats,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::with_config(FrameConfig::default())
    }

    pub fn with_config(config: FrameConfig) -> Self {
        Self {
            state: DecoderState::Idle,
            buf: BytesMut::new(),
            config,
            stats: DecoderStats::default(),
        }
    }

    /// Feed one byte, returning a frame if it completed one.
    pub fn push(&mut self, byte: u8) -> Option<Bytes> {
        match (self.state, byte) {
            (DecoderState::Idle, FLAG) => {
                self.buf.clear();
                self.state = DecoderState::InFrame;
                None
            }
            (DecoderState::Idle, _) => {
                self.stats.noise_bytes += 1;
                None
            }
            (DecoderState::InFrame, FLAG) => {
                if self.buf.is_empty() {
                    return None;
                }
                self.state = DecoderState::Idle;
                self.stats.frames += 1;
                trace!(len = self.buf.len(), "frame decoded");
                Some(self.buf.split().freeze())
            }
            (DecoderState::InFrame, ESC) => {
                self.state = DecoderState::Escaped;
                None
            }
            (DecoderState::InFrame, b) => {
                self.append(b);
                None
            }
            (DecoderState::Escaped, FLAG | ESC) => {
                debug!(
                    byte,
                    discarded = self.buf.len(),
                    "malformed escape, frame discarded"
                );
                self.stats.malformed += 1;
                self.reset();
                None
            }
            (DecoderState::Escaped, b) => {
                self.state = DecoderState::InFrame;
                self.append(b ^ ESC_MASK);
                None
            }
        }
    }

    /// Feed a chunk of bytes, returning every frame it completed in order.
    pub fn decode(&mut self, src: &[u8]) -> Vec<Bytes> {
        src.iter().filter_map(|&b| self.push(b)).collect()
    }

    fn append(&mut self, b: u8) {
        if self.buf.len() >= self.config.max_frame_size {
            debug!(max = self.config.max_frame_size, "oversized frame discarded");
            self.stats.oversized += 1;
            self.reset();
            return;
        }
        self.buf.put_u8(b);
    }

    /// Drop any frame in progress and return to `Idle`.
    pub fn reset(&mut self) {
        self.buf.clear();
        self.state = DecoderState::Idle;
    }

    pub fn state(&self) -> DecoderState {
        self.state
    }

    pub fn stats(&self) -> DecoderStats {
        self.stats
    }

    /// Bytes buffered for the frame in progress.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Current decoder configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}
