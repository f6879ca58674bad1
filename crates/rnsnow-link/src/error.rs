/// Errors raised while parsing or building radio packets.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PacketError {
    /// The packet is shorter than its fixed header.
    #[error("packet too short ({len} bytes)")]
    TooShort { len: usize },

    /// The packet belongs to another group.
    #[error("group id mismatch")]
    GroupMismatch,

    /// The frame type byte is not recognized.
    #[error("unknown frame type {0}")]
    UnknownFrameType(u8),

    /// The fragment index/count pair is inconsistent.
    #[error("invalid fragment {index} of {count}")]
    InvalidFragment { index: u8, count: u8 },

    /// The payload does not fit in one radio packet.
    #[error("payload too large ({size} bytes, max {max})")]
    TooLarge { size: usize, max: usize },

    /// A group id that is not exactly five ASCII bytes.
    #[error("invalid group id {0:?} (expected 5 ASCII characters)")]
    InvalidGroupId(String),

    /// A control frame payload could not be parsed.
    #[error("malformed {0} control payload")]
    MalformedControl(&'static str),
}

/// Errors that can occur in link operations.
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] rnsnow_transport::TransportError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] rnsnow_frame::FrameError),

    /// Packet-level error.
    #[error("packet error: {0}")]
    Packet(#[from] PacketError),

    /// A frame needs more fragments than the header can count.
    #[error("frame too large to fragment ({size} bytes, max {max})")]
    FrameTooLarge { size: usize, max: usize },

    /// Invalid link configuration.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// JSON serialization/deserialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error outside of framing (config files, readers).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, LinkError>;
