/// Errors that can occur during frame encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The buffer does not start and end with a frame delimiter.
    #[error("frame is not enclosed in 0x7E delimiters")]
    MissingDelimiter,

    /// The frame ends immediately after an escape byte.
    #[error("frame ends inside an escape sequence")]
    IncompleteEscape,

    /// An escape byte is followed by a byte that was never escaped.
    #[error("invalid escape sequence 0x7D 0x{0:02X}")]
    InvalidEscape(u8),

    /// The frame exceeds the configured maximum size.
    #[error("frame too large ({size} bytes, max {max})")]
    FrameTooLarge { size: usize, max: usize },

    /// An I/O error occurred while writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The serial stream was closed.
    #[error("connection closed")]
    ConnectionClosed,
}

impl FrameError {
    /// Whether the stream is gone, as opposed to a frame that failed to go
    /// out.
    pub fn is_disconnect(&self) -> bool {
        match self {
            FrameError::ConnectionClosed => true,
            FrameError::Io(err) => matches!(
                err.kind(),
                std::io::ErrorKind::BrokenPipe | std::io::ErrorKind::ConnectionReset
            ),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, FrameError>;

#[cfg(test)]
mod tests {
    use std::io::{Error, ErrorKind};

    use super::*;

    #[test]
    fn disconnects_are_told_apart_from_transient_failures() {
        assert!(FrameError::ConnectionClosed.is_disconnect());
        assert!(FrameError::Io(Error::from(ErrorKind::BrokenPipe)).is_disconnect());
        assert!(!FrameError::Io(Error::from(ErrorKind::TimedOut)).is_disconnect());
        assert!(!FrameError::FrameTooLarge { size: 2, max: 1 }.is_disconnect());
    }
}
