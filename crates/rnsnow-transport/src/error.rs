/// Errors that can occur at the radio or serial boundary.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to bind the local endpoint.
    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },

    /// An I/O error occurred on the underlying device or socket.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The requested radio channel is outside the supported range.
    #[error("invalid radio channel {0} (expected 1-14)")]
    InvalidChannel(u8),

    /// The serial baud rate is not a standard rate.
    #[error("unsupported baud rate {0}")]
    InvalidBaud(u32),

    /// The packet does not fit in a single radio transmission.
    #[error("packet too large ({size} bytes, max {max})")]
    PacketTooLarge { size: usize, max: usize },

    /// The radio refused or failed to transmit a packet.
    #[error("radio send failed: {0}")]
    SendFailed(String),

    /// Failed to open a serial device.
    #[cfg(feature = "serial")]
    #[error("failed to open serial port {path}: {source}")]
    Serial {
        path: String,
        source: serialport::Error,
    },

    /// The transport has been shut down.
    #[error("transport closed")]
    Closed,
}

pub type Result<T> = std::result::Result<T, TransportError>;
