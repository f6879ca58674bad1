//! Serial device helpers.
//!
//! Baud validation is always available so configuration can be checked on
//! any build. Opening a device requires the `serial` feature.

use crate::error::{Result, TransportError};

/// Standard Hayes rates plus the common high speeds.
pub const VALID_BAUD_RATES: [u32; 12] = [
    300, 1200, 2400, 4800, 9600, 19200, 38400, 57600, 115200, 230400, 460800, 921600,
];

/// Default serial rate.
pub const DEFAULT_BAUD_RATE: u32 = 115200;

/// Check that `baud` is one of [`VALID_BAUD_RATES`].
pub fn validate_baud(baud: u32) -> Result<u32> {
    if VALID_BAUD_RATES.contains(&baud) {
        Ok(baud)
    } else {
        Err(TransportError::InvalidBaud(baud))
    }
}

/// Open a serial device as 8N1 at `baud`.
///
/// Reads time out after `read_timeout` so that a reader thread can notice
/// shutdown; timeouts surface as `ErrorKind::TimedOut` on the port.
#[cfg(feature = "serial")]
pub fn open(
    path: &str,
    baud: u32,
    read_timeout: std::time::Duration,
) -> Result<Box<dyn serialport::SerialPort>> {
    validate_baud(baud)?;
    tracing::debug!(path, baud, "opening serial port");
    let port = serialport::new(path, baud)
        .timeout(read_timeout)
        .data_bits(serialport::DataBits::Eight)
        .stop_bits(serialport::StopBits::One)
        .parity(serialport::Parity::None)
        .flow_control(serialport::FlowControl::None)
        .open()
        .map_err(|e| TransportError::Serial {
            path: path.to_string(),
            source: e,
        })?;
    tracing::info!(path, baud, "serial port open");
    Ok(port)
}
