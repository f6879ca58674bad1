use bytes::Bytes;

use crate::error::PacketError;
use crate::packet::FrameType;

/// Length of the nonce carried by probes and acks.
pub const NONCE_LEN: usize = 2;

/// Link-local control message.
///
/// Control frames never reach the serial link. Probes and acks carry a
/// big-endian nonce so an ack can be matched to the probe it answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlFrame {
    /// Liveness announcement; not answered.
    Ping,
    /// Channel probe sent during discovery.
    Probe { nonce: u16 },
    /// Answer to a probe, echoing its nonce.
    Ack { nonce: u16 },
}

impl ControlFrame {
    /// Create a ping message.
    pub fn ping() -> Self {
        Self::Ping
    }

    /// Create a probe message.
    pub fn probe(nonce: u16) -> Self {
        Self::Probe { nonce }
    }

    /// Create the acknowledgement for a probe.
    pub fn ack(nonce: u16) -> Self {
        Self::Ack { nonce }
    }

    pub fn frame_type(&self) -> FrameType {
        match self {
            Self::Ping => FrameType::Ping,
            Self::Probe { .. } => FrameType::Probe,
            Self::Ack { .. } => FrameType::Ack,
        }
    }

    /// Payload bytes that follow the packet header.
    pub fn payload(&self) -> Bytes {
        match self {
            Self::Ping => Bytes::new(),
            Self::Probe { nonce } | Self::Ack { nonce } => {
                Bytes::copy_from_slice(&nonce.to_be_bytes())
            }
        }
    }

    /// Parse a reassembled control frame.
    pub fn parse(frame_type: FrameType, payload: &[u8]) -> Result<Self, PacketError> {
        let nonce = || -> Result<u16, PacketError> {
            match payload {
                [hi, lo, ..] => Ok(u16::from_be_bytes([*hi, *lo])),
                _ => Err(PacketError::MalformedControl(frame_type.as_str())),
            }
        };
        match frame_type {
            FrameType::Ping => Ok(Self::Ping),
            FrameType::Probe => Ok(Self::Probe { nonce: nonce()? }),
            FrameType::Ack => Ok(Self::Ack { nonce: nonce()? }),
            FrameType::Data => Err(PacketError::MalformedControl("data")),
        }
    }
}
