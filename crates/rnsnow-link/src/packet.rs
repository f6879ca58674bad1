use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

use crate::error::PacketError;

pub use rnsnow_transport::MAX_PACKET_SIZE;

/// Length of the group identifier that prefixes every packet.
pub const GROUP_ID_LEN: usize = 5;

/// Packet header: group (5) + type (1) + id (2) + index (1) + count (1) = 10 bytes.
pub const HEADER_SIZE: usize = GROUP_ID_LEN + 5;

/// Largest payload one packet can carry.
pub const MAX_FRAGMENT_PAYLOAD: usize = MAX_PACKET_SIZE - HEADER_SIZE;

/// Most fragments a single frame may be split into.
pub const MAX_FRAGMENTS: usize = u8::MAX as usize;

/// Identifies the set of radios that talk to each other.
///
/// Packets carrying any other group id are ignored. Serialized as a
/// five-character ASCII string.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct GroupId([u8; GROUP_ID_LEN]);

impl GroupId {
    pub const fn new(bytes: [u8; GROUP_ID_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; GROUP_ID_LEN] {
        &self.0
    }
}

/// Group id used when none is configured.
pub const DEFAULT_GROUP_ID: GroupId = GroupId(*b"RNS09");

impl Default for GroupId {
    fn default() -> Self {
        DEFAULT_GROUP_ID
    }
}

impl TryFrom<&str> for GroupId {
    type Error = PacketError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let bytes = value.as_bytes();
        if bytes.len() != GROUP_ID_LEN || !value.is_ascii() {
            return Err(PacketError::InvalidGroupId(value.to_string()));
        }
        let mut id = [0u8; GROUP_ID_LEN];
        id.copy_from_slice(bytes);
        Ok(Self(id))
    }
}

impl TryFrom<String> for GroupId {
    type Error = PacketError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::try_from(value.as_str())
    }
}

impl From<GroupId> for String {
    fn from(id: GroupId) -> Self {
        id.to_string()
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.0))
    }
}

impl fmt::Debug for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GroupId({self})")
    }
}

/// What a packet carries. Only `Data` is forwarded to the serial link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum FrameType {
    Data = 0,
    Ping = 1,
    Probe = 2,
    Ack = 3,
}

impl FrameType {
    pub fn is_control(self) -> bool {
        self != FrameType::Data
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FrameType::Data => "data",
            FrameType::Ping => "ping",
            FrameType::Probe => "probe",
            FrameType::Ack => "ack",
        }
    }
}

impl TryFrom<u8> for FrameType {
    type Error = PacketError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(FrameType::Data),
            1 => Ok(FrameType::Ping),
            2 => Ok(FrameType::Probe),
            3 => Ok(FrameType::Ack),
            other => Err(PacketError::UnknownFrameType(other)),
        }
    }
}

/// Fixed header at the start of every radio packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    pub group: GroupId,
    pub frame_type: FrameType,
    pub packet_id: u16,
    pub fragment_index: u8,
    pub fragment_count: u8,
}

impl PacketHeader {
    /// Encode header and payload into the wire format.
    ///
    /// Wire format:
    /// ```text
    /// ┌──────────────┬──────────┬─────────────┬───────┬───────┬──────────────┐
    /// │ Group (5B)   │ Type     │ Packet id   │ Index │ Count │ Payload      │
    /// │ ASCII        │ (1B)     │ (2B BE)     │ (1B)  │ (1B)  │ (≤ 240B)     │
    /// └──────────────┴──────────┴─────────────┴───────┴───────┴──────────────┘
    /// ```
    pub fn encode(&self, payload: &[u8], dst: &mut BytesMut) -> Result<(), PacketError> {
        if payload.len() > MAX_FRAGMENT_PAYLOAD {
            return Err(PacketError::TooLarge {
                size: payload.len(),
                max: MAX_FRAGMENT_PAYLOAD,
            });
        }
        if self.fragment_count == 0 || self.fragment_index >= self.fragment_count {
            return Err(PacketError::InvalidFragment {
                index: self.fragment_index,
                count: self.fragment_count,
            });
        }
        dst.reserve(HEADER_SIZE + payload.len());
        dst.put_slice(self.group.as_bytes());
        dst.put_u8(self.frame_type as u8);
        dst.put_u16(self.packet_id);
        dst.put_u8(self.fragment_index);
        dst.put_u8(self.fragment_count);
        dst.put_slice(payload);
        Ok(())
    }
}

/// A parsed radio packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub header: PacketHeader,
    pub payload: Bytes,
}

impl Packet {
    /// Parse a raw packet, dropping it early if it belongs to another group.
    ///
    /// The group id is checked before anything else is looked at.
    pub fn parse(raw: &Bytes, group: &GroupId) -> Result<Self, PacketError> {
        if raw.len() < GROUP_ID_LEN {
            return Err(PacketError::TooShort { len: raw.len() });
        }
        if raw[..GROUP_ID_LEN] != group.0 {
            return Err(PacketError::GroupMismatch);
        }
        if raw.len() < HEADER_SIZE {
            return Err(PacketError::TooShort { len: raw.len() });
        }
        if raw.len() > MAX_PACKET_SIZE {
            return Err(PacketError::TooLarge {
                size: raw.len(),
                max: MAX_PACKET_SIZE,
            });
        }

        let frame_type = FrameType::try_from(raw[GROUP_ID_LEN])?;
        let packet_id = u16::from_be_bytes([raw[GROUP_ID_LEN + 1], raw[GROUP_ID_LEN + 2]]);
        let fragment_index = raw[GROUP_ID_LEN + 3];
        let fragment_count = raw[GROUP_ID_LEN + 4];
        if fragment_count == 0 || fragment_index >= fragment_count {
            return Err(PacketError::InvalidFragment {
                index: fragment_index,
                count: fragment_count,
            });
        }

        Ok(Packet {
            header: PacketHeader {
                group: *group,
                frame_type,
                packet_id,
                fragment_index,
                fragment_count,
            },
            payload: raw.slice(HEADER_SIZE..),
        })
    }
}
