//! Link layer between an HDLC serial stream and a short-range radio.
//!
//! Serial frames are split into radio packets that fit the radio MTU and
//! reassembled on the far side. Channel discovery finds the channel peers
//! are listening on. [`Bridge`] ties it together; with the `async` feature,
//! [`driver::run`] drives a bridge on a tokio runtime.

pub mod bridge;
pub mod config;
pub mod control;
pub mod discovery;
#[cfg(feature = "async")]
pub mod driver;
pub mod error;
pub mod events;
pub mod fragment;
pub mod packet;
pub mod peers;

pub use bridge::{Bridge, BridgeStats};
pub use config::{DiscoveryConfig, LinkConfig, DEFAULT_CHANNEL, DEFAULT_PREFERRED_CHANNELS};
pub use control::{ControlFrame, NONCE_LEN};
pub use discovery::{candidate_channels, ChannelDiscovery, DiscoveryAction, DiscoveryOutcome};
pub use error::{LinkError, PacketError, Result};
pub use events::{EventSink, LinkEvent, NullSink};
pub use fragment::{
    Fragmenter, PacketIdGenerator, Reassembled, Reassembler, ReassemblyStats,
    DEFAULT_REASSEMBLY_CAPACITY, DEFAULT_REASSEMBLY_TIMEOUT,
};
pub use packet::{
    FrameType, GroupId, Packet, PacketHeader, DEFAULT_GROUP_ID, GROUP_ID_LEN, HEADER_SIZE,
    MAX_FRAGMENTS, MAX_FRAGMENT_PAYLOAD, MAX_PACKET_SIZE,
};
pub use peers::{PeerInfo, PeerSummary, PeerTable};
