//! Radio and serial boundary abstractions.
//!
//! This is the lowest layer of rnsnow. The link layer only ever talks to the
//! radio through the [`Radio`] trait defined here:
//! - [`MemoryAir`] is an in-process shared medium used by tests and demos
//! - [`UdpRadio`] carries radio packets as UDP datagrams between hosts
//!
//! The serial side is any `Read + Write` byte stream; [`serial`] opens real
//! devices when the `serial` feature is enabled.

pub mod addr;
pub mod error;
pub mod memory;
pub mod serial;
pub mod traits;
pub mod udp;

pub use addr::PeerAddr;
pub use error::{Result, TransportError};
pub use memory::{MemoryAir, MemoryRadio};
pub use traits::{validate_channel, Radio, Received, MAX_CHANNEL, MAX_PACKET_SIZE, MIN_CHANNEL};
pub use udp::UdpRadio;
