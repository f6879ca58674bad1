use bytes::Bytes;

use crate::addr::PeerAddr;
use crate::error::{Result, TransportError};

/// Largest packet a single radio transmission can carry.
pub const MAX_PACKET_SIZE: usize = 250;

/// Lowest supported 2.4 GHz channel.
pub const MIN_CHANNEL: u8 = 1;

/// Highest supported 2.4 GHz channel.
pub const MAX_CHANNEL: u8 = 14;

/// Check that `channel` is a valid radio channel.
pub fn validate_channel(channel: u8) -> Result<u8> {
    if (MIN_CHANNEL..=MAX_CHANNEL).contains(&channel) {
        Ok(channel)
    } else {
        Err(TransportError::InvalidChannel(channel))
    }
}

/// A packet received from the air.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Received {
    /// Address of the transmitting peer.
    pub source: PeerAddr,
    /// Channel the packet arrived on.
    pub channel: u8,
    /// Raw packet bytes, header included.
    pub payload: Bytes,
}

/// A connectionless, MTU-limited broadcast radio.
///
/// Sends are best-effort. Receiving never blocks: `try_recv` returns
/// `Ok(None)` when nothing is queued.
pub trait Radio {
    /// Channel the radio is currently tuned to.
    fn channel(&self) -> u8;

    /// Retune the radio. Packets sent on other channels are no longer heard.
    fn set_channel(&mut self, channel: u8) -> Result<()>;

    /// Broadcast one packet on `channel`.
    fn send(&mut self, packet: &[u8], channel: u8) -> Result<()>;

    /// Take the next received packet, if any.
    fn try_recv(&mut self) -> Result<Option<Received>>;
}

impl<R: Radio + ?Sized> Radio for Box<R> {
    fn channel(&self) -> u8 {
        (**self).channel()
    }

    fn set_channel(&mut self, channel: u8) -> Result<()> {
        (**self).set_channel(channel)
    }

    fn send(&mut self, packet: &[u8], channel: u8) -> Result<()> {
        (**self).send(packet, channel)
    }

    fn try_recv(&mut self) -> Result<Option<Received>> {
        (**self).try_recv()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_channel_range() {
        assert_eq!(validate_channel(1).unwrap(), 1);
        assert_eq!(validate_channel(14).unwrap(), 14);
        assert!(matches!(
            validate_channel(0),
            Err(TransportError::InvalidChannel(0))
        ));
        assert!(matches!(
            validate_channel(15),
            Err(TransportError::InvalidChannel(15))
        ));
    }
}
