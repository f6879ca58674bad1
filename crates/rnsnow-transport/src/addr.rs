use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;

/// Length of a radio peer address in bytes.
pub const PEER_ADDR_LEN: usize = 6;

/// Hardware-style address of a radio peer.
///
/// Six bytes, displayed as colon-separated hex (`aa:bb:cc:dd:ee:ff`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerAddr(pub [u8; PEER_ADDR_LEN]);

impl PeerAddr {
    /// The all-ones broadcast address.
    pub const BROADCAST: PeerAddr = PeerAddr([0xFF; PEER_ADDR_LEN]);

    pub const fn new(bytes: [u8; PEER_ADDR_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; PEER_ADDR_LEN] {
        &self.0
    }

    pub fn is_broadcast(&self) -> bool {
        *self == Self::BROADCAST
    }
}

/// Derive a peer address from a socket address.
///
/// IPv4 uses the four octets followed by the big-endian port. IPv6 uses the
/// last four octets, which is unique enough for host-side testing.
impl From<SocketAddr> for PeerAddr {
    fn from(addr: SocketAddr) -> Self {
        let octets = match addr {
            SocketAddr::V4(v4) => v4.ip().octets(),
            SocketAddr::V6(v6) => {
                let o = v6.ip().octets();
                [o[12], o[13], o[14], o[15]]
            }
        };
        let port = addr.port().to_be_bytes();
        PeerAddr([octets[0], octets[1], octets[2], octets[3], port[0], port[1]])
    }
}

impl fmt::Display for PeerAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = &self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            b[0], b[1], b[2], b[3], b[4], b[5]
        )
    }
}

/// Error returned when parsing a [`PeerAddr`] from text fails.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid peer address: {0}")]
pub struct ParsePeerAddrError(String);

impl FromStr for PeerAddr {
    type Err = ParsePeerAddrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; PEER_ADDR_LEN];
        let mut parts = s.split(':');
        for slot in bytes.iter_mut() {
            let part = parts
                .next()
                .ok_or_else(|| ParsePeerAddrError(s.to_string()))?;
            if part.len() != 2 {
                return Err(ParsePeerAddrError(s.to_string()));
            }
            *slot = u8::from_str_radix(part, 16).map_err(|_| ParsePeerAddrError(s.to_string()))?;
        }
        if parts.next().is_some() {
            return Err(ParsePeerAddrError(s.to_string()));
        }
        Ok(PeerAddr(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_and_parse() {
        let addr = PeerAddr([0x24, 0x0a, 0xc4, 0x01, 0x02, 0xff]);
        let text = addr.to_string();
        assert_eq!(text, "24:0a:c4:01:02:ff");
        assert_eq!(text.parse::<PeerAddr>().unwrap(), addr);
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!("24:0a:c4:01:02".parse::<PeerAddr>().is_err());
        assert!("24:0a:c4:01:02:ff:00".parse::<PeerAddr>().is_err());
        assert!("zz:0a:c4:01:02:ff".parse::<PeerAddr>().is_err());
        assert!("240ac40102ff".parse::<PeerAddr>().is_err());
    }

    #[test]
    fn test_from_socket_addr_v4() {
        let sock: SocketAddr = "192.168.1.20:4242".parse().unwrap();
        let addr = PeerAddr::from(sock);
        assert_eq!(addr.0, [192, 168, 1, 20, 0x10, 0x92]);
    }

    #[test]
    fn test_broadcast() {
        assert!(PeerAddr::BROADCAST.is_broadcast());
        assert!(!PeerAddr([0; 6]).is_broadcast());
    }
}
