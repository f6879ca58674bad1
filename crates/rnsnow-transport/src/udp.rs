use std::io::ErrorKind;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};

use bytes::Bytes;
use tracing::{debug, info, trace};

use crate::addr::PeerAddr;
use crate::error::{Result, TransportError};
use crate::traits::{validate_channel, Radio, Received, MAX_PACKET_SIZE};

/// Channel byte plus the largest radio packet.
const MAX_DATAGRAM: usize = MAX_PACKET_SIZE + 1;

/// Radio emulated over UDP datagrams.
///
/// Each datagram is `[channel: u8][packet]`. Sends go to every configured
/// peer endpoint; datagrams tagged with a channel other than the one the
/// radio is tuned to are discarded on receipt, so channel separation holds
/// on a host network.
#[derive(Debug)]
pub struct UdpRadio {
    socket: UdpSocket,
    peers: Vec<SocketAddr>,
    channel: u8,
    buf: Vec<u8>,
}

impl UdpRadio {
    /// Bind a nonblocking socket at `bind` that broadcasts to `peers`.
    pub fn bind(bind: impl ToSocketAddrs, peers: Vec<SocketAddr>, channel: u8) -> Result<Self> {
        validate_channel(channel)?;
        let socket = UdpSocket::bind(&bind).map_err(|e| TransportError::Bind {
            addr: describe(&bind),
            source: e,
        })?;
        socket.set_nonblocking(true)?;
        let local = socket.local_addr()?;
        info!(%local, peers = peers.len(), channel, "udp radio bound");
        Ok(Self {
            socket,
            peers,
            channel,
            buf: vec![0u8; MAX_DATAGRAM + 1],
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Our own address as other peers see it.
    pub fn peer_addr(&self) -> Result<PeerAddr> {
        Ok(PeerAddr::from(self.local_addr()?))
    }

    pub fn add_peer(&mut self, peer: SocketAddr) {
        if !self.peers.contains(&peer) {
            self.peers.push(peer);
        }
    }

    pub fn peers(&self) -> &[SocketAddr] {
        &self.peers
    }
}

fn describe(bind: &impl ToSocketAddrs) -> String {
    match bind.to_socket_addrs() {
        Ok(mut addrs) => addrs
            .next()
            .map(|a| a.to_string())
            .unwrap_or_else(|| "<none>".to_string()),
        Err(e) => format!("<unresolved: {e}>"),
    }
}

impl Radio for UdpRadio {
    fn channel(&self) -> u8 {
        self.channel
    }

    fn set_channel(&mut self, channel: u8) -> Result<()> {
        self.channel = validate_channel(channel)?;
        debug!(channel, "udp radio tuned");
        Ok(())
    }

    fn send(&mut self, packet: &[u8], channel: u8) -> Result<()> {
        validate_channel(channel)?;
        if packet.len() > MAX_PACKET_SIZE {
            return Err(TransportError::PacketTooLarge {
                size: packet.len(),
                max: MAX_PACKET_SIZE,
            });
        }
        if self.peers.is_empty() {
            return Err(TransportError::SendFailed("no peers configured".into()));
        }

        let mut datagram = Vec::with_capacity(packet.len() + 1);
        datagram.push(channel);
        datagram.extend_from_slice(packet);

        let mut delivered = 0usize;
        let mut last_err = None;
        for peer in &self.peers {
            match self.socket.send_to(&datagram, peer) {
                Ok(_) => delivered += 1,
                Err(e) => {
                    debug!(%peer, error = %e, "udp send failed");
                    last_err = Some(e);
                }
            }
        }
        match (delivered, last_err) {
            (0, Some(e)) => Err(TransportError::SendFailed(e.to_string())),
            _ => Ok(()),
        }
    }

    fn try_recv(&mut self) -> Result<Option<Received>> {
        loop {
            match self.socket.recv_from(&mut self.buf) {
                Ok((n, from)) => {
                    if n < 1 {
                        continue;
                    }
                    // The buffer holds one spare byte so truncation shows up here.
                    if n > MAX_DATAGRAM {
                        debug!(%from, "oversized datagram dropped");
                        continue;
                    }
                    let channel = self.buf[0];
                    if channel != self.channel {
                        trace!(%from, channel, tuned = self.channel, "datagram on other channel");
                        continue;
                    }
                    return Ok(Some(Received {
                        source: PeerAddr::from(from),
                        channel,
                        payload: Bytes::copy_from_slice(&self.buf[1..n]),
                    }));
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(None),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                // ICMP port unreachable from a peer that is not up yet.
                Err(e) if e.kind() == ErrorKind::ConnectionReset => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }
}
