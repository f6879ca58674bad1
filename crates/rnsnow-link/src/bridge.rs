//! The bridge between the serial link and the radio.
//!
//! Serial bytes are decoded into frames, fragmented and broadcast as `Data`
//! packets. Radio packets are reassembled; `Data` frames are encoded back
//! onto the serial link and control frames (ping, probe, ack) are handled
//! here and never forwarded.
//!
//! The bridge does not own a clock or spawn anything. Callers pass the
//! current time to every entry point and call [`Bridge::tick`] periodically.

use std::io::Write;
use std::time::Instant;

use rnsnow_frame::{FrameDecoder, FrameWriter};
use rnsnow_transport::{validate_channel, Radio, Received};
use serde::Serialize;
use tracing::{debug, info, trace, warn};

use crate::config::LinkConfig;
use crate::control::ControlFrame;
use crate::discovery::{ChannelDiscovery, DiscoveryAction};
use crate::error::{LinkError, PacketError, Result};
use crate::events::{EventSink, LinkEvent, NullSink};
use crate::fragment::{Fragmenter, Reassembler};
use crate::packet::{FrameType, Packet};
use crate::peers::PeerTable;

/// Radio packets drained per [`Bridge::poll_radio`] call.
const MAX_RECV_PER_POLL: usize = 64;

/// Diagnostic counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BridgeStats {
    pub frames_from_serial: u64,
    pub frames_to_serial: u64,
    /// Frames from the radio lost to a failed serial write.
    pub serial_write_failures: u64,
    /// Serial frames too large to fragment.
    pub frames_too_large: u64,
    pub packets_sent: u64,
    pub packets_received: u64,
    pub send_retries: u64,
    /// Packets dropped after every retry failed.
    pub send_failures: u64,
    pub group_mismatches: u64,
    pub malformed_packets: u64,
    pub serial_malformed: u64,
    pub serial_oversized: u64,
    pub reassembly_conflicts: u64,
    pub reassembly_duplicates: u64,
    pub reassembly_expired: u64,
    pub reassembly_evicted: u64,
    pub probes_answered: u64,
    pub acks_received: u64,
    pub pings_received: u64,
    pub pings_sent: u64,
    pub discoveries: u64,
}

/// Routes frames between a serial stream and a radio.
pub struct Bridge<R, W, E = NullSink> {
    config: LinkConfig,
    radio: R,
    serial: FrameWriter<W>,
    decoder: FrameDecoder,
    fragmenter: Fragmenter,
    reassembler: Reassembler,
    discovery: Option<ChannelDiscovery>,
    /// Channel in use when the current discovery run started.
    home_channel: u8,
    peers: PeerTable,
    events: E,
    stats: BridgeStats,
    next_nonce: u16,
    last_ping: Option<Instant>,
}

impl<R: Radio, W: Write, E: EventSink> Bridge<R, W, E> {
    /// Create a bridge and tune the radio to the configured channel.
    pub fn new(config: LinkConfig, mut radio: R, serial: W, events: E) -> Result<Self> {
        config.validate()?;
        if radio.channel() != config.channel {
            radio.set_channel(config.channel)?;
        }
        info!(
            group = %config.group_id,
            channel = config.channel,
            "bridge ready"
        );
        Ok(Self {
            fragmenter: Fragmenter::new(config.group_id),
            reassembler: Reassembler::new(config.reassembly_capacity, config.reassembly_timeout()),
            peers: PeerTable::new(config.peer_timeout()),
            home_channel: config.channel,
            config,
            radio,
            serial: FrameWriter::new(serial),
            decoder: FrameDecoder::new(),
            discovery: None,
            events,
            stats: BridgeStats::default(),
            next_nonce: 1,
            last_ping: None,
        })
    }

    /// Feed bytes read from the serial link.
    ///
    /// Every complete frame is sent over the radio as `Data`.
    pub fn on_serial_bytes(&mut self, bytes: &[u8], _now: Instant) -> Result<()> {
        for frame in self.decoder.decode(bytes) {
            self.stats.frames_from_serial += 1;
            self.send_frame(FrameType::Data, &frame)?;
        }
        Ok(())
    }

    /// Drain up to a bounded number of packets from the radio.
    ///
    /// Returns how many packets were handled.
    pub fn poll_radio(&mut self, now: Instant) -> Result<usize> {
        let mut handled = 0;
        while handled < MAX_RECV_PER_POLL {
            let Some(received) = self.radio.try_recv()? else {
                break;
            };
            self.on_radio_packet(received, now)?;
            handled += 1;
        }
        Ok(handled)
    }

    /// Handle one packet received from the radio.
    pub fn on_radio_packet(&mut self, received: Received, now: Instant) -> Result<()> {
        self.stats.packets_received += 1;
        let packet = match Packet::parse(&received.payload, &self.config.group_id) {
            Ok(packet) => packet,
            Err(PacketError::GroupMismatch) => {
                self.stats.group_mismatches += 1;
                trace!(source = %received.source, "packet from another group ignored");
                return Ok(());
            }
            Err(err) => {
                self.stats.malformed_packets += 1;
                debug!(source = %received.source, error = %err, "malformed packet dropped");
                return Ok(());
            }
        };

        let Some(frame) = self.reassembler.accept(received.source, packet, now) else {
            return Ok(());
        };

        match frame.frame_type {
            FrameType::Data => match self.serial.write_frame(&frame.payload) {
                Ok(()) => {
                    self.stats.frames_to_serial += 1;
                    trace!(source = %frame.source, len = frame.payload.len(), "frame to serial");
                    self.events
                        .emit(LinkEvent::frame_delivered(frame.source, frame.payload.len()));
                    Ok(())
                }
                Err(err) if err.is_disconnect() => Err(err.into()),
                Err(err) => {
                    self.stats.serial_write_failures += 1;
                    warn!(
                        source = %frame.source,
                        len = frame.payload.len(),
                        error = %err,
                        "serial write failed, frame dropped"
                    );
                    Ok(())
                }
            },
            control => match ControlFrame::parse(control, &frame.payload) {
                Ok(control) => self.on_control(control, &received, now),
                Err(err) => {
                    self.stats.malformed_packets += 1;
                    debug!(source = %received.source, error = %err, "bad control frame dropped");
                    Ok(())
                }
            },
        }
    }

    fn on_control(&mut self, control: ControlFrame, received: &Received, now: Instant) -> Result<()> {
        match control {
            ControlFrame::Ping => {
                self.stats.pings_received += 1;
                let first_seen = self.peers.record(received.source, received.channel, now);
                if first_seen {
                    info!(peer = %received.source, channel = received.channel, "peer reachable");
                }
                self.events.emit(LinkEvent::PeerReachable {
                    peer: received.source.to_string(),
                    channel: received.channel,
                    first_seen,
                });
            }
            ControlFrame::Probe { nonce } => {
                trace!(peer = %received.source, nonce, "probe answered");
                if self.send_control(ControlFrame::ack(nonce), received.channel)? {
                    self.stats.probes_answered += 1;
                }
            }
            ControlFrame::Ack { nonce } => {
                self.stats.acks_received += 1;
                if let Some(discovery) = self.discovery.as_mut() {
                    let actions = discovery.on_ack(nonce, now);
                    self.run_discovery(actions)?;
                }
            }
        }
        Ok(())
    }

    /// Periodic maintenance: reassembly timeouts, discovery deadlines, peer
    /// expiry and the optional liveness ping.
    pub fn tick(&mut self, now: Instant) -> Result<()> {
        let expired = self.reassembler.evict_expired(now);
        if expired > 0 {
            debug!(expired, "partial frames expired");
        }

        if let Some(discovery) = self.discovery.as_mut() {
            let actions = discovery.poll(now);
            self.run_discovery(actions)?;
        }

        for peer in self.peers.prune(now) {
            info!(%peer, "peer lost");
            self.events.emit(LinkEvent::PeerLost {
                peer: peer.to_string(),
            });
        }

        if let Some(interval) = self.config.ping_interval() {
            let due = self
                .last_ping
                .is_none_or(|last| now.saturating_duration_since(last) >= interval);
            if due && self.discovery.is_none() {
                self.send_ping(now)?;
            }
        }
        Ok(())
    }

    /// Start channel discovery, restarting any run already in progress.
    pub fn start_discovery(&mut self, now: Instant) -> Result<()> {
        if self.discovery.is_some() {
            self.abort_discovery()?;
        }
        self.home_channel = self.radio.channel();
        let (discovery, actions) = ChannelDiscovery::start(
            &self.config.preferred_channels,
            self.config.channel,
            &self.config.discovery,
            self.next_nonce,
            now,
        );
        let probes = (discovery.candidates().len() as u32)
            .saturating_mul(self.config.discovery.max_attempts)
            .saturating_mul(self.config.discovery.probes_per_channel);
        self.next_nonce = self.next_nonce.wrapping_add(probes.min(u16::MAX as u32) as u16);
        self.events.emit(LinkEvent::DiscoveryStarted {
            candidates: discovery.candidates().to_vec(),
        });
        self.discovery = Some(discovery);
        self.run_discovery(actions)
    }

    /// Cancel discovery and return to the channel used before it started.
    pub fn abort_discovery(&mut self) -> Result<()> {
        let Some(mut discovery) = self.discovery.take() else {
            return Ok(());
        };
        discovery.abort();
        self.reassembler.clear();
        if self.radio.channel() != self.home_channel {
            self.radio.set_channel(self.home_channel)?;
        }
        info!(channel = self.home_channel, "channel discovery aborted");
        self.events.emit(LinkEvent::DiscoveryAborted);
        Ok(())
    }

    fn run_discovery(&mut self, actions: Vec<DiscoveryAction>) -> Result<()> {
        for action in actions {
            match action {
                DiscoveryAction::Tune(channel) => {
                    if self.radio.channel() != channel {
                        self.radio.set_channel(channel)?;
                    }
                }
                DiscoveryAction::SendProbe { channel, nonce } => {
                    self.send_control(ControlFrame::probe(nonce), channel)?;
                }
                DiscoveryAction::Complete(outcome) => {
                    self.discovery = None;
                    self.stats.discoveries += 1;
                    if outcome.channel != self.home_channel {
                        self.events.emit(LinkEvent::ChannelChanged {
                            from: self.home_channel,
                            to: outcome.channel,
                        });
                    }
                    if outcome.fallback {
                        warn!(
                            channel = outcome.channel,
                            attempts = outcome.attempts,
                            "no peers answered, using default channel"
                        );
                        self.events.emit(LinkEvent::DiscoveryExhausted {
                            channel: outcome.channel,
                            attempts: outcome.attempts,
                        });
                    }
                    self.home_channel = outcome.channel;
                    self.events.emit(LinkEvent::DiscoveryCompleted(outcome));
                }
            }
        }
        Ok(())
    }

    /// Replace the configuration.
    ///
    /// Aborts discovery and drops every partial frame first. The radio is
    /// retuned only when the configured channel changes.
    pub fn apply_config(&mut self, config: LinkConfig) -> Result<()> {
        config.validate()?;
        self.abort_discovery()?;

        self.reassembler
            .reconfigure(config.reassembly_capacity, config.reassembly_timeout());
        if config.group_id != self.config.group_id {
            self.fragmenter.set_group(config.group_id);
            self.peers.clear();
        }
        self.peers.set_timeout(config.peer_timeout());
        self.last_ping = None;

        let channel_changed = config.channel != self.config.channel;
        let new_channel = config.channel;
        self.config = config;
        if channel_changed {
            self.set_channel(new_channel)?;
        }
        info!(group = %self.config.group_id, channel = self.radio.channel(), "configuration applied");
        Ok(())
    }

    /// Tune the radio, aborting any discovery run.
    pub fn set_channel(&mut self, channel: u8) -> Result<()> {
        validate_channel(channel)?;
        self.abort_discovery()?;
        let from = self.radio.channel();
        if from != channel {
            self.radio.set_channel(channel)?;
            self.events.emit(LinkEvent::ChannelChanged { from, to: channel });
        }
        self.home_channel = channel;
        Ok(())
    }

    /// Broadcast a ping on the current channel.
    pub fn send_ping(&mut self, now: Instant) -> Result<()> {
        let channel = self.radio.channel();
        self.last_ping = Some(now);
        if self.send_control(ControlFrame::ping(), channel)? {
            self.stats.pings_sent += 1;
            debug!(channel, "ping sent");
        }
        Ok(())
    }

    fn send_control(&mut self, control: ControlFrame, channel: u8) -> Result<bool> {
        let packets = self
            .fragmenter
            .fragment(control.frame_type(), &control.payload())?;
        let mut sent = true;
        for packet in &packets {
            sent &= self.transmit(packet, channel);
        }
        Ok(sent)
    }

    fn send_frame(&mut self, frame_type: FrameType, frame: &[u8]) -> Result<()> {
        let packets = match self.fragmenter.fragment(frame_type, frame) {
            Ok(packets) => packets,
            Err(LinkError::FrameTooLarge { size, max }) => {
                self.stats.frames_too_large += 1;
                warn!(size, max, "serial frame too large for the radio, dropped");
                return Ok(());
            }
            Err(err) => return Err(err),
        };

        let channel = self.radio.channel();
        for packet in &packets {
            if !self.transmit(packet, channel) {
                // The rest cannot complete the frame on the far side.
                break;
            }
        }
        Ok(())
    }

    /// Send one packet, retrying up to `send_retries` times.
    fn transmit(&mut self, packet: &[u8], channel: u8) -> bool {
        let attempts = self.config.send_retries + 1;
        for attempt in 1..=attempts {
            match self.radio.send(packet, channel) {
                Ok(()) => {
                    self.stats.packets_sent += 1;
                    return true;
                }
                Err(err) => {
                    debug!(attempt, channel, error = %err, "radio send failed");
                    if attempt < attempts {
                        self.stats.send_retries += 1;
                    }
                }
            }
        }
        self.stats.send_failures += 1;
        warn!(channel, len = packet.len(), "packet dropped after retries");
        false
    }

    /// Counters, including those kept by the decoder and reassembler.
    pub fn stats(&self) -> BridgeStats {
        let decoder = self.decoder.stats();
        let reassembly = self.reassembler.stats();
        BridgeStats {
            serial_malformed: decoder.malformed,
            serial_oversized: decoder.oversized,
            reassembly_conflicts: reassembly.conflicts,
            reassembly_duplicates: reassembly.duplicates,
            reassembly_expired: reassembly.expired,
            reassembly_evicted: reassembly.evicted,
            ..self.stats
        }
    }

    /// Channel the radio is tuned to.
    pub fn channel(&self) -> u8 {
        self.radio.channel()
    }

    pub fn is_discovering(&self) -> bool {
        self.discovery.is_some()
    }

    /// When the bridge next needs a tick for discovery.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.discovery.as_ref().and_then(ChannelDiscovery::next_deadline)
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    pub fn peers(&self) -> &PeerTable {
        &self.peers
    }

    /// Partial frames awaiting more fragments.
    pub fn pending_reassembly(&self) -> usize {
        self.reassembler.len()
    }

    pub fn radio(&self) -> &R {
        &self.radio
    }

    pub fn radio_mut(&mut self) -> &mut R {
        &mut self.radio
    }

    /// Borrow the serial output stream.
    pub fn serial(&self) -> &W {
        self.serial.get_ref()
    }

    pub fn events(&self) -> &E {
        &self.events
    }

    pub fn events_mut(&mut self) -> &mut E {
        &mut self.events
    }

    /// Consume the bridge, returning the radio, serial stream and sink.
    pub fn into_parts(self) -> (R, W, E) {
        (self.radio, self.serial.into_inner(), self.events)
    }
}

impl<R, W, E> std::fmt::Debug for Bridge<R, W, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bridge")
            .field("config", &self.config)
            .field("discovering", &self.discovery.is_some())
            .field("stats", &self.stats)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use bytes::{Bytes, BytesMut};
    use rnsnow_frame::{encode_frame, FrameDecoder};
    use rnsnow_transport::{MemoryAir, MemoryRadio, PeerAddr};

    use super::*;
    use crate::packet::{PacketHeader, DEFAULT_GROUP_ID};

    const ME: PeerAddr = PeerAddr::new([2, 0, 0, 0, 0, 1]);
    const PEER: PeerAddr = PeerAddr::new([2, 0, 0, 0, 0, 2]);

    type TestBridge = Bridge<MemoryRadio, Vec<u8>, Vec<LinkEvent>>;

    fn setup(config: LinkConfig) -> (TestBridge, MemoryRadio) {
        let air = MemoryAir::new();
        let radio = air.attach(ME, config.channel).unwrap();
        let peer = air.attach(PEER, config.channel).unwrap();
        let bridge = Bridge::new(config, radio, Vec::new(), Vec::new()).unwrap();
        (bridge, peer)
    }

    fn hdlc(payload: &[u8]) -> Vec<u8> {
        let mut buf = BytesMut::new();
        encode_frame(payload, &mut buf);
        buf.to_vec()
    }

    fn drain(radio: &mut MemoryRadio) -> Vec<(u8, Packet)> {
        let mut out = Vec::new();
        while let Some(r) = radio.try_recv().unwrap() {
            out.push((r.channel, Packet::parse(&r.payload, &DEFAULT_GROUP_ID).unwrap()));
        }
        out
    }

    fn raw(frame_type: FrameType, id: u16, index: u8, count: u8, payload: &[u8]) -> Bytes {
        let mut buf = BytesMut::new();
        PacketHeader {
            group: DEFAULT_GROUP_ID,
            frame_type,
            packet_id: id,
            fragment_index: index,
            fragment_count: count,
        }
        .encode(payload, &mut buf)
        .unwrap();
        buf.freeze()
    }

    fn from_peer(channel: u8, payload: Bytes) -> Received {
        Received {
            source: PEER,
            channel,
            payload,
        }
    }

    #[test]
    fn test_serial_frame_goes_out_as_data() {
        let (mut bridge, mut peer) = setup(LinkConfig::default());
        bridge
            .on_serial_bytes(&hdlc(b"rns packet"), Instant::now())
            .unwrap();

        let packets = drain(&mut peer);
        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].0, 1);
        assert_eq!(packets[0].1.header.frame_type, FrameType::Data);
        assert_eq!(packets[0].1.payload.as_ref(), b"rns packet");
        assert_eq!(bridge.stats().frames_from_serial, 1);
        assert_eq!(bridge.stats().packets_sent, 1);
    }

    #[test]
    fn test_large_serial_frame_is_fragmented() {
        let (mut bridge, mut peer) = setup(LinkConfig::default());
        let frame: Vec<u8> = (0..600).map(|i| i as u8).collect();
        bridge.on_serial_bytes(&hdlc(&frame), Instant::now()).unwrap();

        let packets = drain(&mut peer);
        assert_eq!(packets.len(), 3);
        assert!(packets.iter().all(|(_, p)| p.header.fragment_count == 3));
    }

    #[test]
    fn test_radio_data_reaches_serial() {
        let (mut bridge, _peer) = setup(LinkConfig::default());
        let now = Instant::now();
        bridge
            .on_radio_packet(from_peer(1, raw(FrameType::Data, 9, 1, 2, b"world")), now)
            .unwrap();
        assert!(bridge.serial().is_empty());
        bridge
            .on_radio_packet(from_peer(1, raw(FrameType::Data, 9, 0, 2, b"hello ")), now)
            .unwrap();

        let frames = FrameDecoder::new().decode(bridge.serial());
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].as_ref(), b"hello world");
        assert_eq!(
            bridge.events().last(),
            Some(&LinkEvent::FrameDelivered {
                source: PEER.to_string(),
                len: 11
            })
        );
    }

    /// Serial port whose next writes fail with `kind`.
    struct FailingSerial {
        fail_next: usize,
        kind: std::io::ErrorKind,
        data: Vec<u8>,
    }

    impl Write for FailingSerial {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            if self.fail_next > 0 {
                self.fail_next -= 1;
                return Err(self.kind.into());
            }
            self.data.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn with_serial(
        fail_next: usize,
        kind: std::io::ErrorKind,
    ) -> Bridge<MemoryRadio, FailingSerial, Vec<LinkEvent>> {
        let air = MemoryAir::new();
        let radio = air.attach(ME, 1).unwrap();
        let serial = FailingSerial {
            fail_next,
            kind,
            data: Vec::new(),
        };
        Bridge::new(LinkConfig::default(), radio, serial, Vec::new()).unwrap()
    }

    #[test]
    fn test_serial_write_timeout_drops_one_frame() {
        let mut bridge = with_serial(1, std::io::ErrorKind::TimedOut);
        let now = Instant::now();

        bridge
            .on_radio_packet(from_peer(1, raw(FrameType::Data, 1, 0, 1, b"lost")), now)
            .unwrap();
        assert_eq!(bridge.stats().serial_write_failures, 1);
        assert_eq!(bridge.stats().frames_to_serial, 0);
        assert!(bridge.events().is_empty());

        bridge
            .on_radio_packet(from_peer(1, raw(FrameType::Data, 2, 0, 1, b"kept")), now)
            .unwrap();
        let frames = FrameDecoder::new().decode(&bridge.serial().data);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].as_ref(), b"kept");
        assert_eq!(bridge.stats().frames_to_serial, 1);
    }

    #[test]
    fn test_closed_serial_link_is_an_error() {
        let mut bridge = with_serial(1, std::io::ErrorKind::BrokenPipe);
        let err = bridge
            .on_radio_packet(
                from_peer(1, raw(FrameType::Data, 1, 0, 1, b"x")),
                Instant::now(),
            )
            .unwrap_err();
        assert!(matches!(err, LinkError::Frame(ref e) if e.is_disconnect()));
        assert_eq!(bridge.stats().serial_write_failures, 0);
    }

    #[test]
    fn test_probe_is_answered_on_arrival_channel() {
        let (mut bridge, mut peer) = setup(LinkConfig::default());
        bridge
            .on_radio_packet(
                from_peer(1, raw(FrameType::Probe, 3, 0, 1, &0x0102u16.to_be_bytes())),
                Instant::now(),
            )
            .unwrap();

        let packets = drain(&mut peer);
        assert_eq!(packets.len(), 1);
        let (channel, ack) = &packets[0];
        assert_eq!(*channel, 1);
        assert_eq!(ack.header.frame_type, FrameType::Ack);
        assert_eq!(ack.payload.as_ref(), &[0x01, 0x02]);
        assert!(bridge.serial().is_empty());
        assert_eq!(bridge.stats().probes_answered, 1);
    }

    #[test]
    fn test_ping_records_peer_without_reply() {
        let (mut bridge, mut peer) = setup(LinkConfig::default());
        let now = Instant::now();
        bridge
            .on_radio_packet(from_peer(1, raw(FrameType::Ping, 4, 0, 1, b"")), now)
            .unwrap();

        assert!(drain(&mut peer).is_empty());
        assert!(bridge.serial().is_empty());
        assert_eq!(bridge.peers().len(), 1);
        assert_eq!(
            bridge.events().last(),
            Some(&LinkEvent::PeerReachable {
                peer: PEER.to_string(),
                channel: 1,
                first_seen: true
            })
        );
    }

    #[test]
    fn test_unsolicited_ack_is_ignored() {
        let (mut bridge, _peer) = setup(LinkConfig::default());
        bridge
            .on_radio_packet(
                from_peer(1, raw(FrameType::Ack, 5, 0, 1, &[0, 1])),
                Instant::now(),
            )
            .unwrap();
        assert!(bridge.serial().is_empty());
        assert_eq!(bridge.stats().acks_received, 1);
        assert!(bridge.events().is_empty());
    }

    #[test]
    fn test_foreign_group_and_garbage_are_counted() {
        let (mut bridge, _peer) = setup(LinkConfig::default());
        let now = Instant::now();
        bridge
            .on_radio_packet(from_peer(1, Bytes::from_static(b"OTHER\x00\x00\x01\x00\x01x")), now)
            .unwrap();
        bridge
            .on_radio_packet(from_peer(1, Bytes::from_static(b"RNS09\x07")), now)
            .unwrap();
        bridge
            .on_radio_packet(from_peer(1, raw(FrameType::Probe, 1, 0, 1, b"")), now)
            .unwrap();

        let stats = bridge.stats();
        assert_eq!(stats.packets_received, 3);
        assert_eq!(stats.group_mismatches, 1);
        assert_eq!(stats.malformed_packets, 2);
        assert!(bridge.serial().is_empty());
    }

    #[test]
    fn test_send_retries_then_drop() {
        let config = LinkConfig {
            send_retries: 2,
            ..LinkConfig::default()
        };
        let (mut bridge, mut peer) = setup(config);
        let now = Instant::now();

        bridge.radio().fail_next_sends(2);
        bridge.on_serial_bytes(&hdlc(b"first"), now).unwrap();
        assert_eq!(drain(&mut peer).len(), 1);
        assert_eq!(bridge.stats().send_retries, 2);
        assert_eq!(bridge.stats().send_failures, 0);

        bridge.radio().fail_next_sends(3);
        bridge.on_serial_bytes(&hdlc(b"second"), now).unwrap();
        assert!(drain(&mut peer).is_empty());
        assert_eq!(bridge.stats().send_failures, 1);
    }

    #[test]
    fn test_frame_too_large_is_dropped() {
        let (mut bridge, mut peer) = setup(LinkConfig::default());
        let frame = vec![0u8; 255 * 240 + 1];
        bridge.on_serial_bytes(&hdlc(&frame), Instant::now()).unwrap();
        assert!(drain(&mut peer).is_empty());
        assert_eq!(bridge.stats().frames_too_large, 1);
    }

    #[test]
    fn test_malformed_serial_input_is_counted() {
        let (mut bridge, mut peer) = setup(LinkConfig::default());
        bridge
            .on_serial_bytes(&[0x7E, b'a', 0x7D, 0x7E], Instant::now())
            .unwrap();
        assert!(drain(&mut peer).is_empty());
        assert_eq!(bridge.stats().serial_malformed, 1);
    }

    #[test]
    fn test_tick_evicts_partial_frames() {
        let config = LinkConfig {
            reassembly_timeout_ms: 100,
            ..LinkConfig::default()
        };
        let (mut bridge, _peer) = setup(config);
        let now = Instant::now();
        bridge
            .on_radio_packet(from_peer(1, raw(FrameType::Data, 9, 0, 2, b"half")), now)
            .unwrap();
        assert_eq!(bridge.pending_reassembly(), 1);

        bridge.tick(now + Duration::from_millis(50)).unwrap();
        assert_eq!(bridge.pending_reassembly(), 1);
        bridge.tick(now + Duration::from_millis(150)).unwrap();
        assert_eq!(bridge.pending_reassembly(), 0);
        assert_eq!(bridge.stats().reassembly_expired, 1);
    }

    #[test]
    fn test_periodic_ping() {
        let config = LinkConfig {
            ping_interval_ms: Some(1000),
            ..LinkConfig::default()
        };
        let (mut bridge, mut peer) = setup(config);
        let now = Instant::now();

        bridge.tick(now).unwrap();
        bridge.tick(now + Duration::from_millis(500)).unwrap();
        bridge.tick(now + Duration::from_millis(1000)).unwrap();

        let pings = drain(&mut peer);
        assert_eq!(pings.len(), 2);
        assert!(pings
            .iter()
            .all(|(_, p)| p.header.frame_type == FrameType::Ping));
        assert_eq!(bridge.stats().pings_sent, 2);
    }

    #[test]
    fn test_peer_lost_after_timeout() {
        let config = LinkConfig {
            peer_timeout_ms: 1000,
            ..LinkConfig::default()
        };
        let (mut bridge, _peer) = setup(config);
        let now = Instant::now();
        bridge
            .on_radio_packet(from_peer(1, raw(FrameType::Ping, 1, 0, 1, b"")), now)
            .unwrap();
        bridge.tick(now + Duration::from_millis(1001)).unwrap();

        assert!(bridge.peers().is_empty());
        assert_eq!(
            bridge.events().last(),
            Some(&LinkEvent::PeerLost {
                peer: PEER.to_string()
            })
        );
    }

    #[test]
    fn test_discovery_tunes_and_probes() {
        let (mut bridge, mut peer) = setup(LinkConfig::default());
        let now = Instant::now();
        bridge.start_discovery(now).unwrap();

        assert!(bridge.is_discovering());
        assert_eq!(bridge.channel(), 6);
        assert_eq!(
            bridge.events()[0],
            LinkEvent::DiscoveryStarted {
                candidates: vec![6, 11, 1]
            }
        );
        // The peer stays on channel 1 and hears nothing yet.
        assert!(drain(&mut peer).is_empty());
    }

    #[test]
    fn test_abort_discovery_restores_channel() {
        let (mut bridge, _peer) = setup(LinkConfig::default());
        let now = Instant::now();
        bridge.start_discovery(now).unwrap();
        bridge
            .on_radio_packet(from_peer(6, raw(FrameType::Data, 9, 0, 2, b"half")), now)
            .unwrap();

        bridge.abort_discovery().unwrap();
        assert!(!bridge.is_discovering());
        assert_eq!(bridge.channel(), 1);
        assert_eq!(bridge.pending_reassembly(), 0);
        assert_eq!(bridge.events().last(), Some(&LinkEvent::DiscoveryAborted));
    }

    #[test]
    fn test_apply_config_aborts_discovery_and_retunes() {
        let (mut bridge, _peer) = setup(LinkConfig::default());
        let now = Instant::now();
        bridge.start_discovery(now).unwrap();

        let config = LinkConfig {
            channel: 11,
            ..LinkConfig::default()
        };
        bridge.apply_config(config).unwrap();

        assert!(!bridge.is_discovering());
        assert_eq!(bridge.channel(), 11);
        assert_eq!(bridge.config().channel, 11);
        assert!(bridge.events().contains(&LinkEvent::DiscoveryAborted));
        assert_eq!(
            bridge.events().last(),
            Some(&LinkEvent::ChannelChanged { from: 1, to: 11 })
        );
    }

    #[test]
    fn test_apply_invalid_config_changes_nothing() {
        let (mut bridge, _peer) = setup(LinkConfig::default());
        let bad = LinkConfig {
            channel: 0,
            ..LinkConfig::default()
        };
        assert!(matches!(bridge.apply_config(bad), Err(LinkError::Config(_))));
        assert_eq!(bridge.config().channel, 1);
        assert_eq!(bridge.channel(), 1);
    }

    #[test]
    fn test_set_channel() {
        let (mut bridge, _peer) = setup(LinkConfig::default());
        bridge.set_channel(6).unwrap();
        assert_eq!(bridge.channel(), 6);
        assert!(bridge.set_channel(15).is_err());
        assert_eq!(
            bridge.events().last(),
            Some(&LinkEvent::ChannelChanged { from: 1, to: 6 })
        );
    }
}
