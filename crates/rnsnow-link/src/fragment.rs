//! Splitting frames into radio packets and putting them back together.
//!
//! Every frame, even an empty one, travels as `count` packets that share a
//! packet id and carry their index. The receiving side keys partial frames by
//! `(source, packet id)` in a fixed-capacity slot table; fragments may arrive
//! in any order and duplicates are harmless.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use bytes::{Bytes, BytesMut};
use rnsnow_transport::PeerAddr;
use tracing::{debug, trace};

use crate::error::{LinkError, Result};
use crate::packet::{FrameType, GroupId, Packet, PacketHeader, MAX_FRAGMENTS, MAX_FRAGMENT_PAYLOAD};

/// Default number of partial frames held at once.
pub const DEFAULT_REASSEMBLY_CAPACITY: usize = 16;

/// Default age after which a partial frame is discarded.
pub const DEFAULT_REASSEMBLY_TIMEOUT: Duration = Duration::from_secs(5);

/// Source of packet ids. Increments per frame and wraps at `u16::MAX`.
#[derive(Debug, Clone, Default)]
pub struct PacketIdGenerator {
    last: u16,
}

impl PacketIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start so that the next id handed out is `first`.
    pub fn starting_at(first: u16) -> Self {
        Self {
            last: first.wrapping_sub(1),
        }
    }

    pub fn next_id(&mut self) -> u16 {
        self.last = self.last.wrapping_add(1);
        self.last
    }
}

/// Splits frames into radio packets.
#[derive(Debug)]
pub struct Fragmenter {
    group: GroupId,
    max_payload: usize,
    ids: PacketIdGenerator,
}

impl Fragmenter {
    /// Fragment into packets carrying up to [`MAX_FRAGMENT_PAYLOAD`] bytes each.
    pub fn new(group: GroupId) -> Self {
        Self {
            group,
            max_payload: MAX_FRAGMENT_PAYLOAD,
            ids: PacketIdGenerator::new(),
        }
    }

    /// Fragment with a smaller per-packet payload.
    pub fn with_payload_size(group: GroupId, max_payload: usize) -> Result<Self> {
        if max_payload == 0 || max_payload > MAX_FRAGMENT_PAYLOAD {
            return Err(LinkError::Config(format!(
                "fragment payload size {max_payload} outside 1..={MAX_FRAGMENT_PAYLOAD}"
            )));
        }
        Ok(Self {
            group,
            max_payload,
            ids: PacketIdGenerator::new(),
        })
    }

    /// Split `frame` into encoded packets, in index order.
    ///
    /// The packet count is `ceil(len / payload size)`, with an empty frame
    /// producing a single packet with an empty payload. Every call consumes
    /// a fresh packet id.
    pub fn fragment(&mut self, frame_type: FrameType, frame: &[u8]) -> Result<Vec<Bytes>> {
        let count = frame.len().div_ceil(self.max_payload).max(1);
        if count > MAX_FRAGMENTS {
            return Err(LinkError::FrameTooLarge {
                size: frame.len(),
                max: self.max_frame_size(),
            });
        }

        let packet_id = self.ids.next_id();
        let mut packets = Vec::with_capacity(count);
        let mut chunks = frame.chunks(self.max_payload);
        for index in 0..count {
            let chunk = chunks.next().unwrap_or(&[]);
            let header = PacketHeader {
                group: self.group,
                frame_type,
                packet_id,
                fragment_index: index as u8,
                fragment_count: count as u8,
            };
            let mut buf = BytesMut::new();
            header.encode(chunk, &mut buf)?;
            packets.push(buf.freeze());
        }

        trace!(
            packet_id,
            count,
            len = frame.len(),
            frame_type = frame_type.as_str(),
            "frame fragmented"
        );
        Ok(packets)
    }

    /// Largest frame that fits in [`MAX_FRAGMENTS`] packets.
    pub fn max_frame_size(&self) -> usize {
        MAX_FRAGMENTS * self.max_payload
    }

    pub fn group(&self) -> GroupId {
        self.group
    }

    pub fn set_group(&mut self, group: GroupId) {
        self.group = group;
    }
}

/// A frame put back together from its fragments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reassembled {
    pub source: PeerAddr,
    pub frame_type: FrameType,
    pub packet_id: u16,
    pub payload: Bytes,
}

/// Counters kept by the [`Reassembler`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct ReassemblyStats {
    /// Frames completed, including single-packet frames.
    pub completed: u64,
    /// Fragments dropped because they disagreed with an existing entry.
    pub conflicts: u64,
    /// Fragments whose index was already held.
    pub duplicates: u64,
    /// Entries discarded by the timeout.
    pub expired: u64,
    /// Entries discarded to make room for a new one.
    pub evicted: u64,
}

/// A partially received frame.
#[derive(Debug)]
struct ReassemblyEntry {
    source: PeerAddr,
    packet_id: u16,
    frame_type: FrameType,
    fragments: Vec<Option<Bytes>>,
    received: usize,
    created: Instant,
}

impl ReassemblyEntry {
    fn is_complete(&self) -> bool {
        self.received == self.fragments.len()
    }

    fn assemble(self) -> Bytes {
        let len = self.fragments.iter().flatten().map(Bytes::len).sum();
        let mut out = BytesMut::with_capacity(len);
        for part in self.fragments.into_iter().flatten() {
            out.extend_from_slice(&part);
        }
        out.freeze()
    }
}

/// Reassembles fragments into frames.
///
/// Partial frames live in a fixed number of slots. When every slot is taken
/// the oldest entry is evicted to make room.
#[derive(Debug)]
pub struct Reassembler {
    slots: Vec<Option<ReassemblyEntry>>,
    index: HashMap<(PeerAddr, u16), usize>,
    timeout: Duration,
    stats: ReassemblyStats,
}

impl Default for Reassembler {
    fn default() -> Self {
        Self::new(DEFAULT_REASSEMBLY_CAPACITY, DEFAULT_REASSEMBLY_TIMEOUT)
    }
}

impl Reassembler {
    pub fn new(capacity: usize, timeout: Duration) -> Self {
        let capacity = capacity.max(1);
        Self {
            slots: (0..capacity).map(|_| None).collect(),
            index: HashMap::with_capacity(capacity),
            timeout,
            stats: ReassemblyStats::default(),
        }
    }

    /// Accept one fragment from `source`.
    ///
    /// Returns the complete frame once every index has been seen. A fragment
    /// whose count or frame type disagrees with the existing entry is dropped
    /// and the entry is left as it was.
    pub fn accept(&mut self, source: PeerAddr, packet: Packet, now: Instant) -> Option<Reassembled> {
        let header = packet.header;
        let key = (source, header.packet_id);

        let slot = match self.index.get(&key) {
            Some(&slot) => slot,
            None if header.fragment_count == 1 => {
                self.stats.completed += 1;
                return Some(Reassembled {
                    source,
                    frame_type: header.frame_type,
                    packet_id: header.packet_id,
                    payload: packet.payload,
                });
            }
            None => self.insert(key, header, now),
        };
        let Some(entry) = self.slots[slot].as_mut() else {
            self.index.remove(&key);
            return None;
        };

        if entry.fragments.len() != header.fragment_count as usize
            || entry.frame_type != header.frame_type
        {
            debug!(
                %source,
                packet_id = header.packet_id,
                expected = entry.fragments.len(),
                got = header.fragment_count,
                "fragment conflicts with pending frame, dropped"
            );
            self.stats.conflicts += 1;
            return None;
        }

        let part = &mut entry.fragments[header.fragment_index as usize];
        if part.is_some() {
            self.stats.duplicates += 1;
            return None;
        }
        *part = Some(packet.payload);
        entry.received += 1;

        if !entry.is_complete() {
            return None;
        }

        self.index.remove(&key);
        let entry = self.slots[slot].take()?;
        self.stats.completed += 1;
        trace!(%source, packet_id = entry.packet_id, "frame reassembled");
        Some(Reassembled {
            source,
            frame_type: entry.frame_type,
            packet_id: entry.packet_id,
            payload: entry.assemble(),
        })
    }

    fn insert(&mut self, key: (PeerAddr, u16), header: PacketHeader, now: Instant) -> usize {
        let slot = match self.slots.iter().position(Option::is_none) {
            Some(free) => free,
            None => {
                let oldest = self
                    .slots
                    .iter()
                    .enumerate()
                    .filter_map(|(i, e)| e.as_ref().map(|e| (i, e.created)))
                    .min_by_key(|&(_, created)| created)
                    .map(|(i, _)| i)
                    .unwrap_or(0);
                if let Some(old) = self.slots[oldest].take() {
                    debug!(
                        source = %old.source,
                        packet_id = old.packet_id,
                        "reassembly table full, oldest entry evicted"
                    );
                    self.index.remove(&(old.source, old.packet_id));
                    self.stats.evicted += 1;
                }
                oldest
            }
        };

        self.slots[slot] = Some(ReassemblyEntry {
            source: key.0,
            packet_id: key.1,
            frame_type: header.frame_type,
            fragments: vec![None; header.fragment_count as usize],
            received: 0,
            created: now,
        });
        self.index.insert(key, slot);
        slot
    }

    /// Drop every entry older than the timeout. Returns how many were dropped.
    pub fn evict_expired(&mut self, now: Instant) -> usize {
        let mut dropped = 0;
        for slot in &mut self.slots {
            let expired = slot
                .as_ref()
                .is_some_and(|e| now.saturating_duration_since(e.created) > self.timeout);
            if !expired {
                continue;
            }
            if let Some(old) = slot.take() {
                trace!(
                    source = %old.source,
                    packet_id = old.packet_id,
                    received = old.received,
                    expected = old.fragments.len(),
                    "partial frame expired"
                );
                self.index.remove(&(old.source, old.packet_id));
                dropped += 1;
            }
        }
        self.stats.expired += dropped as u64;
        dropped
    }

    /// Discard all partial frames.
    pub fn clear(&mut self) {
        for slot in &mut self.slots {
            *slot = None;
        }
        self.index.clear();
    }

    /// Discard all partial frames and resize the table. Counters are kept.
    pub fn reconfigure(&mut self, capacity: usize, timeout: Duration) {
        let capacity = capacity.max(1);
        self.slots = (0..capacity).map(|_| None).collect();
        self.index.clear();
        self.timeout = timeout;
    }

    /// Whether a partial frame is held for this key.
    pub fn contains(&self, source: &PeerAddr, packet_id: u16) -> bool {
        self.index.contains_key(&(*source, packet_id))
    }

    /// Fragments received so far for a partial frame.
    pub fn progress(&self, source: &PeerAddr, packet_id: u16) -> Option<(usize, usize)> {
        let slot = *self.index.get(&(*source, packet_id))?;
        self.slots[slot]
            .as_ref()
            .map(|e| (e.received, e.fragments.len()))
    }

    /// Number of partial frames held.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn stats(&self) -> ReassemblyStats {
        self.stats
    }
}
