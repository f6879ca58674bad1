//! Link-local peers heard through pings.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use rnsnow_transport::PeerAddr;
use serde::Serialize;

/// A peer that has pinged us.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerInfo {
    pub addr: PeerAddr,
    /// Channel the last ping arrived on.
    pub channel: u8,
    pub first_heard: Instant,
    pub last_heard: Instant,
    pub pings: u64,
}

/// Serializable view of a peer for status output.
#[derive(Debug, Clone, Serialize)]
pub struct PeerSummary {
    pub addr: String,
    pub channel: u8,
    pub pings: u64,
    pub last_heard_ms_ago: u64,
}

/// Table of known peers, keyed by address.
#[derive(Debug)]
pub struct PeerTable {
    peers: HashMap<PeerAddr, PeerInfo>,
    timeout: Duration,
}

impl PeerTable {
    /// Create an empty peer table.
    pub fn new(timeout: Duration) -> Self {
        Self {
            peers: HashMap::new(),
            timeout,
        }
    }

    /// Add a new peer or refresh an existing one.
    ///
    /// Returns `true` if this is a newly discovered peer.
    pub fn record(&mut self, addr: PeerAddr, channel: u8, now: Instant) -> bool {
        if let Some(existing) = self.peers.get_mut(&addr) {
            existing.last_heard = now;
            existing.channel = channel;
            existing.pings += 1;
            false
        } else {
            self.peers.insert(
                addr,
                PeerInfo {
                    addr,
                    channel,
                    first_heard: now,
                    last_heard: now,
                    pings: 1,
                },
            );
            true
        }
    }

    /// Remove peers that haven't been heard from within the timeout.
    ///
    /// Returns the removed addresses.
    pub fn prune(&mut self, now: Instant) -> Vec<PeerAddr> {
        let timeout = self.timeout;
        let timed_out: Vec<PeerAddr> = self
            .peers
            .values()
            .filter(|peer| now.saturating_duration_since(peer.last_heard) > timeout)
            .map(|peer| peer.addr)
            .collect();
        for addr in &timed_out {
            self.peers.remove(addr);
        }
        timed_out
    }

    pub fn get(&self, addr: &PeerAddr) -> Option<&PeerInfo> {
        self.peers.get(addr)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PeerInfo> {
        self.peers.values()
    }

    /// Peers sorted by address, for display.
    pub fn summaries(&self, now: Instant) -> Vec<PeerSummary> {
        let mut out: Vec<PeerSummary> = self
            .peers
            .values()
            .map(|p| PeerSummary {
                addr: p.addr.to_string(),
                channel: p.channel,
                pings: p.pings,
                last_heard_ms_ago: now.saturating_duration_since(p.last_heard).as_millis() as u64,
            })
            .collect();
        out.sort_by(|a, b| a.addr.cmp(&b.addr));
        out
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    pub fn clear(&mut self) {
        self.peers.clear();
    }

    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }
}
