use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use tracing::trace;

use crate::addr::PeerAddr;
use crate::error::{Result, TransportError};
use crate::traits::{validate_channel, Radio, Received, MAX_PACKET_SIZE};

/// Packets queued per station before the oldest are dropped.
const INBOX_CAPACITY: usize = 256;

/// An in-process shared radio medium.
///
/// Every attached [`MemoryRadio`] hears packets sent on the channel it is
/// currently tuned to, except its own. Cloning the air shares the medium.
#[derive(Debug, Clone, Default)]
pub struct MemoryAir {
    inner: Arc<Mutex<AirState>>,
}

#[derive(Debug, Default)]
struct AirState {
    stations: Vec<Option<Station>>,
    transmissions: u64,
}

#[derive(Debug)]
struct Station {
    addr: PeerAddr,
    channel: u8,
    inbox: VecDeque<Received>,
    fail_sends: u32,
}

impl MemoryAir {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a new station to the medium, tuned to `channel`.
    pub fn attach(&self, addr: PeerAddr, channel: u8) -> Result<MemoryRadio> {
        validate_channel(channel)?;
        let mut state = self.lock();
        let slot = Station {
            addr,
            channel,
            inbox: VecDeque::new(),
            fail_sends: 0,
        };
        let index = match state.stations.iter().position(Option::is_none) {
            Some(free) => {
                state.stations[free] = Some(slot);
                free
            }
            None => {
                state.stations.push(Some(slot));
                state.stations.len() - 1
            }
        };
        Ok(MemoryRadio {
            air: self.clone(),
            index,
            addr,
        })
    }

    /// Total packets put on the air since creation.
    pub fn transmissions(&self) -> u64 {
        self.lock().transmissions
    }

    /// Number of stations currently attached.
    pub fn station_count(&self) -> usize {
        self.lock().stations.iter().filter(|s| s.is_some()).count()
    }

    fn lock(&self) -> MutexGuard<'_, AirState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// One station on a [`MemoryAir`].
///
/// Detaches from the medium when dropped.
#[derive(Debug)]
pub struct MemoryRadio {
    air: MemoryAir,
    index: usize,
    addr: PeerAddr,
}

impl MemoryRadio {
    /// This station's address.
    pub fn addr(&self) -> PeerAddr {
        self.addr
    }

    /// Make the next `count` sends fail with [`TransportError::SendFailed`].
    pub fn fail_next_sends(&self, count: u32) {
        let mut state = self.air.lock();
        if let Some(Some(station)) = state.stations.get_mut(self.index) {
            station.fail_sends = count;
        }
    }

    /// Number of packets waiting in this station's inbox.
    pub fn pending(&self) -> usize {
        let state = self.air.lock();
        match state.stations.get(self.index) {
            Some(Some(station)) => station.inbox.len(),
            _ => 0,
        }
    }
}

impl Radio for MemoryRadio {
    fn channel(&self) -> u8 {
        let state = self.air.lock();
        match state.stations.get(self.index) {
            Some(Some(station)) => station.channel,
            _ => 0,
        }
    }

    fn set_channel(&mut self, channel: u8) -> Result<()> {
        validate_channel(channel)?;
        let mut state = self.air.lock();
        let station = state
            .stations
            .get_mut(self.index)
            .and_then(Option::as_mut)
            .ok_or(TransportError::Closed)?;
        station.channel = channel;
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

        let mut state = self.air.lock();
        {
            let me = state
                .stations
                .get_mut(self.index)
                .and_then(Option::as_mut)
                .ok_or(TransportError::Closed)?;
            if me.fail_sends > 0 {
                me.fail_sends -= 1;
                return Err(TransportError::SendFailed("injected failure".into()));
            }
        }

        state.transmissions += 1;
        let payload = Bytes::copy_from_slice(packet);
        let source = self.addr;
        for (i, slot) in state.stations.iter_mut().enumerate() {
            let Some(station) = slot else { continue };
            if i == self.index || station.channel != channel {
                continue;
            }
            if station.inbox.len() >= INBOX_CAPACITY {
                station.inbox.pop_front();
            }
            trace!(from = %source, to = %station.addr, channel, len = packet.len(), "air delivery");
            station.inbox.push_back(Received {
                source,
                channel,
                payload: payload.clone(),
            });
        }
        Ok(())
    }

    fn try_recv(&mut self) -> Result<Option<Received>> {
        let mut state = self.air.lock();
        let station = state
            .stations
            .get_mut(self.index)
            .and_then(Option::as_mut)
            .ok_or(TransportError::Closed)?;
        Ok(station.inbox.pop_front())
    }
}

impl Drop for MemoryRadio {
    fn drop(&mut self) {
        let mut state = self.air.lock();
        if let Some(slot) = state.stations.get_mut(self.index) {
            *slot = None;
        }
    }
}
