use rnsnow_transport::PeerAddr;
use serde::Serialize;

use crate::discovery::DiscoveryOutcome;

/// Notification emitted by the bridge.
///
/// Events are fire-and-forget: a sink that cannot take one drops it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LinkEvent {
    /// The operating channel changed.
    ChannelChanged { from: u8, to: u8 },
    /// A discovery run began.
    DiscoveryStarted { candidates: Vec<u8> },
    /// A discovery run chose a channel.
    DiscoveryCompleted(DiscoveryOutcome),
    /// Nobody answered any probe; the default channel was used.
    DiscoveryExhausted { channel: u8, attempts: u32 },
    /// A discovery run was cancelled.
    DiscoveryAborted,
    /// A frame from the radio was written to the serial link.
    FrameDelivered { source: String, len: usize },
    /// A peer pinged us.
    PeerReachable {
        peer: String,
        channel: u8,
        first_seen: bool,
    },
    /// A peer has not been heard from within the peer timeout.
    PeerLost { peer: String },
}

impl LinkEvent {
    pub(crate) fn frame_delivered(source: PeerAddr, len: usize) -> Self {
        Self::FrameDelivered {
            source: source.to_string(),
            len,
        }
    }
}

/// Receives bridge events.
pub trait EventSink {
    fn emit(&mut self, event: LinkEvent);
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&mut self, _event: LinkEvent) {}
}

impl EventSink for Vec<LinkEvent> {
    fn emit(&mut self, event: LinkEvent) {
        self.push(event);
    }
}

impl EventSink for std::sync::mpsc::SyncSender<LinkEvent> {
    fn emit(&mut self, event: LinkEvent) {
        let _ = self.try_send(event);
    }
}

#[cfg(feature = "async")]
impl EventSink for tokio::sync::mpsc::Sender<LinkEvent> {
    fn emit(&mut self, event: LinkEvent) {
        if let Err(err) = self.try_send(event) {
            tracing::trace!(error = %err, "event dropped");
        }
    }
}

impl<E: EventSink + ?Sized> EventSink for Box<E> {
    fn emit(&mut self, event: LinkEvent) {
        (**self).emit(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounded_sink_drops_when_full() {
        let (mut tx, rx) = std::sync::mpsc::sync_channel(1);
        tx.emit(LinkEvent::DiscoveryAborted);
        tx.emit(LinkEvent::ChannelChanged { from: 1, to: 6 });

        assert_eq!(rx.try_recv().unwrap(), LinkEvent::DiscoveryAborted);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_event_json_shape() {
        let json = serde_json::to_value(LinkEvent::ChannelChanged { from: 1, to: 11 }).unwrap();
        assert_eq!(json["event"], "channel_changed");
        assert_eq!(json["to"], 11);
    }

    #[test]
    fn test_vec_and_null_sinks() {
        let mut events = Vec::new();
        events.emit(LinkEvent::DiscoveryAborted);
        assert_eq!(events.len(), 1);
        NullSink.emit(LinkEvent::DiscoveryAborted);
    }
}
