//! Channel discovery.
//!
//! A scan visits each candidate channel in priority order: tune, then
//! `probes_per_channel` rounds of broadcasting a probe and listening for acks
//! for a fixed window. Acks for any probe sent during the visit add to the
//! channel's count, so a single peer answering every round can reach the
//! early-accept threshold on its own. A channel whose ack count
//! reaches the early-accept threshold wins immediately. Otherwise, once every
//! candidate has been visited, the channel with the most acks wins, with ties
//! going to the earlier candidate. When a whole scan hears nothing the scan is
//! repeated after a doubling backoff, and after the last attempt the default
//! channel is chosen unconditionally.
//!
//! [`ChannelDiscovery`] does no I/O. It is driven with the current time and
//! answers with the [`DiscoveryAction`]s the caller must carry out.

use std::time::Instant;

use rnsnow_transport::validate_channel;
use serde::Serialize;
use tracing::{debug, info, trace};

use crate::config::DiscoveryConfig;

/// Something the owner of the radio must do for discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryAction {
    /// Retune the radio.
    Tune(u8),
    /// Broadcast a probe on `channel`.
    SendProbe { channel: u8, nonce: u16 },
    /// Discovery has finished.
    Complete(DiscoveryOutcome),
}

/// Result of a discovery run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiscoveryOutcome {
    /// Chosen channel.
    pub channel: u8,
    /// Acks counted on the chosen channel.
    pub responses: u32,
    /// Full scans started.
    pub attempts: u32,
    /// The scan ended early on the threshold.
    pub early: bool,
    /// Nobody answered and the default channel was chosen.
    pub fallback: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Listening {
        index: usize,
        /// Nonce of the first probe sent on this channel.
        first_nonce: u16,
        /// Probes sent on this channel so far.
        sent: u32,
        deadline: Instant,
    },
    Backoff {
        until: Instant,
    },
    Done,
}

/// One discovery run.
///
/// Created by [`ChannelDiscovery::start`] and finished once it returns
/// [`DiscoveryAction::Complete`]. Dropping it aborts the run.
#[derive(Debug)]
pub struct ChannelDiscovery {
    candidates: Vec<u8>,
    default_channel: u8,
    config: DiscoveryConfig,
    counts: Vec<u32>,
    attempts: u32,
    next_nonce: u16,
    phase: Phase,
}

/// Build the candidate list: valid preferred channels in order without
/// repeats, then the default channel last.
pub fn candidate_channels(preferred: &[u8], default_channel: u8) -> Vec<u8> {
    let mut candidates: Vec<u8> = Vec::with_capacity(preferred.len() + 1);
    for &ch in preferred {
        if ch != default_channel && validate_channel(ch).is_ok() && !candidates.contains(&ch) {
            candidates.push(ch);
        }
    }
    candidates.push(default_channel);
    candidates
}

impl ChannelDiscovery {
    /// Begin a run and return the first actions (tune and probe).
    pub fn start(
        preferred: &[u8],
        default_channel: u8,
        config: &DiscoveryConfig,
        first_nonce: u16,
        now: Instant,
    ) -> (Self, Vec<DiscoveryAction>) {
        let candidates = candidate_channels(preferred, default_channel);
        info!(?candidates, "channel discovery started");
        let mut discovery = Self {
            counts: vec![0; candidates.len()],
            candidates,
            default_channel,
            config: config.clone(),
            attempts: 0,
            next_nonce: first_nonce,
            phase: Phase::Done,
        };
        let actions = discovery.begin_scan(now);
        (discovery, actions)
    }

    fn begin_scan(&mut self, now: Instant) -> Vec<DiscoveryAction> {
        self.attempts += 1;
        self.counts.iter_mut().for_each(|c| *c = 0);
        debug!(attempt = self.attempts, "discovery scan");
        self.visit(0, now)
    }

    fn visit(&mut self, index: usize, now: Instant) -> Vec<DiscoveryAction> {
        let channel = self.candidates[index];
        let nonce = self.take_nonce();
        self.phase = Phase::Listening {
            index,
            first_nonce: nonce,
            sent: 1,
            deadline: now + self.config.listen_window(),
        };
        debug!(channel, nonce, "probing channel");
        vec![
            DiscoveryAction::Tune(channel),
            DiscoveryAction::SendProbe { channel, nonce },
        ]
    }

    /// Another probe round on the channel already tuned.
    fn reprobe(
        &mut self,
        index: usize,
        first_nonce: u16,
        sent: u32,
        now: Instant,
    ) -> Vec<DiscoveryAction> {
        let channel = self.candidates[index];
        let nonce = self.take_nonce();
        self.phase = Phase::Listening {
            index,
            first_nonce,
            sent: sent + 1,
            deadline: now + self.config.listen_window(),
        };
        trace!(channel, nonce, round = sent + 1, "probing channel again");
        vec![DiscoveryAction::SendProbe { channel, nonce }]
    }

    fn take_nonce(&mut self) -> u16 {
        let nonce = self.next_nonce;
        self.next_nonce = self.next_nonce.wrapping_add(1);
        nonce
    }

    /// Count an ack. Acks whose nonce does not belong to a probe sent on the
    /// current channel are ignored.
    pub fn on_ack(&mut self, nonce: u16, _now: Instant) -> Vec<DiscoveryAction> {
        let Phase::Listening {
            index,
            first_nonce,
            sent,
            ..
        } = self.phase
        else {
            return Vec::new();
        };
        if u32::from(nonce.wrapping_sub(first_nonce)) >= sent {
            debug!(nonce, first_nonce, sent, "stale ack ignored");
            return Vec::new();
        }

        self.counts[index] += 1;
        let count = self.counts[index];
        if count >= self.config.early_accept_threshold {
            let outcome = DiscoveryOutcome {
                channel: self.candidates[index],
                responses: count,
                attempts: self.attempts,
                early: true,
                fallback: false,
            };
            return self.finish(outcome);
        }
        Vec::new()
    }

    /// Advance on timeouts.
    pub fn poll(&mut self, now: Instant) -> Vec<DiscoveryAction> {
        match self.phase {
            Phase::Listening {
                index,
                first_nonce,
                sent,
                deadline,
            } if now >= deadline => {
                if sent < self.config.probes_per_channel {
                    return self.reprobe(index, first_nonce, sent, now);
                }
                debug!(
                    channel = self.candidates[index],
                    responses = self.counts[index],
                    "listen window closed"
                );
                if index + 1 < self.candidates.len() {
                    self.visit(index + 1, now)
                } else {
                    self.end_scan(now)
                }
            }
            Phase::Backoff { until } if now >= until => self.begin_scan(now),
            _ => Vec::new(),
        }
    }

    fn end_scan(&mut self, now: Instant) -> Vec<DiscoveryAction> {
        let mut best: Option<(usize, u32)> = None;
        for (i, &count) in self.counts.iter().enumerate() {
            if count > 0 && best.is_none_or(|(_, b)| count > b) {
                best = Some((i, count));
            }
        }

        if let Some((index, responses)) = best {
            let outcome = DiscoveryOutcome {
                channel: self.candidates[index],
                responses,
                attempts: self.attempts,
                early: false,
                fallback: false,
            };
            return self.finish(outcome);
        }

        if self.attempts >= self.config.max_attempts {
            let outcome = DiscoveryOutcome {
                channel: self.default_channel,
                responses: 0,
                attempts: self.attempts,
                early: false,
                fallback: true,
            };
            return self.finish(outcome);
        }

        let wait = self.config.backoff(self.attempts);
        debug!(attempt = self.attempts, ?wait, "no responses, backing off");
        self.phase = Phase::Backoff { until: now + wait };
        Vec::new()
    }

    fn finish(&mut self, outcome: DiscoveryOutcome) -> Vec<DiscoveryAction> {
        self.phase = Phase::Done;
        info!(
            channel = outcome.channel,
            responses = outcome.responses,
            attempts = outcome.attempts,
            fallback = outcome.fallback,
            "channel discovery complete"
        );
        vec![
            DiscoveryAction::Tune(outcome.channel),
            DiscoveryAction::Complete(outcome),
        ]
    }

    /// Stop the run without choosing a channel.
    pub fn abort(&mut self) {
        if self.is_active() {
            debug!("channel discovery aborted");
        }
        self.phase = Phase::Done;
    }

    pub fn is_active(&self) -> bool {
        self.phase != Phase::Done
    }

    /// Channel being listened on, if any.
    pub fn current_channel(&self) -> Option<u8> {
        match self.phase {
            Phase::Listening { index, .. } => Some(self.candidates[index]),
            _ => None,
        }
    }

    /// When `poll` next has something to do.
    pub fn next_deadline(&self) -> Option<Instant> {
        match self.phase {
            Phase::Listening { deadline, .. } => Some(deadline),
            Phase::Backoff { until } => Some(until),
            Phase::Done => None,
        }
    }

    pub fn candidates(&self) -> &[u8] {
        &self.candidates
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}
