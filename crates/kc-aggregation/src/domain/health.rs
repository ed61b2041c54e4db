//! Per-peer health scoring for candidate forwarding.
//!
//! Scores start at 100 and live in [0, 100]. Failed forwards subtract a
//! penalty, successes add a bonus, and idle peers drift back toward 100 at
//! one point per `recovery_interval` seconds. Peers under the configured
//! floor are skipped when picking a forward target.

use crate::config::ForwardConfig;
use shared_types::NodeId;
use std::collections::HashMap;

/// Full-health score.
pub const FULL_HEALTH: u32 = 100;

#[derive(Debug, Clone, Copy)]
struct PeerHealth {
    score: u32,
    last_touched: u64,
}

/// Health book for known aggregator peers.
pub struct PeerHealthBook {
    peers: HashMap<NodeId, PeerHealth>,
    failure_penalty: u32,
    success_bonus: u32,
    recovery_interval: u64,
    min_health_score: u32,
}

impl PeerHealthBook {
    /// Build a book from forwarding config.
    pub fn new(config: &ForwardConfig) -> Self {
        Self {
            peers: HashMap::new(),
            failure_penalty: config.failure_penalty,
            success_bonus: config.success_bonus,
            recovery_interval: config.recovery_interval.max(1),
            min_health_score: config.min_health_score,
        }
    }

    /// Current score for a peer. Unknown peers are at full health.
    pub fn score(&mut self, peer: &NodeId, now: u64) -> u32 {
        self.recover(peer, now);
        self.peers.get(peer).map(|p| p.score).unwrap_or(FULL_HEALTH)
    }

    /// Whether a peer is above the forwarding threshold.
    pub fn is_healthy(&mut self, peer: &NodeId, now: u64) -> bool {
        self.score(peer, now) >= self.min_health_score
    }

    /// Record a failed forward.
    pub fn record_failure(&mut self, peer: &NodeId, now: u64) {
        let penalty = self.failure_penalty;
        let entry = self.entry(peer, now);
        entry.score = entry.score.saturating_sub(penalty);
        entry.last_touched = now;
    }

    /// Record a successful forward.
    pub fn record_success(&mut self, peer: &NodeId, now: u64) {
        let bonus = self.success_bonus;
        let entry = self.entry(peer, now);
        entry.score = (entry.score + bonus).min(FULL_HEALTH);
        entry.last_touched = now;
    }

    fn entry(&mut self, peer: &NodeId, now: u64) -> &mut PeerHealth {
        self.peers.entry(*peer).or_insert(PeerHealth {
            score: FULL_HEALTH,
            last_touched: now,
        })
    }

    /// Passive recovery: one point per elapsed recovery interval.
    fn recover(&mut self, peer: &NodeId, now: u64) {
        if let Some(entry) = self.peers.get_mut(peer) {
            let elapsed = now.saturating_sub(entry.last_touched);
            let points = elapsed / self.recovery_interval;
            if points > 0 {
                entry.score = (entry.score + points.min(u64::from(FULL_HEALTH)) as u32)
                    .min(FULL_HEALTH);
                entry.last_touched = now;
            }
        }
    }
}
