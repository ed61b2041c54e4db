//! Quorum/tip gate.
//!
//! Runs before every mining round and decides whether mining is safe:
//!
//! 1. Local tip must be readable (hard requirement).
//! 2. Enough same-chain peers must be reachable (peer quorum).
//! 3. Local height must align with the peer median (height parity).
//!
//! Peers are interrogated with a bounded-concurrency hello-v2 fan-out;
//! peers on a different chain identity are disqualified. A height conflict
//! that persists past a grace period degrades to "mine anyway, demand a
//! manual check" so a partition cannot halt the network forever.


use crate::config::MinerConfig;
use crate::error::MiningError;
use crate::metrics;
use crate::ports::{ChainQuery, HelloService, PeerDirectory};
use parking_lot::Mutex;
use serde::Serialize;
use shared_types::{NodeId, TimeSource};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

/// How long a height conflict may persist before the gate degrades to
/// allowing mining with a manual-check demand.
const CONFLICT_DEGRADE_SECS: u64 = 30 * 60;

/// Gate state, most specific first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum QuorumState {
    /// Chain tip not readable yet (or at all).
    NotStarted,
    /// No peers seen so far.
    Discovering,
    /// Peers seen, quorum not yet met.
    QuorumPending,
    /// Quorum met; height conflict within the recovery grace period.
    QuorumReached,
    /// Quorum met and heights aligned. Mining allowed.
    HeightAligned,
    /// Quorum met but heights diverge beyond tolerance.
    HeightConflict,
    /// Discovery timed out with no quorum.
    Isolated,
}

/// Operator action hint attached to a gate result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SuggestedAction {
    /// Trigger or wait for a sync.
    Sync,
    /// Wait for discovery/quorum.
    Wait,
    /// Local store needs repair.
    Repair,
    /// Inspect network connectivity.
    CheckNetwork,
    /// Mining solo in a test configuration.
    SingleNodeWarning,
    /// Degraded mode: a human must look at the network.
    ManualCheckRequired,
    /// Nothing to do.
    None,
}

impl SuggestedAction {
    /// Stable string form for logs and RPC surfaces.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sync => "sync",
            Self::Wait => "wait",
            Self::Repair => "repair",
            Self::CheckNetwork => "check_network",
            Self::SingleNodeWarning => "single_node_warning",
            Self::ManualCheckRequired => "manual_check_required",
            Self::None => "",
        }
    }
}

/// Chain-tip prerequisite computed at the start of a gate check.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ChainTipStatus {
    /// Tip header readable from the local store.
    pub tip_readable: bool,
    /// Tip timestamp, unix seconds.
    pub tip_timestamp: u64,
    /// Tip age against the local clock, seconds.
    pub tip_age_secs: u64,
    /// Tip younger than the staleness bound. Meaningful only when the
    /// freshness check is enabled.
    pub tip_fresh: bool,
    /// `readable && (!freshness_check || fresh)`.
    pub tip_healthy: bool,
}

/// Numeric detail behind a gate decision.
#[derive(Debug, Clone, Default, Serialize)]
pub struct QuorumMetrics {
    /// Peers known to discovery.
    pub discovered_peers: usize,
    /// Peers currently connected.
    pub connected_peers: usize,
    /// Connected peers that answered hello-v2 on the same chain identity.
    pub qualified_peers: usize,
    /// Required node total (peers + self).
    pub required_total: usize,
    /// Current node total (qualified + self).
    pub current_total: usize,
    /// Whether quorum is currently met.
    pub quorum_reached: bool,
    /// Local best height.
    pub local_height: u64,
    /// Heights reported by qualified peers.
    pub peer_heights: HashMap<NodeId, u64>,
    /// Median of `peer_heights` (local height when the median is zero on a
    /// non-empty chain).
    pub median_peer_height: u64,
    /// `local - median`, signed.
    pub height_skew: i64,
    /// When this discovery epoch started.
    pub discovery_started_at: u64,
    /// When quorum was first reached this epoch.
    pub quorum_reached_at: Option<u64>,
}

/// Outcome of one gate check.
#[derive(Debug, Clone)]
pub struct QuorumResult {
    /// Gate state.
    pub state: QuorumState,
    /// Whether the round may proceed.
    pub allow_mining: bool,
    /// Human-readable explanation.
    pub reason: String,
    /// Operator action hint.
    pub suggested_action: SuggestedAction,
    /// Numeric detail.
    pub metrics: QuorumMetrics,
    /// Tip prerequisite detail.
    pub chain_tip: ChainTipStatus,
}

impl QuorumResult {
    /// Convert a denial into the error the orchestrator propagates.
    pub fn to_error(&self) -> MiningError {
        MiningError::GateBlocked {
            state: self.state,
            reason: self.reason.clone(),
            suggested_action: self.suggested_action,
        }
    }
}

struct GateEpoch {
    discovery_started_at: u64,
    quorum_reached_at: Option<u64>,
    conflict_since: Option<u64>,
}

/// The pre-mining safety gate.
pub struct QuorumGate {
    chain: Arc<dyn ChainQuery>,
    peers: Arc<dyn PeerDirectory>,
    hello: Arc<dyn HelloService>,
    clock: Arc<dyn TimeSource>,
    config: MinerConfig,
    epoch: Mutex<GateEpoch>,
    checks_total: AtomicU64,
}

impl QuorumGate {
    /// Build a gate. The discovery epoch starts now.
    pub fn new(
        chain: Arc<dyn ChainQuery>,
        peers: Arc<dyn PeerDirectory>,
        hello: Arc<dyn HelloService>,
        clock: Arc<dyn TimeSource>,
        config: MinerConfig,
    ) -> Self {
        let started = clock.now();
        Self {
            chain,
            peers,
            hello,
            clock,
            config,
            epoch: Mutex::new(GateEpoch {
                discovery_started_at: started,
                quorum_reached_at: None,
                conflict_since: None,
            }),
            checks_total: AtomicU64::new(0),
        }
    }

    /// Restart the discovery epoch. Called on the Idle -> Active miner
    /// transition; `quorum_reached_at` is reset only here.
    pub fn reset_epoch(&self) {
        let mut epoch = self.epoch.lock();
        epoch.discovery_started_at = self.clock.now();
        epoch.quorum_reached_at = None;
        epoch.conflict_since = None;
    }

    /// Total checks run, for observability.
    pub fn checks_total(&self) -> u64 {
        self.checks_total.load(Ordering::Relaxed)
    }

    /// Run the full gate check.
    pub async fn check(&self) -> QuorumResult {
        self.checks_total.fetch_add(1, Ordering::Relaxed);
        let result = self.check_inner().await;
        metrics::record_gate_check(result.state, result.allow_mining);
        debug!(
            "[kc-mining] gate: state={:?} allow={} reason={} action={}",
            result.state,
            result.allow_mining,
            result.reason,
            result.suggested_action.as_str()
        );
        result
    }

    async fn check_inner(&self) -> QuorumResult {
        let now = self.clock.now();

        // Step 1: local tip must be identifiable.
        let info = match self.chain.chain_info().await {
            Ok(info) => info,
            Err(err) => {
                return self.deny(
                    QuorumState::NotStarted,
                    format!("chain tip unreadable: {err}"),
                    SuggestedAction::Repair,
                    QuorumMetrics::default(),
                    ChainTipStatus::default(),
                );
            }
        };
        if info.height > 0 && info.best_block_hash == [0u8; 32] {
            return self.deny(
                QuorumState::NotStarted,
                "chain tip hash is empty above genesis".into(),
                SuggestedAction::Repair,
                QuorumMetrics::default(),
                ChainTipStatus::default(),
            );
        }

        // Step 2: chain-tip prerequisite. A missing tip header is a hard
        // deny; a stale one only flags the result.
        let tip_header = self.chain.header_by_height(info.height).await.ok().flatten();
        let chain_tip = match tip_header {
            Some(header) if info.is_ready => {
                let age = now.saturating_sub(header.timestamp);
                let fresh = age <= self.config.max_tip_staleness_seconds;
                ChainTipStatus {
                    tip_readable: true,
                    tip_timestamp: header.timestamp,
                    tip_age_secs: age,
                    tip_fresh: fresh,
                    tip_healthy: !self.config.enable_tip_freshness_check || fresh,
                }
            }
            _ => {
                return self.deny(
                    QuorumState::NotStarted,
                    format!("tip header at height {} not readable", info.height),
                    SuggestedAction::Repair,
                    QuorumMetrics {
                        local_height: info.height,
                        ..Default::default()
                    },
                    ChainTipStatus::default(),
                );
            }
        };
        if !chain_tip.tip_healthy {
            warn!(
                "[kc-mining] tip is stale (age {}s > {}s); mining continues",
                chain_tip.tip_age_secs, self.config.max_tip_staleness_seconds
            );
        }

        // Step 3: bounded-concurrency hello fan-out over connected peers.
        let discovered = self.peers.discovered_peers();
        let connected = self.peers.connected_peers();
        let peer_heights = self.probe_peers(&connected).await;

        // Step 4: quorum math.
        let required_total = self.config.required_quorum_total();
        let current_total = peer_heights.len() + 1;
        let discovery_started_at = self.epoch.lock().discovery_started_at;
        let discovery_elapsed = now.saturating_sub(discovery_started_at);

        let mut metrics = QuorumMetrics {
            discovered_peers: discovered.len(),
            connected_peers: connected.len(),
            qualified_peers: peer_heights.len(),
            required_total,
            current_total,
            quorum_reached: current_total >= required_total,
            local_height: info.height,
            peer_heights: peer_heights.clone(),
            median_peer_height: 0,
            height_skew: 0,
            discovery_started_at,
            quorum_reached_at: self.epoch.lock().quorum_reached_at,
        };

        if current_total < required_total {
            let discovery_timed_out =
                discovery_elapsed > self.config.network_discovery_timeout_seconds;
            if discovery_timed_out && self.config.allow_single_node_mining {
                warn!(
                    "[kc-mining] isolated after {}s of discovery; single-node mining allowed \
                     (test mode)",
                    discovery_elapsed
                );
                return self.verdict(
                    QuorumState::Isolated,
                    true,
                    "isolated: single-node mining allowed (test mode)".into(),
                    SuggestedAction::SingleNodeWarning,
                    metrics,
                    chain_tip,
                );
            }
            if discovery_timed_out {
                return self.deny(
                    QuorumState::Isolated,
                    format!(
                        "isolated: {} of {} required nodes after {}s of discovery",
                        current_total, required_total, discovery_elapsed
                    ),
                    SuggestedAction::CheckNetwork,
                    metrics,
                    chain_tip,
                );
            }
            if !connected.is_empty() || !discovered.is_empty() {
                return self.deny(
                    QuorumState::QuorumPending,
                    format!(
                        "quorum pending: {} of {} required nodes",
                        current_total, required_total
                    ),
                    SuggestedAction::Wait,
                    metrics,
                    chain_tip,
                );
            }
            return self.deny(
                QuorumState::Discovering,
                "discovering peers".into(),
                SuggestedAction::Wait,
                metrics,
                chain_tip,
            );
        }

        // First time quorum is met this epoch.
        let quorum_reached_at = {
            let mut epoch = self.epoch.lock();
            *epoch.quorum_reached_at.get_or_insert(now)
        };
        metrics.quorum_reached_at = Some(quorum_reached_at);

        // Step 6: height alignment.
        if !self.config.enable_network_alignment_check {
            self.epoch.lock().conflict_since = None;
            return self.verdict(
                QuorumState::HeightAligned,
                true,
                "quorum reached; alignment check disabled".into(),
                SuggestedAction::None,
                metrics,
                chain_tip,
            );
        }

        let mut heights: Vec<u64> = peer_heights.values().copied().collect();
        heights.sort_unstable();
        let mut median = heights[heights.len() / 2];
        if median == 0 && info.height > 0 {
            // Defensive: an all-zero peer view on a non-empty chain says
            // more about the peers than about us.
            median = info.height;
        }
        metrics.median_peer_height = median;
        metrics.height_skew = info.height as i64 - median as i64;

        // Genesis special case: a fresh node among established peers must
        // sync, never mine height 1.
        if info.height == 0 && peer_heights.values().any(|h| *h > 1) {
            return self.deny(
                QuorumState::HeightConflict,
                "local chain at genesis while peers are ahead".into(),
                SuggestedAction::Sync,
                metrics,
                chain_tip,
            );
        }

        if metrics.height_skew.unsigned_abs() <= self.config.max_height_skew {
            self.epoch.lock().conflict_since = None;
            return self.verdict(
                QuorumState::HeightAligned,
                true,
                format!("height aligned (skew {})", metrics.height_skew),
                SuggestedAction::None,
                metrics,
                chain_tip,
            );
        }

        // Conflict path. Remember when it started.
        let conflict_since = {
            let mut epoch = self.epoch.lock();
            *epoch.conflict_since.get_or_insert(now)
        };

        if now.saturating_sub(quorum_reached_at) < self.config.quorum_recovery_timeout_seconds {
            return self.deny(
                QuorumState::QuorumReached,
                format!(
                    "height skew {} exceeds {} within recovery grace",
                    metrics.height_skew, self.config.max_height_skew
                ),
                SuggestedAction::Sync,
                metrics,
                chain_tip,
            );
        }

        if now.saturating_sub(conflict_since) > CONFLICT_DEGRADE_SECS {
            warn!(
                "[kc-mining] height conflict has persisted {}s; degrading to allow mining - \
                 manual check required (local={} median={})",
                now.saturating_sub(conflict_since),
                info.height,
                median
            );
            return self.verdict(
                QuorumState::HeightAligned,
                true,
                format!(
                    "height conflict persisted past {}s; mining degraded",
                    CONFLICT_DEGRADE_SECS
                ),
                SuggestedAction::ManualCheckRequired,
                metrics,
                chain_tip,
            );
        }

        self.deny(
            QuorumState::HeightConflict,
            format!(
                "height skew {} exceeds tolerance {}",
                metrics.height_skew, self.config.max_height_skew
            ),
            SuggestedAction::Sync,
            metrics,
            chain_tip,
        )
    }

    /// Hello-v2 fan-out bounded by a semaphore. Disqualifies peers on a
    /// different chain identity and peers that fail to answer.
    async fn probe_peers(&self, connected: &[NodeId]) -> HashMap<NodeId, u64> {
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_hello.max(1)));
        let mut join_set = JoinSet::new();
        for peer in connected.iter().copied() {
            let semaphore = semaphore.clone();
            let hello = self.hello.clone();
            let expected_chain = self.config.chain_id.clone();
            join_set.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok()?;
                match hello.hello_v2(&peer).await {
                    Ok(response) if response.chain_id == expected_chain => {
                        Some((peer, response.tip_height))
                    }
                    Ok(response) => {
                        debug!(
                            "[kc-mining] peer {} disqualified: chain identity {:?}",
                            peer, response.chain_id
                        );
                        None
                    }
                    Err(err) => {
                        debug!("[kc-mining] hello to {} failed: {}", peer, err);
                        None
                    }
                }
            });
        }

        let mut heights = HashMap::new();
        while let Some(joined) = join_set.join_next().await {
            if let Ok(Some((peer, height))) = joined {
                heights.insert(peer, height);
            }
        }
        heights
    }

    fn verdict(
        &self,
        state: QuorumState,
        allow_mining: bool,
        reason: String,
        suggested_action: SuggestedAction,
        metrics: QuorumMetrics,
        chain_tip: ChainTipStatus,
    ) -> QuorumResult {
        QuorumResult {
            state,
            allow_mining,
            reason,
            suggested_action,
            metrics,
            chain_tip,
        }
    }

    fn deny(
        &self,
        state: QuorumState,
        reason: String,
        suggested_action: SuggestedAction,
        metrics: QuorumMetrics,
        chain_tip: ChainTipStatus,
    ) -> QuorumResult {
        self.verdict(state, false, reason, suggested_action, metrics, chain_tip)
    }
}
