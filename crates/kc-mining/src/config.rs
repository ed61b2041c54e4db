//! Configuration for the mining subsystem.
//!
//! Time-valued fields are seconds unless noted otherwise. The
//! consensus-critical parameter set lives in `kc-consensus-rules` and is
//! carried here verbatim.

use crate::error::{MiningError, Result};
use kc_consensus_rules::ConsensusParams;
use serde::Deserialize;
use std::time::Duration;
use tracing::warn;

/// Deployment environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Local development.
    Dev,
    /// Shared test network.
    Test,
    /// Production.
    Prod,
}

/// Network trust model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainMode {
    /// Open, permissionless network.
    Public,
    /// Closed set of known operators.
    Consortium,
    /// Single-operator network.
    Private,
}

/// Transaction selection policy for candidate building.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxSelectionMode {
    /// Highest fee first.
    FeePriority,
    /// Arrival order.
    Fifo,
}

/// What to do when a submitted block never confirms.
///
/// `"single-node"` is deliberately not a variant: skipping confirmation
/// entirely hides network splits and was removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfirmationFallback {
    /// Trigger a sync when the network is ahead, then keep mining.
    Sync,
    /// Log a diagnostic and abandon the round. Downstream sync alone is
    /// expected to close the gap; the core does nothing else.
    Drop,
}

/// Runtime configuration for the miner.
#[derive(Clone, Debug, Deserialize)]
pub struct MinerConfig {
    /// Chain identity announced in hello probes; peers on a different
    /// identity are disqualified.
    pub chain_id: String,

    /// Deployment environment, for startup validation.
    pub environment: Environment,

    /// Network trust model, for startup validation.
    pub chain_mode: ChainMode,

    /// Difficulty used when mining on an empty chain.
    pub initial_difficulty: u64,

    /// Bound on one full mining round. 0 = unlimited (default).
    pub mining_timeout: u64,

    /// Pause between rounds when the gate denies or a round fails.
    pub loop_interval: u64,

    /// Upper bound on transactions per candidate.
    pub max_transactions: usize,

    /// Lower bound on transactions per candidate.
    pub min_transactions: usize,

    /// Transaction selection policy.
    pub tx_selection_mode: TxSelectionMode,

    /// Confirmation watcher deadline.
    pub confirmation_timeout: u64,

    /// Cadence of on-chain confirmation checks.
    pub confirmation_check_interval: u64,

    /// Action on confirmation timeout.
    pub confirmation_timeout_fallback: ConfirmationFallback,

    /// Cadence of the watcher's structured diagnostic line.
    pub confirmation_diag_interval: u64,

    /// Resubmits inside this interval bump the counter without refreshing
    /// `last_submit_at`.
    pub confirmation_resubmit_min_interval: u64,

    /// Deepest rollback the height gate accepts.
    pub max_fork_depth: u64,

    /// Required node count (peers + self) before mining. Values below 2
    /// fall back to 2.
    pub min_network_quorum_total: usize,

    /// Allow mining with zero peers after discovery times out.
    /// Test environments only.
    pub allow_single_node_mining: bool,

    /// How long discovery may run before the node declares itself isolated.
    pub network_discovery_timeout_seconds: u64,

    /// Grace period after quorum in which a height conflict is treated as
    /// transient.
    pub quorum_recovery_timeout_seconds: u64,

    /// Tolerated |local - median peer| height difference.
    pub max_height_skew: u64,

    /// Tip older than this is stale.
    pub max_tip_staleness_seconds: u64,

    /// Gate on tip freshness (staleness alone never denies mining).
    pub enable_tip_freshness_check: bool,

    /// Gate on height alignment with peers.
    pub enable_network_alignment_check: bool,

    /// Concurrent hello-v2 probes during a gate check.
    pub max_concurrent_hello: usize,

    /// Gossip fanout used when announcing mined blocks.
    pub neighbor_fanout: usize,

    /// Hop limit for candidate relay.
    pub relay_hop_limit: u32,

    /// Consensus-critical rule parameters. Identical on every node.
    pub consensus: ConsensusParams,
}

impl Default for MinerConfig {
    fn default() -> Self {
        Self {
            chain_id: "kestrel-main".into(),
            environment: Environment::Dev,
            chain_mode: ChainMode::Private,
            initial_difficulty: 1_000,
            mining_timeout: 0,
            loop_interval: 2,
            max_transactions: 2_000,
            min_transactions: 1,
            tx_selection_mode: TxSelectionMode::FeePriority,
            confirmation_timeout: 120,
            confirmation_check_interval: 5,
            confirmation_timeout_fallback: ConfirmationFallback::Sync,
            confirmation_diag_interval: 30,
            confirmation_resubmit_min_interval: 10,
            max_fork_depth: 6,
            min_network_quorum_total: 2,
            allow_single_node_mining: false,
            network_discovery_timeout_seconds: 120,
            quorum_recovery_timeout_seconds: 60,
            max_height_skew: 5,
            max_tip_staleness_seconds: 600,
            enable_tip_freshness_check: true,
            enable_network_alignment_check: true,
            max_concurrent_hello: 10,
            neighbor_fanout: 8,
            relay_hop_limit: 3,
            consensus: ConsensusParams::default(),
        }
    }
}

impl MinerConfig {
    /// Effective quorum requirement: config value with a floor of 2.
    pub fn required_quorum_total(&self) -> usize {
        self.min_network_quorum_total.max(2)
    }

    /// Watcher deadline.
    pub fn confirmation_timeout(&self) -> Duration {
        Duration::from_secs(self.confirmation_timeout)
    }

    /// Watcher check cadence.
    pub fn confirmation_check_interval(&self) -> Duration {
        Duration::from_secs(self.confirmation_check_interval.max(1))
    }

    /// Watcher diagnostic cadence.
    pub fn confirmation_diag_interval(&self) -> Duration {
        Duration::from_secs(self.confirmation_diag_interval.max(1))
    }

    /// Loop backoff after gate denials and round errors.
    pub fn loop_interval(&self) -> Duration {
        Duration::from_secs(self.loop_interval.max(1))
    }

    /// Startup validation of environment-dependent requirements.
    ///
    /// In `prod` on a `public` or `consortium` chain the aggregator must be
    /// enabled and the peer threshold must be at least 3; violations are
    /// fatal. Dev and test environments may run single-node, with a loud
    /// warning.
    pub fn validate_environment(
        &self,
        enable_aggregator: bool,
        min_peer_threshold: usize,
    ) -> Result<()> {
        let hardened = self.environment == Environment::Prod
            && matches!(self.chain_mode, ChainMode::Public | ChainMode::Consortium);
        if hardened {
            if !enable_aggregator {
                return Err(MiningError::FatalConfig(
                    "prod public/consortium deployments require enable_aggregator=true".into(),
                ));
            }
            if min_peer_threshold < 3 {
                return Err(MiningError::FatalConfig(format!(
                    "prod public/consortium deployments require min_peer_threshold >= 3, got {min_peer_threshold}"
                )));
            }
            if self.allow_single_node_mining {
                return Err(MiningError::FatalConfig(
                    "allow_single_node_mining is forbidden in prod public/consortium".into(),
                ));
            }
        } else if self.allow_single_node_mining {
            warn!(
                "[kc-mining] single-node mining is enabled ({:?}/{:?}); this configuration is for \
                 development and testing only",
                self.environment, self.chain_mode
            );
        }
        self.consensus
            .validate()
            .map_err(|e| MiningError::FatalConfig(e.to_string()))?;
        Ok(())
    }
}
