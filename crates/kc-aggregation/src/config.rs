//! Configuration for the aggregation subsystem.
//!
//! Durations are plain seconds in the file format; accessors convert to
//! `Duration` at use sites.

use serde::Deserialize;
use std::time::Duration;

/// Runtime configuration for the aggregator.
#[derive(Clone, Debug, Deserialize)]
pub struct AggregatorConfig {
    /// Master switch. When off the node only forwards candidates.
    pub enable_aggregator: bool,

    /// Close a window early once this many candidates are collected.
    pub max_candidates: u64,

    /// Warn (but still select) when a window closes with fewer candidates.
    pub min_candidates: u64,

    /// Overall bound on one aggregation round, seconds.
    pub collection_timeout: u64,

    /// Intake duration of a collection window, seconds.
    pub collection_window_duration: u64,

    /// Bound on broadcasting the finalized block, seconds.
    pub distribution_timeout: u64,

    /// Cadence at which an open round re-checks its close conditions,
    /// seconds.
    pub selection_interval: u64,

    /// Minimum peers an aggregator wants before a round is considered
    /// well-connected (environment validation enforces >= 3 in prod).
    pub min_peer_threshold: usize,

    /// Largest tolerated candidate propagation delay, seconds. Rounds whose
    /// mean receive delay exceeds this are flagged in diagnostics.
    pub max_propagation_delay: u64,

    /// TTL for cached peer/topic lookups, seconds.
    pub network_cache_ttl: u64,

    /// Forwarding behavior when the local node is not elected.
    pub forward: ForwardConfig,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            enable_aggregator: true,
            max_candidates: 32,
            min_candidates: 1,
            collection_timeout: 20,
            collection_window_duration: 10,
            distribution_timeout: 10,
            selection_interval: 1,
            min_peer_threshold: 3,
            max_propagation_delay: 5,
            network_cache_ttl: 30,
            forward: ForwardConfig::default(),
        }
    }
}

impl AggregatorConfig {
    /// Intake window duration.
    pub fn window_duration(&self) -> Duration {
        Duration::from_secs(self.collection_window_duration)
    }

    /// Overall round bound.
    pub fn round_timeout(&self) -> Duration {
        Duration::from_secs(self.collection_timeout)
    }

    /// Broadcast bound.
    pub fn broadcast_timeout(&self) -> Duration {
        Duration::from_secs(self.distribution_timeout)
    }
}

/// Forwarding and peer-health configuration.
#[derive(Clone, Debug, Deserialize)]
pub struct ForwardConfig {
    /// Retries per target before moving to the next one.
    pub max_retries: u32,

    /// First backoff delay, milliseconds.
    pub retry_backoff_base: u64,

    /// Backoff cap, milliseconds.
    pub retry_backoff_max: u64,

    /// Multiplier applied per retry.
    pub retry_backoff_factor: u32,

    /// Per-call timeout, milliseconds.
    pub call_timeout: u64,

    /// Scale the call timeout with the attempt number.
    pub enable_dynamic_timeout: bool,

    /// Dynamic timeout floor, milliseconds.
    pub min_timeout: u64,

    /// Dynamic timeout ceiling, milliseconds.
    pub max_timeout: u64,

    /// Fall back to the next-closest nodes when the primary is unreachable.
    pub enable_backup_nodes: bool,

    /// How many backup nodes to consider after the primary.
    pub backup_node_count: usize,

    /// How many protocol-incompatible peers to skip before giving up.
    pub max_protocol_retries: u32,

    /// Health score subtracted on a failed call.
    pub failure_penalty: u32,

    /// Health score added on a successful call.
    pub success_bonus: u32,

    /// Seconds per point of passive recovery toward full health.
    pub recovery_interval: u64,

    /// Peers below this score are skipped entirely.
    pub min_health_score: u32,
}

impl Default for ForwardConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_backoff_base: 200,
            retry_backoff_max: 5_000,
            retry_backoff_factor: 2,
            call_timeout: 3_000,
            enable_dynamic_timeout: false,
            min_timeout: 1_000,
            max_timeout: 10_000,
            enable_backup_nodes: true,
            backup_node_count: 2,
            max_protocol_retries: 2,
            failure_penalty: 20,
            success_bonus: 10,
            recovery_interval: 60,
            min_health_score: 40,
        }
    }
}

impl ForwardConfig {
    /// Timeout to apply to the given zero-based attempt.
    pub fn call_timeout_for(&self, attempt: u32) -> Duration {
        let base = self.call_timeout;
        let ms = if self.enable_dynamic_timeout {
            let scaled = base.saturating_mul(u64::from(attempt) + 1);
            scaled.clamp(self.min_timeout, self.max_timeout)
        } else {
            base
        };
        Duration::from_millis(ms)
    }
}

/// Candidate validation thresholds.
#[derive(Clone, Debug, Deserialize)]
pub struct ValidationConfig {
    /// Hard bound on |candidate timestamp - local clock|, seconds.
    pub max_timestamp_offset: u64,

    /// Minimum transactions a candidate must carry (the incentive
    /// transaction counts).
    pub min_transaction_count: usize,

    /// Maximum canonical serialized block size, bytes.
    pub max_block_size: usize,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            max_timestamp_offset: 300,
            min_transaction_count: 1,
            max_block_size: 4 * 1024 * 1024,
        }
    }
}

/// Heuristic wall-clock bounds, distinct from the consensus drift rule.
/// Candidates more than 2 minutes ahead or 10 minutes behind are rejected
/// before any chain lookups happen.
pub(crate) const HEURISTIC_FUTURE_SECS: u64 = 120;
pub(crate) const HEURISTIC_PAST_SECS: u64 = 600;
