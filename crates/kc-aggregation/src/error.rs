//! Error types for the aggregation subsystem.

use shared_types::Hash;
use thiserror::Error;

/// Result type alias for aggregation operations.
pub type Result<T> = std::result::Result<T, AggregationError>;

/// Errors that can occur while validating, collecting, forwarding, or
/// finalizing candidates.
#[derive(Debug, Error)]
pub enum AggregationError {
    /// Candidate failed a structural check.
    #[error("invalid structure: {0}")]
    InvalidStructure(String),

    /// Candidate timestamp is outside acceptable bounds.
    #[error("invalid timestamp: {reason} (candidate_ts={candidate_ts}, now={now})")]
    InvalidTimestamp {
        /// Human-readable reason for the rejection.
        reason: String,
        /// Offending candidate timestamp.
        candidate_ts: u64,
        /// Local clock at validation time.
        now: u64,
    },

    /// Candidate violates the minimum block interval against its parent.
    #[error(
        "minimum block interval violated: parent_ts={parent_ts} candidate_ts={candidate_ts} \
         min_interval={min_interval}s"
    )]
    MinIntervalViolation {
        /// Parent block timestamp.
        parent_ts: u64,
        /// Candidate block timestamp.
        candidate_ts: u64,
        /// Configured minimum interval in seconds.
        min_interval: u64,
    },

    /// Candidate parent hash does not match the local best block.
    #[error("parent hash mismatch: expected {expected} got {actual}")]
    ParentHashMismatch {
        /// Local best block hash, hex.
        expected: String,
        /// Candidate parent hash, hex.
        actual: String,
    },

    /// Parent block data is not readable locally.
    #[error("missing parent block data: {0}")]
    MissingParentData(String),

    /// Candidate failed a quality filter (transaction count, block size).
    #[error("quality filter: {0}")]
    QualityFilter(String),

    /// Proof-of-work verification failed.
    #[error("invalid proof of work: {0}")]
    PoWInvalid(String),

    /// A collection window already exists for the height.
    #[error("collection window already exists for height {0}")]
    WindowExists(u64),

    /// No collection window exists for the height.
    #[error("no collection window for height {0}")]
    WindowNotFound(u64),

    /// The collection window for the height is no longer accepting.
    #[error("collection window expired for height {0}")]
    WindowExpired(u64),

    /// Forwarding to the elected aggregator failed after all retries.
    #[error("forward failed after {retries_used} retries")]
    ForwardFailed {
        /// Total attempts spent across targets.
        retries_used: u32,
    },

    /// Every known aggregator target is below the health threshold.
    #[error("no healthy aggregator available for height {0}")]
    NoHealthyAggregator(u64),

    /// The external chain query failed.
    #[error("chain query failed: {0}")]
    QueryFailed(String),

    /// The external network layer failed.
    #[error("network error: {0}")]
    NetworkError(String),

    /// Local block application failed.
    #[error("chain apply failed for {block_hash}: {reason}")]
    ApplyFailed {
        /// Hash of the block that failed to apply, hex.
        block_hash: String,
        /// Failure detail from the apply hook.
        reason: String,
    },
}

impl AggregationError {
    /// Whether the caller may treat the error as transient and try again
    /// later (window races, network hiccups).
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::WindowExists(_)
                | Self::WindowNotFound(_)
                | Self::WindowExpired(_)
                | Self::NetworkError(_)
                | Self::QueryFailed(_)
        )
    }

    /// Short stable label for metrics.
    pub fn reason_label(&self) -> &'static str {
        match self {
            Self::InvalidStructure(_) => "invalid_structure",
            Self::InvalidTimestamp { .. } => "invalid_timestamp",
            Self::MinIntervalViolation { .. } => "min_interval",
            Self::ParentHashMismatch { .. } => "parent_hash",
            Self::MissingParentData(_) => "missing_parent",
            Self::QualityFilter(_) => "quality",
            Self::PoWInvalid(_) => "pow_invalid",
            Self::WindowExists(_) => "window_exists",
            Self::WindowNotFound(_) => "window_not_found",
            Self::WindowExpired(_) => "window_expired",
            Self::ForwardFailed { .. } => "forward_failed",
            Self::NoHealthyAggregator(_) => "no_healthy_aggregator",
            Self::QueryFailed(_) => "query_failed",
            Self::NetworkError(_) => "network",
            Self::ApplyFailed { .. } => "apply_failed",
        }
    }
}

/// Hex helper for error construction.
pub(crate) fn short_hex(hash: &Hash) -> String {
    hex::encode(&hash[..8])
}
