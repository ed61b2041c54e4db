//! Time rules: median time past, earliest allowed timestamp, future drift.

use crate::error::{RuleKind, RuleResult, RuleViolation};
use crate::params::ConsensusParams;
use shared_types::BlockHeader;

/// Median of the trailing `mtp_window` timestamps.
///
/// Serves as the consensus lower bound on candidate timestamps: a miner
/// cannot date a block earlier than the median of its recent ancestors.
/// Returns 0 for an empty history.
pub fn median_time_past(past_timestamps: &[u64], mtp_window: usize) -> u64 {
    if past_timestamps.is_empty() || mtp_window == 0 {
        return 0;
    }
    let start = past_timestamps.len().saturating_sub(mtp_window);
    let mut window: Vec<u64> = past_timestamps[start..].to_vec();
    window.sort_unstable();
    window[window.len() / 2]
}

/// Earliest timestamp the child of `parent` may carry.
///
/// `max(parent.timestamp + min_block_interval_s, median_time_past)`.
/// An empty chain (no parent) returns 0: the genesis slot is always open.
///
/// Monotone non-decreasing in both the parent timestamp and the configured
/// minimum interval.
pub fn earliest_allowed_timestamp(
    parent: Option<&BlockHeader>,
    past_timestamps: &[u64],
    params: &ConsensusParams,
) -> u64 {
    let parent = match parent {
        Some(header) => header,
        None => return 0,
    };
    let interval_floor = parent.timestamp.saturating_add(params.min_block_interval_s);
    let mtp = median_time_past(past_timestamps, params.mtp_window);
    interval_floor.max(mtp)
}

/// Consensus validity of a candidate timestamp against local time.
pub fn check_future_drift(
    candidate_height: u64,
    candidate_timestamp: u64,
    now: u64,
    params: &ConsensusParams,
) -> RuleResult<()> {
    let limit = now.saturating_add(params.max_future_drift_s);
    if candidate_timestamp > limit {
        return Err(RuleViolation {
            kind: RuleKind::FutureTimestamp,
            parent_height: candidate_height.saturating_sub(1),
            candidate_height,
            observed: candidate_timestamp,
            expected: limit,
        });
    }
    Ok(())
}
