//! Difficulty adjustment.
//!
//! Difficulty here is a scalar hardness: HIGHER difficulty = HARDER block.
//! When observed block intervals run longer than target the next difficulty
//! drops, and vice versa. Intermediate math is u128 so a full-range u64
//! difficulty times a 4_000_000 PPM ratio cannot overflow.

use crate::error::RuleResult;
use crate::params::{ConsensusParams, PPM_DENOM};
use shared_types::BlockHeader;

/// Compute the difficulty for the child of `parent`.
///
/// `window_times` are the timestamps of the most recent blocks, oldest
/// first, parent included. Only the trailing `difficulty_window` entries are
/// used. With fewer than two usable timestamps there is no observable
/// interval, and the parent difficulty is carried forward (clamped).
pub fn next_difficulty(
    parent: &BlockHeader,
    window_times: &[u64],
    params: &ConsensusParams,
) -> RuleResult<u64> {
    params.validate()?;

    let window = trailing_window(window_times, params.difficulty_window);
    if window.len() < 2 {
        return Ok(params.clamp_difficulty(parent.difficulty));
    }

    let observed_avg = average_interval(window);

    // Ratio of target to observed pace, clamped so one bad window cannot
    // swing difficulty arbitrarily far.
    let raw_ratio_ppm =
        (params.target_block_time_s as u128 * PPM_DENOM as u128) / observed_avg as u128;
    let ratio_ppm = raw_ratio_ppm
        .clamp(params.max_adjust_down_ppm as u128, params.max_adjust_up_ppm as u128);

    let mut candidate = (parent.difficulty as u128 * ratio_ppm) / PPM_DENOM as u128;

    if params.ema_alpha_ppm > 0 {
        let alpha = params.ema_alpha_ppm as u128;
        candidate = (alpha * candidate + (PPM_DENOM as u128 - alpha) * parent.difficulty as u128)
            / PPM_DENOM as u128;
    }

    let candidate = u64::try_from(candidate).unwrap_or(u64::MAX);
    Ok(params.clamp_difficulty(candidate))
}

/// Emergency downshift: how many bits the next block may reduce difficulty
/// by when the chain has stalled past the configured threshold.
///
/// Returns 0 when the mechanism is disabled or the stall is within bounds.
/// The shift grows by one bit per full threshold interval of excess, capped
/// at `max_emergency_downshift_bits`. Every node evaluates the same formula
/// over the same parent timestamp.
pub fn emergency_downshift_bits(parent: &BlockHeader, now: u64, params: &ConsensusParams) -> u32 {
    let threshold = params.emergency_downshift_threshold_s;
    if threshold == 0 {
        return 0;
    }
    let age = now.saturating_sub(parent.timestamp);
    if age <= threshold {
        return 0;
    }
    let excess = age - threshold;
    let bits = 1 + (excess / threshold) as u32;
    bits.min(params.max_emergency_downshift_bits)
}

/// Apply an emergency downshift to a computed difficulty.
pub fn apply_emergency_downshift(difficulty: u64, bits: u32, params: &ConsensusParams) -> u64 {
    if bits == 0 {
        return difficulty;
    }
    (difficulty >> bits.min(63)).max(params.min_difficulty)
}

fn trailing_window(times: &[u64], window: usize) -> &[u64] {
    let start = times.len().saturating_sub(window);
    &times[start..]
}

/// Average inter-block interval over an ascending timestamp window.
/// Never returns 0 so the ratio division is always defined.
fn average_interval(window: &[u64]) -> u64 {
    let first = window[0];
    let last = window[window.len() - 1];
    let total = last.saturating_sub(first);
    let intervals = (window.len() - 1) as u64;
    (total / intervals).max(1)
}
