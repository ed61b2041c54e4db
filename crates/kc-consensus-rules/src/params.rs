//! Consensus-critical parameters.
//!
//! Every node in a network must run the exact same values; a mismatch forks
//! the chain at the first difficulty adjustment.

use crate::error::{RuleResult, RuleViolation};
use serde::Deserialize;

/// Denominator for all parts-per-million ratios.
pub const PPM_DENOM: u64 = 1_000_000;

/// Consensus-critical rule parameters.
///
/// All ratio fields are parts-per-million integers; see [`PPM_DENOM`].
#[derive(Clone, Debug, Deserialize)]
pub struct ConsensusParams {
    /// Target time between blocks, in seconds.
    pub target_block_time_s: u64,

    /// Number of trailing timestamps used for the difficulty average.
    /// Must be at least 2.
    pub difficulty_window: usize,

    /// Upper clamp on the per-adjustment ratio (PPM, >= 1_000_000).
    pub max_adjust_up_ppm: u64,

    /// Lower clamp on the per-adjustment ratio (PPM, in (0, 1_000_000]).
    pub max_adjust_down_ppm: u64,

    /// EMA blend weight for the new candidate difficulty (PPM, 0 disables).
    pub ema_alpha_ppm: u64,

    /// Number of trailing timestamps for median time past.
    pub mtp_window: usize,

    /// Minimum seconds between a block and its parent. 0 disables.
    pub min_block_interval_s: u64,

    /// Maximum seconds a candidate timestamp may run ahead of local time.
    pub max_future_drift_s: u64,

    /// Stall length (seconds past parent timestamp) that arms the emergency
    /// downshift. 0 disables the mechanism entirely.
    pub emergency_downshift_threshold_s: u64,

    /// Hard cap on emergency downshift, in bits. Must be at least 1.
    pub max_emergency_downshift_bits: u32,

    /// Lower difficulty clamp.
    pub min_difficulty: u64,

    /// Upper difficulty clamp.
    pub max_difficulty: u64,
}

impl Default for ConsensusParams {
    fn default() -> Self {
        Self {
            target_block_time_s: 15,
            difficulty_window: 20,
            max_adjust_up_ppm: 4 * PPM_DENOM,
            max_adjust_down_ppm: PPM_DENOM / 4,
            ema_alpha_ppm: 200_000,
            mtp_window: 11,
            min_block_interval_s: 5,
            max_future_drift_s: 15,
            emergency_downshift_threshold_s: 600,
            max_emergency_downshift_bits: 4,
            min_difficulty: 1_000,
            max_difficulty: u64::MAX / 2,
        }
    }
}

impl ConsensusParams {
    /// Check the structural constraints on the parameter set.
    pub fn validate(&self) -> RuleResult<()> {
        if self.difficulty_window < 2 {
            return Err(RuleViolation::params(self.difficulty_window as u64, 2));
        }
        if self.max_adjust_up_ppm < PPM_DENOM {
            return Err(RuleViolation::params(self.max_adjust_up_ppm, PPM_DENOM));
        }
        if self.max_adjust_down_ppm == 0 || self.max_adjust_down_ppm > PPM_DENOM {
            return Err(RuleViolation::params(self.max_adjust_down_ppm, PPM_DENOM));
        }
        if self.ema_alpha_ppm > PPM_DENOM {
            return Err(RuleViolation::params(self.ema_alpha_ppm, PPM_DENOM));
        }
        if self.mtp_window == 0 {
            return Err(RuleViolation::params(0, 1));
        }
        if self.max_emergency_downshift_bits == 0 {
            return Err(RuleViolation::params(0, 1));
        }
        if self.min_difficulty == 0 || self.min_difficulty > self.max_difficulty {
            return Err(RuleViolation::params(self.min_difficulty, self.max_difficulty));
        }
        if self.target_block_time_s == 0 {
            return Err(RuleViolation::params(0, 1));
        }
        Ok(())
    }

    /// Clamp a difficulty into `[min_difficulty, max_difficulty]`.
    pub fn clamp_difficulty(&self, difficulty: u64) -> u64 {
        difficulty.clamp(self.min_difficulty, self.max_difficulty)
    }
}
