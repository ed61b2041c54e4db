//! Error types for the mining subsystem.

use crate::gate::{QuorumState, SuggestedAction};
use crate::state::MinerState;
use thiserror::Error;

/// Result type alias for mining operations.
pub type Result<T> = std::result::Result<T, MiningError>;

/// Errors that can occur while running the mining loop.
#[derive(Debug, Error)]
pub enum MiningError {
    /// The quorum/tip gate denied mining for this round.
    #[error("mining gated: {state:?} - {reason} (suggested: {suggested_action:?})")]
    GateBlocked {
        /// Gate state at denial time.
        state: QuorumState,
        /// Human-readable denial reason.
        reason: String,
        /// Operator action hint.
        suggested_action: SuggestedAction,
    },

    /// The submitted block never appeared on-chain in time.
    #[error("confirmation timeout at height {height} after {waited_secs}s")]
    ConfirmationTimeout {
        /// Expected height.
        height: u64,
        /// Seconds waited.
        waited_secs: u64,
    },

    /// Startup configuration is unusable. Only the startup entry point may
    /// abort the process on this.
    #[error("fatal configuration error: {0}")]
    FatalConfig(String),

    /// Illegal miner state transition.
    #[error("invalid state transition: {from:?} -> {to:?}")]
    InvalidTransition {
        /// State before the attempted transition.
        from: MinerState,
        /// Requested target state.
        to: MinerState,
    },

    /// The miner address failed validation.
    #[error("invalid miner address: {0}")]
    InvalidMinerAddress(String),

    /// No miner address was configured before starting.
    #[error("miner address not set")]
    MinerAddressNotSet,

    /// The external block builder failed.
    #[error("candidate build failed: {0}")]
    BuildFailed(String),

    /// The proof-of-work engine failed.
    #[error("proof of work failed: {0}")]
    PowFailed(String),

    /// Handing the mined block to the aggregator failed.
    #[error("submission failed: {0}")]
    SubmitFailed(String),

    /// A mined block failed the configured compliance policy.
    #[error("compliance rejection: {0}")]
    ComplianceRejected(String),

    /// The external chain query failed.
    #[error("chain query failed: {0}")]
    QueryFailed(String),

    /// The round was cancelled (operator stop or supersedence).
    #[error("round cancelled")]
    Cancelled,
}

impl MiningError {
    /// Whether the controller should keep looping after this error.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::FatalConfig(_) | Self::Cancelled)
    }
}
