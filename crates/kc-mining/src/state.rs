//! Miner lifecycle state machine.

use crate::error::{MiningError, Result};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Lifecycle state of the miner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MinerState {
    /// Not mining.
    Idle,
    /// Mining loop running.
    Active,
    /// Mining paused while a sync catches the chain up.
    Syncing,
    /// Stop requested; waiting for the loop to exit.
    Stopping,
    /// Fatal failure; requires an explicit recovery reset.
    Error,
}

/// Validates and records miner state transitions.
///
/// Legal transitions:
/// - `Idle -> Active` (start)
/// - `Active -> Stopping -> Idle` (stop)
/// - `Active <-> Syncing` (sync pause/resume)
/// - `Syncing -> Stopping` (stop while syncing)
/// - `* -> Error` (fatal)
/// - `Error -> Idle` (recovery reset)
pub struct StateManager {
    state: RwLock<MinerState>,
}

impl StateManager {
    /// Start in `Idle`.
    pub fn new() -> Self {
        Self {
            state: RwLock::new(MinerState::Idle),
        }
    }

    /// Current state.
    pub fn current(&self) -> MinerState {
        *self.state.read()
    }

    /// Attempt a transition; rejects illegal pairs without changing state.
    /// Returns the previous state on success.
    pub fn transition(&self, to: MinerState) -> Result<MinerState> {
        let mut state = self.state.write();
        let from = *state;
        if !Self::is_legal(from, to) {
            return Err(MiningError::InvalidTransition { from, to });
        }
        *state = to;
        Ok(from)
    }

    fn is_legal(from: MinerState, to: MinerState) -> bool {
        use MinerState::*;
        matches!(
            (from, to),
            (Idle, Active)
                | (Active, Stopping)
                | (Active, Syncing)
                | (Syncing, Active)
                | (Syncing, Stopping)
                | (Stopping, Idle)
                | (_, Error)
                | (Error, Idle)
        )
    }
}

impl Default for StateManager {
    fn default() -> Self {
        Self::new()
    }
}
