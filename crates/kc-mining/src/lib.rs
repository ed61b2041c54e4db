//! # Mining Engine
//!
//! The miner side of block production: a gated mining loop, a per-round
//! orchestrator, and a non-blocking confirmation watcher.
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────┐
//! │                         MINING ENGINE                             │
//! ├───────────────────────────────────────────────────────────────────┤
//! │  MinerController (lifecycle: start/stop/status, state machine)    │
//! │        │                                                          │
//! │        ▼  one round at a time                                     │
//! │  MinerService ── QuorumGate ── wait slot ── height gate           │
//! │        │            (tip health, peer quorum, height alignment)   │
//! │        ▼                                                          │
//! │  BlockBuilder → PowEngine → submit to aggregator                  │
//! │        │                                                          │
//! │        ▼  fire-and-forget                                         │
//! │  ConfirmationWatchers (one task per expected height)              │
//! │        └── confirm on-chain → advance HeightGate                  │
//! │        └── timeout → trigger sync or drop the round               │
//! └───────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The miner, the aggregator, and the watcher never merge: each has its own
//! state machine and failure semantics. Everything external — block
//! building, PoW compute, chain storage, sync, networking — is consumed
//! through the port traits in [`ports`].

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

/// Quorum/tip gate checked before every round.
pub mod gate;
/// Contracts for the external collaborators.
pub mod ports;

mod config;
mod controller;
mod error;
mod height_gate;
mod metrics;
mod service;
mod state;
#[cfg(test)]
mod test_support;
mod watcher;

pub use config::{
    ChainMode, ConfirmationFallback, Environment, MinerConfig, TxSelectionMode,
};
pub use controller::{MinerController, MiningStatus};
pub use error::{MiningError, Result};
pub use gate::{ChainTipStatus, QuorumGate, QuorumMetrics, QuorumResult, QuorumState, SuggestedAction};
pub use height_gate::{GateUpdate, HeightGate};
pub use service::{MinerDependencies, MinerService, RoundOutcome};
pub use state::{MinerState, StateManager};
pub use watcher::{ConfirmationWatchers, WatchStatus, WatcherDependencies};
