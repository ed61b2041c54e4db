//! # Aggregation Engine
//!
//! For every height, one node in the network is deterministically elected to
//! finalize the block: the node whose id is XOR-closest to the height's
//! routing key. Miners hand their fully-mined candidates to this crate, which
//! either forwards them to the elected aggregator or (when the local node is
//! elected) runs the aggregation round itself:
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────────┐
//! │                        AGGREGATION ENGINE                          │
//! ├────────────────────────────────────────────────────────────────────┤
//! │  ┌──────────────────────────────────────────────────────────────┐  │
//! │  │                 AggregatorService (state machine)             │  │
//! │  │  elect → collect → select → broadcast → apply → clear pool   │  │
//! │  └───────────────┬──────────────────────────────────────────────┘  │
//! │                  │                                                 │
//! │  ┌───────────────┴───────────────────────┐                         │
//! │  │             Domain Layer              │                         │
//! │  │  - CandidateValidator (gate checks)   │                         │
//! │  │  - CandidateCollector (windows)       │                         │
//! │  │  - XOR distance selector + proof      │                         │
//! │  │  - PeerHealthBook (forward scoring)   │                         │
//! │  └───────────────────────────────────────┘                         │
//! │                  │                                                 │
//! │  ┌───────────────┴───────────────────────┐                         │
//! │  │            Outbound Ports             │                         │
//! │  │  ChainQuery · PowVerifier · Routing   │                         │
//! │  │  CandidateChannel · ConsensusGossip   │                         │
//! │  │  ChainApply · CandidatePool · Sync    │                         │
//! │  └───────────────────────────────────────┘                         │
//! └────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Candidates live only inside a collection window. After a round completes
//! the whole candidate pool for the height is cleared; there are no
//! per-candidate "processed" flags anywhere in this crate.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

/// Pure aggregation logic: windows, selection, peer health, backoff.
pub mod domain;
/// Contracts for the external collaborators.
pub mod ports;
/// The aggregator state machine.
pub mod service;

mod collector;
mod config;
mod error;
mod metrics;
mod validation;

pub use collector::{CandidateCollector, SubmitReceipt};
pub use config::{AggregatorConfig, ForwardConfig, ValidationConfig};
pub use domain::selector::{routing_key_for_height, select_candidate, xor_distance, DistanceProof};
pub use domain::window::{WindowCounters, WindowProgress};
pub use error::{AggregationError, Result};
pub use service::{AggregatorDependencies, AggregatorService, RoundOutcome};
pub use validation::CandidateValidator;
