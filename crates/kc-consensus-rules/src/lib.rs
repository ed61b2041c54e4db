//! # Consensus Rules
//!
//! Pure, deterministic difficulty and time rules evaluated identically on
//! every node:
//!
//! - next-difficulty from a sliding window of parent timestamps
//! - median time past (MTP) lower bound on candidate timestamps
//! - earliest-allowed-timestamp (minimum block interval ∨ MTP)
//! - emergency difficulty downshift after long stalls
//! - maximum future drift
//!
//! All ratios are parts-per-million integers. Floating point is forbidden
//! here: a single ULP of divergence between nodes would fork the chain.
//! Functions return a typed [`RuleViolation`] and never panic.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

mod difficulty;
mod error;
mod params;
mod time_rules;

pub use difficulty::{apply_emergency_downshift, emergency_downshift_bits, next_difficulty};
pub use error::{RuleKind, RuleResult, RuleViolation};
pub use params::{ConsensusParams, PPM_DENOM};
pub use time_rules::{check_future_drift, earliest_allowed_timestamp, median_time_past};
