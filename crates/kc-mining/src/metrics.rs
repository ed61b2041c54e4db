//! # Mining Metrics
//!
//! Prometheus metrics for the mining loop, gate, and watcher.
//!
//! Enable with the `metrics` feature:
//! ```toml
//! kc-mining = { path = "...", features = ["metrics"] }
//! ```
//!
//! ## Metrics Exported
//!
//! - `mining_gate_checks_total` - Counter of gate checks (by state and verdict)
//! - `mining_rounds_total` - Counter of mining rounds (by outcome)
//! - `mining_confirmations_total` - Counter of watcher exits (by result)

use crate::gate::QuorumState;

#[cfg(feature = "metrics")]
use lazy_static::lazy_static;

#[cfg(feature = "metrics")]
use prometheus::{register_counter_vec, CounterVec};

#[cfg(feature = "metrics")]
lazy_static! {
    /// Gate checks by state and verdict
    pub static ref GATE_CHECKS: CounterVec = register_counter_vec!(
        "mining_gate_checks_total",
        "Total quorum gate checks",
        &["state", "allowed"]
    )
    .expect("Failed to create GATE_CHECKS metric");

    /// Mining rounds by outcome
    pub static ref ROUNDS: CounterVec = register_counter_vec!(
        "mining_rounds_total",
        "Total mining rounds",
        &["outcome"]
    )
    .expect("Failed to create ROUNDS metric");

    /// Watcher exits by result
    pub static ref CONFIRMATIONS: CounterVec = register_counter_vec!(
        "mining_confirmations_total",
        "Total confirmation watcher exits",
        &["result"]
    )
    .expect("Failed to create CONFIRMATIONS metric");
}

/// Record a gate check.
#[cfg(feature = "metrics")]
pub fn record_gate_check(state: QuorumState, allowed: bool) {
    GATE_CHECKS
        .with_label_values(&[&format!("{state:?}"), if allowed { "yes" } else { "no" }])
        .inc();
}

/// Record a finished round.
#[cfg(feature = "metrics")]
pub fn record_round(outcome: &str) {
    ROUNDS.with_label_values(&[outcome]).inc();
}

/// Record a watcher exit.
#[cfg(feature = "metrics")]
pub fn record_confirmation(confirmed: bool) {
    CONFIRMATIONS
        .with_label_values(&[if confirmed { "confirmed" } else { "timeout" }])
        .inc();
}

// No-op implementations when metrics feature is disabled
#[cfg(not(feature = "metrics"))]
pub fn record_gate_check(_state: QuorumState, _allowed: bool) {}

#[cfg(not(feature = "metrics"))]
pub fn record_round(_outcome: &str) {}

#[cfg(not(feature = "metrics"))]
pub fn record_confirmation(_confirmed: bool) {}
