//! # Aggregation Metrics
//!
//! Prometheus metrics for monitoring aggregation rounds.
//!
//! Enable with the `metrics` feature:
//! ```toml
//! kc-aggregation = { path = "...", features = ["metrics"] }
//! ```
//!
//! ## Metrics Exported
//!
//! - `aggregation_windows_opened_total` - Counter of collection windows opened
//! - `aggregation_candidates_accepted_total` - Counter of candidates accepted
//! - `aggregation_candidates_rejected_total` - Counter of rejections (by reason)
//! - `aggregation_rounds_forwarded_total` - Counter of rounds forwarded to a remote aggregator
//! - `aggregation_selection_latency_seconds` - Histogram of close-to-broadcast time

#[cfg(feature = "metrics")]
use lazy_static::lazy_static;

#[cfg(feature = "metrics")]
use prometheus::{
    register_counter_vec, register_histogram, register_int_counter, CounterVec, Histogram,
    IntCounter,
};

#[cfg(feature = "metrics")]
lazy_static! {
    /// Collection windows opened
    pub static ref WINDOWS_OPENED: IntCounter = register_int_counter!(
        "aggregation_windows_opened_total",
        "Total number of collection windows opened"
    )
    .expect("Failed to create WINDOWS_OPENED metric");

    /// Candidates accepted into a window
    pub static ref CANDIDATES_ACCEPTED: IntCounter = register_int_counter!(
        "aggregation_candidates_accepted_total",
        "Total number of candidates accepted into collection windows"
    )
    .expect("Failed to create CANDIDATES_ACCEPTED metric");

    /// Candidates rejected, labeled by rejection reason
    pub static ref CANDIDATES_REJECTED: CounterVec = register_counter_vec!(
        "aggregation_candidates_rejected_total",
        "Total number of candidates rejected",
        &["reason"]
    )
    .expect("Failed to create CANDIDATES_REJECTED metric");

    /// Rounds forwarded to a remote aggregator
    pub static ref ROUNDS_FORWARDED: IntCounter = register_int_counter!(
        "aggregation_rounds_forwarded_total",
        "Total number of rounds forwarded to the elected aggregator"
    )
    .expect("Failed to create ROUNDS_FORWARDED metric");

    /// Histogram of selection latency
    pub static ref SELECTION_LATENCY: Histogram = register_histogram!(
        "aggregation_selection_latency_seconds",
        "Time from window close to broadcast in seconds",
        vec![0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    )
    .expect("Failed to create SELECTION_LATENCY metric");
}

/// Record a window open.
#[cfg(feature = "metrics")]
pub fn record_window_opened() {
    WINDOWS_OPENED.inc();
}

/// Record an accepted candidate.
#[cfg(feature = "metrics")]
pub fn record_candidate_accepted() {
    CANDIDATES_ACCEPTED.inc();
}

/// Record a rejected candidate with reason.
#[cfg(feature = "metrics")]
pub fn record_candidate_rejected(reason: &str) {
    CANDIDATES_REJECTED.with_label_values(&[reason]).inc();
}

/// Record a forwarded round.
#[cfg(feature = "metrics")]
pub fn record_round_forwarded() {
    ROUNDS_FORWARDED.inc();
}

/// Record selection latency.
#[cfg(feature = "metrics")]
pub fn record_selection_latency(seconds: f64) {
    SELECTION_LATENCY.observe(seconds);
}

// No-op implementations when metrics feature is disabled
#[cfg(not(feature = "metrics"))]
pub fn record_window_opened() {}

#[cfg(not(feature = "metrics"))]
pub fn record_candidate_accepted() {}

#[cfg(not(feature = "metrics"))]
pub fn record_candidate_rejected(_reason: &str) {}

#[cfg(not(feature = "metrics"))]
pub fn record_round_forwarded() {}

#[cfg(not(feature = "metrics"))]
pub fn record_selection_latency(_seconds: f64) {}
