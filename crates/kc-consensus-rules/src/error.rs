//! Typed rule violations.

use thiserror::Error;

/// Result type alias for consensus rule evaluation.
pub type RuleResult<T> = std::result::Result<T, RuleViolation>;

/// Category of a rule violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleKind {
    /// The parameter set itself is malformed.
    InvalidParams,
    /// Candidate timestamp exceeds `now + max_future_drift_s`.
    FutureTimestamp,
    /// Candidate timestamp is below the earliest allowed timestamp.
    IntervalViolation,
}

/// A consensus rule violation with enough context to log and reject.
///
/// Heights are zero when the rule has no block context (e.g. parameter
/// validation).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error(
    "rule violated: {kind:?} parent_height={parent_height} candidate_height={candidate_height} \
     observed={observed} expected={expected}"
)]
pub struct RuleViolation {
    /// Which rule failed.
    pub kind: RuleKind,
    /// Height of the parent block, if any.
    pub parent_height: u64,
    /// Height of the candidate being evaluated, if any.
    pub candidate_height: u64,
    /// The offending observed value.
    pub observed: u64,
    /// The bound the value was checked against.
    pub expected: u64,
}

impl RuleViolation {
    /// Violation with no block context.
    pub fn params(observed: u64, expected: u64) -> Self {
        Self {
            kind: RuleKind::InvalidParams,
            parent_height: 0,
            candidate_height: 0,
            observed,
            expected,
        }
    }
}
