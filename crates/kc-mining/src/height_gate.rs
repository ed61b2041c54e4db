//! Height gate: the last-processed-height register.
//!
//! Prevents the miner from producing twice at the same height. Reads are
//! lock-free; updates serialize through a compare-and-swap loop so a read
//! always reflects the most recent successful update.

use std::sync::atomic::{AtomicU64, Ordering};
use tracing::warn;

/// Outcome of a height gate update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateUpdate {
    /// The gate moved forward (or stayed equal).
    Advanced,
    /// The gate moved backward within the fork-depth bound.
    RolledBack,
    /// The write was rejected: rollback deeper than `max_fork_depth`.
    Rejected,
}

/// Atomic last-processed-height with a bounded rollback policy.
pub struct HeightGate {
    last_processed: AtomicU64,
    max_fork_depth: u64,
}

impl HeightGate {
    /// Gate starting at height 0 (a legal starting value).
    pub fn new(max_fork_depth: u64) -> Self {
        Self {
            last_processed: AtomicU64::new(0),
            max_fork_depth,
        }
    }

    /// Non-blocking read of the last processed height.
    pub fn get(&self) -> u64 {
        self.last_processed.load(Ordering::Acquire)
    }

    /// Attempt to move the gate to `height`.
    ///
    /// Forward writes (`height >= current`) always succeed. Backward writes
    /// succeed only within `max_fork_depth`; deeper rollbacks are rejected
    /// and leave the gate unchanged.
    pub fn update(&self, height: u64) -> GateUpdate {
        loop {
            let current = self.last_processed.load(Ordering::Acquire);
            let outcome = if height >= current {
                GateUpdate::Advanced
            } else if current - height <= self.max_fork_depth {
                GateUpdate::RolledBack
            } else {
                warn!(
                    "[kc-mining] height gate rejected rollback {} -> {} (max fork depth {})",
                    current, height, self.max_fork_depth
                );
                return GateUpdate::Rejected;
            };

            match self.last_processed.compare_exchange(
                current,
                height,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    if outcome == GateUpdate::RolledBack {
                        warn!(
                            "[kc-mining] height gate fork rollback {} -> {}",
                            current, height
                        );
                    }
                    return outcome;
                }
                Err(_) => continue,
            }
        }
    }
}
