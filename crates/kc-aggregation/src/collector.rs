//! Candidate collector: per-height collection windows.
//!
//! `submit` and `close_window` may race; the window's inner lock decides,
//! and close always wins. After a close, late submits fail with
//! `WindowExpired` (window still mapped) or `WindowNotFound` (window
//! removed).

use crate::domain::window::{CollectionWindow, InsertOutcome, WindowProgress};
use crate::error::{AggregationError, Result};
use crate::metrics;
use crate::validation::CandidateValidator;
use parking_lot::RwLock;
use shared_types::CandidateBlock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Result of a successful submission.
#[derive(Debug, Clone, Copy)]
pub struct SubmitReceipt {
    /// Candidates collected so far, including this one.
    pub collected: u64,
    /// Whether the submission was a duplicate of an already-collected hash.
    pub duplicate: bool,
}

/// Passive per-height candidate collection.
pub struct CandidateCollector {
    windows: RwLock<HashMap<u64, Arc<CollectionWindow>>>,
    validator: Arc<CandidateValidator>,
}

impl CandidateCollector {
    /// Create a collector that validates through `validator`.
    pub fn new(validator: Arc<CandidateValidator>) -> Self {
        Self {
            windows: RwLock::new(HashMap::new()),
            validator,
        }
    }

    /// Open a collection window for `height`.
    ///
    /// Fails with `WindowExists` if one is already open. A timer task marks
    /// the window expired when `duration` elapses; the window itself stays
    /// mapped until [`close_window`](Self::close_window) removes it.
    pub fn start_window(&self, height: u64, duration: Duration) -> Result<()> {
        let window = {
            let mut windows = self.windows.write();
            if windows.contains_key(&height) {
                return Err(AggregationError::WindowExists(height));
            }
            let window = Arc::new(CollectionWindow::new(height, duration));
            windows.insert(height, window.clone());
            window
        };

        let timer_window = window.clone();
        window.set_timer(tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            timer_window.mark_expired();
            debug!(
                "[kc-aggregation] collection window for height {} expired after {:?}",
                timer_window.height(),
                duration
            );
        }));

        metrics::record_window_opened();
        info!(
            "[kc-aggregation] collection window opened: height={} duration={:?}",
            height, duration
        );
        Ok(())
    }

    /// Close the window for `height`: cancel its timer, remove it, and
    /// return the collected candidates. A second close for the same height
    /// returns `WindowNotFound`.
    pub fn close_window(&self, height: u64) -> Result<Vec<CandidateBlock>> {
        let window = self
            .windows
            .write()
            .remove(&height)
            .ok_or(AggregationError::WindowNotFound(height))?;
        let candidates = window.finish();
        info!(
            "[kc-aggregation] collection window closed: height={} candidates={}",
            height,
            candidates.len()
        );
        Ok(candidates)
    }

    /// Validate and store one candidate.
    pub async fn submit(&self, candidate: CandidateBlock) -> Result<SubmitReceipt> {
        let height = candidate.height;
        let window = self
            .windows
            .read()
            .get(&height)
            .cloned()
            .ok_or(AggregationError::WindowNotFound(height))?;
        if !window.is_active() {
            return Err(AggregationError::WindowExpired(height));
        }

        // Validation happens outside the window lock; the insert re-checks
        // activity so a close that slipped in between wins.
        if let Err(err) = self.validator.validate(&candidate).await {
            window.record_rejected();
            metrics::record_candidate_rejected(err.reason_label());
            return Err(err);
        }

        match window.insert(candidate) {
            InsertOutcome::Inserted { collected } => {
                metrics::record_candidate_accepted();
                Ok(SubmitReceipt {
                    collected,
                    duplicate: false,
                })
            }
            InsertOutcome::Duplicate => {
                debug!(
                    "[kc-aggregation] duplicate candidate ignored at height {}",
                    height
                );
                Ok(SubmitReceipt {
                    collected: window.progress().counters.collected,
                    duplicate: true,
                })
            }
            InsertOutcome::Expired => Err(AggregationError::WindowExpired(height)),
        }
    }

    /// Diagnostic snapshot of the window for `height`, if one is open.
    pub fn progress(&self, height: u64) -> Option<WindowProgress> {
        self.windows.read().get(&height).map(|w| w.progress())
    }

    /// Whether a window is currently mapped for `height`.
    pub fn has_window(&self, height: u64) -> bool {
        self.windows.read().contains_key(&height)
    }
}
