//! Collection window state.
//!
//! One window per height while a round is active. Intake is time-bounded:
//! after the window's timer marks it expired, submissions fail but the
//! collected set stays readable until `close` removes the window.

use parking_lot::Mutex;
use shared_types::{CandidateBlock, Hash};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

/// Counters tracked per window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WindowCounters {
    /// Candidates accepted into the window.
    pub collected: u64,
    /// Candidates that passed validation.
    pub validated: u64,
    /// Candidates rejected by validation.
    pub rejected: u64,
    /// Duplicate submissions by block hash.
    pub duplicates: u64,
}

/// Point-in-time view of a window, for diagnostics.
#[derive(Debug, Clone)]
pub struct WindowProgress {
    /// Height the window collects for.
    pub height: u64,
    /// Counter snapshot.
    pub counters: WindowCounters,
    /// Time since the window opened.
    pub elapsed: Duration,
    /// `min(elapsed / duration, 1.0)`. Operator display only.
    pub progress: f64,
    /// Whether the window still accepts candidates.
    pub active: bool,
    /// Mean candidate receive delay so far, seconds.
    pub mean_receive_delay_secs: u64,
}

/// Outcome of inserting a candidate.
#[derive(Debug, PartialEq, Eq)]
pub enum InsertOutcome {
    /// Candidate stored; the window now holds `collected` candidates.
    Inserted {
        /// Total candidates after the insert.
        collected: u64,
    },
    /// A candidate with the same block hash is already present.
    Duplicate,
    /// The window stopped accepting before the insert.
    Expired,
}

struct WindowState {
    active: bool,
    candidates: HashMap<Hash, CandidateBlock>,
    counters: WindowCounters,
    receive_delays: Vec<Duration>,
}

/// A per-height candidate collection window.
pub struct CollectionWindow {
    height: u64,
    opened: Instant,
    duration: Duration,
    state: Mutex<WindowState>,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl CollectionWindow {
    /// Create an open window. The expiry timer is attached separately by
    /// the collector.
    pub fn new(height: u64, duration: Duration) -> Self {
        Self {
            height,
            opened: Instant::now(),
            duration,
            state: Mutex::new(WindowState {
                active: true,
                candidates: HashMap::new(),
                counters: WindowCounters::default(),
                receive_delays: Vec::new(),
            }),
            timer: Mutex::new(None),
        }
    }

    /// Height this window collects for.
    pub fn height(&self) -> u64 {
        self.height
    }

    /// Attach the expiry timer task.
    pub fn set_timer(&self, handle: JoinHandle<()>) {
        *self.timer.lock() = Some(handle);
    }

    /// Stop intake. Idempotent. Called by the expiry timer and by `close`.
    pub fn mark_expired(&self) {
        self.state.lock().active = false;
    }

    /// Whether the window still accepts candidates.
    pub fn is_active(&self) -> bool {
        self.state.lock().active && self.opened.elapsed() < self.duration
    }

    /// Record a validation rejection.
    pub fn record_rejected(&self) {
        self.state.lock().counters.rejected += 1;
    }

    /// Insert a validated candidate.
    ///
    /// Re-checks activity under the lock so a concurrent close wins over an
    /// in-flight submit.
    pub fn insert(&self, candidate: CandidateBlock) -> InsertOutcome {
        let mut state = self.state.lock();
        if !state.active || self.opened.elapsed() >= self.duration {
            return InsertOutcome::Expired;
        }
        if state.candidates.contains_key(&candidate.block_hash) {
            state.counters.duplicates += 1;
            return InsertOutcome::Duplicate;
        }
        state
            .receive_delays
            .push(Duration::from_secs(candidate.receive_delay_secs()));
        state.counters.collected += 1;
        state.counters.validated += 1;
        state.candidates.insert(candidate.block_hash, candidate);
        InsertOutcome::Inserted {
            collected: state.counters.collected,
        }
    }

    /// Stop intake, cancel the timer, and take the collected candidates.
    pub fn finish(&self) -> Vec<CandidateBlock> {
        if let Some(handle) = self.timer.lock().take() {
            handle.abort();
        }
        let mut state = self.state.lock();
        state.active = false;
        state.candidates.drain().map(|(_, c)| c).collect()
    }

    /// Diagnostic snapshot.
    pub fn progress(&self) -> WindowProgress {
        let state = self.state.lock();
        let elapsed = self.opened.elapsed();
        let progress = if self.duration.is_zero() {
            1.0
        } else {
            (elapsed.as_secs_f64() / self.duration.as_secs_f64()).min(1.0)
        };
        let mean_delay = if state.receive_delays.is_empty() {
            0
        } else {
            let total: u64 = state.receive_delays.iter().map(|d| d.as_secs()).sum();
            total / state.receive_delays.len() as u64
        };
        WindowProgress {
            height: self.height,
            counters: state.counters,
            elapsed,
            progress,
            active: state.active && elapsed < self.duration,
            mean_receive_delay_secs: mean_delay,
        }
    }
}
