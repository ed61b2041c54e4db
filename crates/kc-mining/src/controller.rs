//! Miner lifecycle controller.
//!
//! Owns the mining loop: `start_mining` validates the beneficiary address,
//! fails fast on a denied gate, then spawns the loop task; `stop_mining`
//! cancels the loop and its children (PoW, slot waits, watchers) and waits
//! bounded for the exit. All operations are idempotent.

use crate::config::MinerConfig;
use crate::error::{MiningError, Result};
use crate::service::{MinerService, RoundOutcome};
use crate::state::{MinerState, StateManager};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Bound on waiting for the loop task during stop.
const STOP_TIMEOUT: Duration = Duration::from_secs(10);

/// Snapshot returned by `get_mining_status`.
#[derive(Debug, Clone)]
pub struct MiningStatus {
    /// Whether the loop task is running.
    pub is_running: bool,
    /// Copy of the configured beneficiary address, if set.
    pub miner_address: Option<Vec<u8>>,
}

/// Start/stop/status surface over the mining loop.
pub struct MinerController {
    service: Arc<MinerService>,
    state: StateManager,
    running: Arc<AtomicBool>,
    miner_address: Mutex<Option<Vec<u8>>>,
    cancel: Mutex<Option<watch::Sender<bool>>>,
    loop_handle: Mutex<Option<JoinHandle<()>>>,
    config: MinerConfig,
}

impl MinerController {
    /// Create a controller over an orchestrator.
    pub fn new(service: Arc<MinerService>, config: MinerConfig) -> Self {
        Self {
            service,
            state: StateManager::new(),
            running: Arc::new(AtomicBool::new(false)),
            miner_address: Mutex::new(None),
            cancel: Mutex::new(None),
            loop_handle: Mutex::new(None),
            config,
        }
    }

    /// Start the mining loop for `address`. Idempotent: a second start is
    /// a no-op.
    pub async fn start_mining(&self, address: &[u8]) -> Result<()> {
        if self.running.load(Ordering::SeqCst) {
            info!("[kc-mining] start_mining: already running");
            return Ok(());
        }

        self.service.set_miner_address(address)?;
        self.state.transition(MinerState::Active)?;
        *self.miner_address.lock() = Some(address.to_vec());

        // Fresh discovery epoch, then fail fast on an unusable gate.
        self.service.gate().reset_epoch();
        let verdict = self.service.gate().check().await;
        if !verdict.allow_mining {
            // Unwind to Idle before surfacing the denial.
            let _ = self.state.transition(MinerState::Stopping);
            let _ = self.state.transition(MinerState::Idle);
            warn!(
                "[kc-mining] start_mining refused by gate: {} ({})",
                verdict.reason,
                verdict.suggested_action.as_str()
            );
            return Err(verdict.to_error());
        }

        let (cancel_tx, cancel_rx) = watch::channel(false);
        *self.cancel.lock() = Some(cancel_tx);
        self.running.store(true, Ordering::SeqCst);

        let service = self.service.clone();
        let running = self.running.clone();
        let loop_interval = self.config.loop_interval();
        let handle = tokio::spawn(async move {
            mining_loop(service, cancel_rx, loop_interval).await;
            running.store(false, Ordering::SeqCst);
        });
        *self.loop_handle.lock() = Some(handle);

        info!(
            "[kc-mining] mining started for address {}",
            hex::encode(&address[..8.min(address.len())])
        );
        Ok(())
    }

    /// Stop the mining loop. Idempotent: stopping a stopped miner is a
    /// no-op.
    pub async fn stop_mining(&self) -> Result<()> {
        if !self.running.load(Ordering::SeqCst) {
            debug!("[kc-mining] stop_mining: not running");
            return Ok(());
        }
        self.state.transition(MinerState::Stopping)?;

        // Cancel the loop and everything under it.
        if let Some(cancel) = self.cancel.lock().take() {
            let _ = cancel.send(true);
        }
        self.service.watchers().cancel_all();

        let handle = self.loop_handle.lock().take();
        if let Some(handle) = handle {
            match tokio::time::timeout(STOP_TIMEOUT, handle).await {
                Ok(_) => {}
                Err(_) => {
                    warn!(
                        "[kc-mining] mining loop did not exit within {:?}; aborting",
                        STOP_TIMEOUT
                    );
                }
            }
        }

        self.running.store(false, Ordering::SeqCst);
        self.state.transition(MinerState::Idle)?;
        info!("[kc-mining] mining stopped");
        Ok(())
    }

    /// Consistency-checked status snapshot. An inconsistency between the
    /// running flag and the state machine is logged but never poisons the
    /// caller.
    pub fn get_mining_status(&self) -> MiningStatus {
        let is_running = self.running.load(Ordering::SeqCst);
        let state = self.state.current();
        let state_says_running = matches!(state, MinerState::Active | MinerState::Syncing);
        if is_running != state_says_running {
            warn!(
                "[kc-mining] status inconsistency: running flag {} but state {:?}",
                is_running, state
            );
        }
        MiningStatus {
            is_running,
            miner_address: self.miner_address.lock().clone(),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> MinerState {
        self.state.current()
    }
}

/// The loop: one round, then a paced wait, until cancelled. Gate denials
/// and recoverable errors back off by `loop_interval`; fatal errors stop
/// the loop.
async fn mining_loop(
    service: Arc<MinerService>,
    mut cancel_rx: watch::Receiver<bool>,
    loop_interval: Duration,
) {
    info!("[kc-mining] mining loop started");
    loop {
        if *cancel_rx.borrow() {
            break;
        }
        match service.run_round(cancel_rx.clone()).await {
            Ok(RoundOutcome::Completed { height, .. }) => {
                debug!("[kc-mining] round completed at height {}", height);
            }
            Ok(RoundOutcome::SkippedHeightGate { .. }) => {}
            Err(MiningError::Cancelled) => break,
            Err(err @ MiningError::GateBlocked { .. }) => {
                debug!("[kc-mining] round gated: {}", err);
            }
            Err(err) if err.is_recoverable() => {
                warn!("[kc-mining] round failed: {}", err);
            }
            Err(err) => {
                error!("[kc-mining] fatal mining error: {}", err);
                break;
            }
        }

        tokio::select! {
            _ = tokio::time::sleep(loop_interval) => {}
            _ = cancel_rx.changed() => break,
        }
    }
    info!("[kc-mining] mining loop exited");
}
