//! Confirmation watcher.
//!
//! For every submitted block the miner spawns at most one watcher per
//! expected height. The watcher polls the local chain until the height
//! appears, then advances the height gate; on deadline it runs the
//! configured fallback (trigger a sync, or drop the round) and exits.
//! Watchers always remove themselves from the map on exit, including on
//! panic or abort, via a drop guard.

use crate::config::{ConfirmationFallback, MinerConfig};
use crate::height_gate::HeightGate;
use crate::metrics;
use crate::ports::{AggregationIntrospect, ChainQuery, NetworkIntrospect, SyncService};
use parking_lot::Mutex;
use shared_types::TimeSource;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Outcome of a `start_watch` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchStatus {
    /// A new watcher task was spawned.
    Started,
    /// A watcher already existed; its submit counter was bumped.
    Resubmitted {
        /// Submit count after the bump.
        submits: u64,
    },
}

/// External collaborators of the watchers.
pub struct WatcherDependencies {
    /// Local chain reads.
    pub chain: Arc<dyn ChainQuery>,
    /// Sync engine.
    pub sync: Arc<dyn SyncService>,
    /// Wall clock.
    pub clock: Arc<dyn TimeSource>,
    /// The miner's height gate, advanced on confirmation.
    pub height_gate: Arc<HeightGate>,
    /// Optional aggregator introspection for diagnostics.
    pub aggregation: Option<Arc<dyn AggregationIntrospect>>,
    /// Optional network introspection for diagnostics.
    pub network: Option<Arc<dyn NetworkIntrospect>>,
}

struct WatchEntry {
    started_at: u64,
    last_submit_at: AtomicU64,
    submits: AtomicU64,
    cancel: watch::Sender<bool>,
}

struct Inner {
    watchers: Mutex<HashMap<u64, Arc<WatchEntry>>>,
    deps: WatcherDependencies,
    config: MinerConfig,
}

/// The per-height confirmation watcher registry.
///
/// The height is the identity: there are no per-block watcher objects.
#[derive(Clone)]
pub struct ConfirmationWatchers {
    inner: Arc<Inner>,
}

impl ConfirmationWatchers {
    /// Create the registry.
    pub fn new(deps: WatcherDependencies, config: MinerConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                watchers: Mutex::new(HashMap::new()),
                deps,
                config,
            }),
        }
    }

    /// Ensure a watcher exists for `height`.
    ///
    /// A resubmission bumps the submit counter unconditionally;
    /// `last_submit_at` only moves when the resubmission falls outside
    /// `confirmation_resubmit_min_interval`.
    pub fn start_watch(&self, height: u64) -> WatchStatus {
        let now = self.inner.deps.clock.now();
        let mut watchers = self.inner.watchers.lock();

        if let Some(entry) = watchers.get(&height) {
            let submits = entry.submits.fetch_add(1, Ordering::SeqCst) + 1;
            let last = entry.last_submit_at.load(Ordering::SeqCst);
            if now.saturating_sub(last) >= self.inner.config.confirmation_resubmit_min_interval {
                entry.last_submit_at.store(now, Ordering::SeqCst);
            }
            debug!(
                "[kc-mining] watcher for height {} already running; submits={}",
                height, submits
            );
            return WatchStatus::Resubmitted { submits };
        }

        let (cancel_tx, cancel_rx) = watch::channel(false);
        let entry = Arc::new(WatchEntry {
            started_at: now,
            last_submit_at: AtomicU64::new(now),
            submits: AtomicU64::new(1),
            cancel: cancel_tx,
        });
        watchers.insert(height, entry.clone());
        drop(watchers);

        let inner = self.inner.clone();
        tokio::spawn(async move {
            watch_loop(inner, height, entry, cancel_rx).await;
        });
        info!("[kc-mining] confirmation watcher started for height {}", height);
        WatchStatus::Started
    }

    /// Heights currently being watched.
    pub fn active_heights(&self) -> Vec<u64> {
        let mut heights: Vec<u64> = self.inner.watchers.lock().keys().copied().collect();
        heights.sort_unstable();
        heights
    }

    /// Whether a watcher is running for `height`.
    pub fn is_watching(&self, height: u64) -> bool {
        self.inner.watchers.lock().contains_key(&height)
    }

    /// Submit count for an active watcher.
    pub fn submits(&self, height: u64) -> Option<u64> {
        self.inner
            .watchers
            .lock()
            .get(&height)
            .map(|e| e.submits.load(Ordering::SeqCst))
    }

    /// Last-submit timestamp for an active watcher.
    pub fn last_submit_at(&self, height: u64) -> Option<u64> {
        self.inner
            .watchers
            .lock()
            .get(&height)
            .map(|e| e.last_submit_at.load(Ordering::SeqCst))
    }

    /// Cancel every running watcher. Used on miner stop; cancellation
    /// propagates from the loop's parent context.
    pub fn cancel_all(&self) {
        for entry in self.inner.watchers.lock().values() {
            let _ = entry.cancel.send(true);
        }
    }
}

/// Removes the watcher from the map when the task exits, no matter how.
struct RemoveOnExit {
    inner: Arc<Inner>,
    height: u64,
}

impl Drop for RemoveOnExit {
    fn drop(&mut self) {
        self.inner.watchers.lock().remove(&self.height);
        debug!("[kc-mining] watcher for height {} removed", self.height);
    }
}

async fn watch_loop(
    inner: Arc<Inner>,
    height: u64,
    entry: Arc<WatchEntry>,
    mut cancel_rx: watch::Receiver<bool>,
) {
    let _guard = RemoveOnExit {
        inner: inner.clone(),
        height,
    };

    let mut check = tokio::time::interval(inner.config.confirmation_check_interval());
    check.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let diag_period = inner.config.confirmation_diag_interval();
    let mut diag = tokio::time::interval_at(tokio::time::Instant::now() + diag_period, diag_period);
    diag.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let deadline = tokio::time::sleep(inner.config.confirmation_timeout());
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = check.tick() => {
                if confirmed(&inner, height).await {
                    inner.deps.height_gate.update(height);
                    let waited = inner.deps.clock.now().saturating_sub(entry.started_at);
                    info!(
                        "[kc-mining] block at height {} confirmed on-chain after {}s \
                         (submits={})",
                        height,
                        waited,
                        entry.submits.load(Ordering::SeqCst)
                    );
                    metrics::record_confirmation(true);
                    return;
                }
            }
            _ = diag.tick() => {
                emit_diagnostic(&inner, height, &entry).await;
            }
            _ = &mut deadline => {
                handle_timeout(&inner, height, &entry).await;
                metrics::record_confirmation(false);
                return;
            }
            _ = cancel_rx.changed() => {
                debug!("[kc-mining] watcher for height {} cancelled", height);
                return;
            }
        }
    }
}

/// Confirmation requires two consecutive reads at or past the height: the
/// second read guards against advancing the gate past the actual tip on a
/// racing rollback.
async fn confirmed(inner: &Arc<Inner>, height: u64) -> bool {
    let first = match inner.deps.chain.chain_info().await {
        Ok(info) => info,
        Err(err) => {
            debug!("[kc-mining] confirmation check failed: {}", err);
            return false;
        }
    };
    if first.height < height {
        return false;
    }
    match inner.deps.chain.chain_info().await {
        Ok(recheck) if recheck.height >= height => true,
        Ok(recheck) => {
            warn!(
                "[kc-mining] chain height receded {} -> {} during confirmation of {}",
                first.height, recheck.height, height
            );
            false
        }
        Err(err) => {
            warn!("[kc-mining] confirmation re-check failed: {}", err);
            false
        }
    }
}

async fn handle_timeout(inner: &Arc<Inner>, height: u64, entry: &Arc<WatchEntry>) {
    let waited = inner.deps.clock.now().saturating_sub(entry.started_at);
    match inner.config.confirmation_timeout_fallback {
        ConfirmationFallback::Sync => {
            match inner.deps.sync.check_sync().await {
                Ok(check) if check.network_height > check.local_height => {
                    warn!(
                        "[kc-mining] confirmation timeout at height {} after {}s; network at {} \
                         vs local {}, triggering sync",
                        height, waited, check.network_height, check.local_height
                    );
                    if let Err(err) = inner.deps.sync.trigger_sync("confirmation timeout").await {
                        warn!("[kc-mining] sync trigger failed: {}", err);
                    }
                }
                Ok(_) => {
                    info!(
                        "[kc-mining] confirmation timeout at height {} after {}s; nothing to sync",
                        height, waited
                    );
                }
                Err(err) => {
                    warn!(
                        "[kc-mining] confirmation timeout at height {}; sync check failed: {}",
                        height, err
                    );
                }
            }
        }
        ConfirmationFallback::Drop => {
            emit_diagnostic(inner, height, entry).await;
            info!(
                "[kc-mining] confirmation timeout at height {} after {}s; round dropped",
                height, waited
            );
        }
    }
}

/// The operator's main tool for telling "slow confirmation" from "stuck
/// network": one structured line with everything relevant.
async fn emit_diagnostic(inner: &Arc<Inner>, height: u64, entry: &Arc<WatchEntry>) {
    let now = inner.deps.clock.now();
    let elapsed = now.saturating_sub(entry.started_at);
    let submits = entry.submits.load(Ordering::SeqCst);

    let chain_height = inner
        .deps
        .chain
        .chain_info()
        .await
        .map(|i| i.height)
        .unwrap_or(0);
    let sync_status = match inner.deps.sync.check_sync().await {
        Ok(check) => format!(
            "local={} network={} syncing={}",
            check.local_height, check.network_height, check.syncing
        ),
        Err(_) => "unavailable".into(),
    };
    let (topic_peers, protocols) = inner
        .deps
        .network
        .as_ref()
        .map(|n| (n.topic_peer_count(), n.protocol_registration_count()))
        .unwrap_or((0, 0));
    let aggregation = inner
        .deps
        .aggregation
        .as_ref()
        .and_then(|a| a.round_status(height));
    let aggregation_line = match aggregation {
        Some(status) => format!(
            "window_active={} collected={} rejected={} duplicates={} progress={:.0}% \
             mean_delay={}s",
            status.window_active,
            status.collected,
            status.rejected,
            status.duplicates,
            status.progress * 100.0,
            status.mean_receive_delay_secs
        ),
        None => "no local round".into(),
    };

    warn!(
        "[kc-mining] awaiting confirmation: height={} elapsed={}s submits={} chain_height={} \
         sync=[{}] topic_peers={} protocols={} aggregation=[{}]",
        height, elapsed, submits, chain_height, sync_status, topic_peers, protocols, aggregation_line
    );
}
