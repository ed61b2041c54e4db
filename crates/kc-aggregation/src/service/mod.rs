//! Aggregator state machine.
//!
//! Every mined block — locally produced or received from a peer — enters
//! through [`AggregatorService::process_round`]. The service decides whether
//! the local node is the elected aggregator for the block's height:
//!
//! - **Not elected**: the candidate is forwarded to the elected node, with
//!   retry, backup-node, and peer-health handling.
//! - **Elected**: a collection window opens (if not already open) and a
//!   finalize task is armed. When the window closes — timer, candidate
//!   threshold, or round timeout — the task selects one candidate by XOR
//!   distance, broadcasts it on the consensus-result topic, applies it
//!   locally through the same path every other node uses, and clears the
//!   candidate pool for the height.

mod forward;


use crate::collector::CandidateCollector;
use crate::config::AggregatorConfig;
use crate::domain::health::PeerHealthBook;
use crate::domain::selector::{routing_key_for_height, select_candidate, DistanceProof};
use crate::error::{short_hex, AggregationError, Result};
use crate::metrics;
use crate::ports::{
    AggregatorRouting, CandidateChannel, CandidatePool, ChainApply, ChainQuery, ConsensusGossip,
    PowVerifier, SyncTrigger,
};
use crate::validation::CandidateValidator;
use parking_lot::Mutex;
use shared_types::{Block, CandidateBlock, ChainStatus, NodeId, TimeSource};
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tracing::{debug, info, warn};

/// External collaborators of the aggregator.
pub struct AggregatorDependencies {
    /// Local chain reads.
    pub chain: Arc<dyn ChainQuery>,
    /// Proof-of-work verification kernel.
    pub pow: Arc<dyn PowVerifier>,
    /// Sync engine trigger.
    pub sync: Arc<dyn SyncTrigger>,
    /// Routing-table distance queries.
    pub routing: Arc<dyn AggregatorRouting>,
    /// Unary candidate submission RPC.
    pub channel: Arc<dyn CandidateChannel>,
    /// Consensus-result gossip topic.
    pub gossip: Arc<dyn ConsensusGossip>,
    /// Chain apply hook.
    pub apply: Arc<dyn ChainApply>,
    /// External candidate pool.
    pub pool: Arc<dyn CandidatePool>,
    /// Wall clock.
    pub clock: Arc<dyn TimeSource>,
}

/// What `process_round` did with the candidate.
#[derive(Debug, Clone)]
pub enum RoundOutcome {
    /// The local node is not the aggregator; candidate forwarded.
    Forwarded {
        /// The peer the candidate was delivered to.
        target: NodeId,
    },
    /// The local node is the aggregator; candidate entered the window.
    Accepted {
        /// Height being aggregated.
        height: u64,
        /// Candidates collected so far.
        collected: u64,
    },
}

/// Per-height aggregation state machine.
pub struct AggregatorService {
    chain: Arc<dyn ChainQuery>,
    pow: Arc<dyn PowVerifier>,
    sync: Arc<dyn SyncTrigger>,
    routing: Arc<dyn AggregatorRouting>,
    channel: Arc<dyn CandidateChannel>,
    gossip: Arc<dyn ConsensusGossip>,
    apply: Arc<dyn ChainApply>,
    pool: Arc<dyn CandidatePool>,
    clock: Arc<dyn TimeSource>,
    config: AggregatorConfig,
    collector: Arc<CandidateCollector>,
    health: Mutex<PeerHealthBook>,
    /// Early-close signals for open rounds, one per height.
    rounds: Mutex<HashMap<u64, Arc<Notify>>>,
    /// Cached election rankings: height -> (expiry, ranked nodes).
    ranking_cache: Mutex<HashMap<u64, (u64, Vec<NodeId>)>>,
    /// Self-handle for spawning round drivers.
    weak: Weak<Self>,
}

impl AggregatorService {
    /// Create the service. The validator is shared with the collector so
    /// every intake path runs the same checks.
    pub fn new(
        deps: AggregatorDependencies,
        config: AggregatorConfig,
        validator: Arc<CandidateValidator>,
    ) -> Arc<Self> {
        let health = Mutex::new(PeerHealthBook::new(&config.forward));
        Arc::new_cyclic(|weak| Self {
            chain: deps.chain,
            pow: deps.pow,
            sync: deps.sync,
            routing: deps.routing,
            channel: deps.channel,
            gossip: deps.gossip,
            apply: deps.apply,
            pool: deps.pool,
            clock: deps.clock,
            collector: Arc::new(CandidateCollector::new(validator)),
            health,
            rounds: Mutex::new(HashMap::new()),
            ranking_cache: Mutex::new(HashMap::new()),
            weak: weak.clone(),
            config,
        })
    }

    /// The collector, for diagnostics.
    pub fn collector(&self) -> &Arc<CandidateCollector> {
        &self.collector
    }

    /// Handle one mined block for its height.
    pub async fn process_round(&self, candidate: CandidateBlock) -> Result<RoundOutcome> {
        let height = candidate.height;
        let key = routing_key_for_height(height);
        let local = self.routing.local_node_id();

        let backup_count = if self.config.forward.enable_backup_nodes {
            self.config.forward.backup_node_count
        } else {
            0
        };
        let ranked = self.ranked_for(height, &key, 1 + backup_count);

        // With no routing information at all the local node is trivially
        // the closest candidate for the key.
        let elected = ranked.first().map(|n| *n == local).unwrap_or(true);

        if elected && self.config.enable_aggregator {
            self.run_elected(height, candidate).await
        } else {
            if elected {
                debug!(
                    "[kc-aggregation] elected for height {} but aggregator disabled, forwarding",
                    height
                );
            }
            self.forward_round(height, &key, &candidate, ranked).await
        }
    }

    /// Election ranking for a height, cached for `network_cache_ttl` so a
    /// burst of submissions does not hammer the routing table.
    fn ranked_for(&self, height: u64, key: &shared_types::Hash, count: usize) -> Vec<NodeId> {
        let now = self.clock.now();
        let mut cache = self.ranking_cache.lock();
        if let Some((expires, ranked)) = cache.get(&height) {
            if *expires > now && ranked.len() >= count {
                return ranked[..count.min(ranked.len())].to_vec();
            }
        }
        let ranked = self.routing.closest_nodes(key, count);
        cache.retain(|_, (expires, _)| *expires > now);
        cache.insert(height, (now + self.config.network_cache_ttl, ranked.clone()));
        ranked
    }

    async fn run_elected(&self, height: u64, candidate: CandidateBlock) -> Result<RoundOutcome> {
        match self
            .collector
            .start_window(height, self.config.window_duration())
        {
            Ok(()) => {
                let notify = Arc::new(Notify::new());
                self.rounds.lock().insert(height, notify.clone());
                // The weak handle only dangles during construction, before
                // any round can exist.
                if let Some(service) = self.weak.upgrade() {
                    tokio::spawn(async move {
                        service.run_finalize(height, notify).await;
                    });
                }
            }
            Err(AggregationError::WindowExists(_)) => {}
            Err(err) => return Err(err),
        }

        let receipt = self.collector.submit(candidate).await?;
        if receipt.collected >= self.config.max_candidates {
            if let Some(notify) = self.rounds.lock().get(&height) {
                notify.notify_one();
            }
        }
        Ok(RoundOutcome::Accepted {
            height,
            collected: receipt.collected,
        })
    }

    /// Round driver: re-checks the close conditions every
    /// `selection_interval` until the window runs out or an early-close
    /// signal arrives, then finalizes. The whole round is bounded by
    /// `collection_timeout`; on overrun the round is abandoned and the
    /// miners' confirmation watchers take it from there.
    async fn run_finalize(self: Arc<Self>, height: u64, notify: Arc<Notify>) {
        let window = self.config.window_duration();
        let poll = Duration::from_secs(self.config.selection_interval.max(1));
        let work = async {
            let opened = tokio::time::Instant::now();
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(poll) => {
                        if opened.elapsed() >= window {
                            break;
                        }
                    }
                    _ = notify.notified() => {
                        debug!("[kc-aggregation] early close for height {}", height);
                        break;
                    }
                }
            }
            self.finalize_round(height).await;
        };
        if tokio::time::timeout(self.config.round_timeout(), work)
            .await
            .is_err()
        {
            warn!(
                "[kc-aggregation] round abandoned for height {}: exceeded collection timeout {:?}",
                height,
                self.config.round_timeout()
            );
            let _ = self.collector.close_window(height);
            self.pool.clear_height(height).await;
        }
        self.rounds.lock().remove(&height);
    }

    /// Close, select, broadcast, apply, clear.
    pub(crate) async fn finalize_round(&self, height: u64) {
        let started = Instant::now();
        let candidates = match self.collector.close_window(height) {
            Ok(candidates) => candidates,
            Err(_) => return,
        };

        if candidates.is_empty() {
            warn!(
                "[kc-aggregation] window closed empty at height {}; nothing to select",
                height
            );
            if let Ok(info) = self.chain.chain_info().await {
                if !info.is_ready || info.status == ChainStatus::Syncing {
                    self.sync
                        .trigger_urgent_sync(None, "empty aggregation round on unready chain")
                        .await;
                }
            }
            self.pool.clear_height(height).await;
            return;
        }

        if (candidates.len() as u64) < self.config.min_candidates {
            warn!(
                "[kc-aggregation] height {} closed with {} candidates (minimum {})",
                height,
                candidates.len(),
                self.config.min_candidates
            );
        }
        let mean_delay: u64 = candidates
            .iter()
            .map(|c| c.receive_delay_secs())
            .sum::<u64>()
            / candidates.len() as u64;
        if mean_delay > self.config.max_propagation_delay {
            warn!(
                "[kc-aggregation] mean candidate propagation delay {}s exceeds {}s at height {}",
                mean_delay, self.config.max_propagation_delay, height
            );
        }

        let key = routing_key_for_height(height);
        // Non-empty set, so selection cannot fail.
        let Some((selected, proof)) = select_candidate(&candidates, &key) else {
            return;
        };
        info!(
            "[kc-aggregation] selected {} for height {} (distance={}, runner_up={:?}, from {} candidates)",
            short_hex(&proof.selected_hash),
            height,
            proof.selected_distance,
            proof.runner_up_distance,
            candidates.len()
        );

        let block = selected.block.clone();
        match tokio::time::timeout(
            self.config.broadcast_timeout(),
            self.gossip.broadcast_finalized(&block, &proof),
        )
        .await
        {
            Ok(Ok(())) => {}
            Ok(Err(err)) => warn!(
                "[kc-aggregation] broadcast failed for height {}: {}",
                height, err
            ),
            Err(_) => warn!(
                "[kc-aggregation] broadcast timed out for height {} after {:?}",
                height,
                self.config.broadcast_timeout()
            ),
        }
        metrics::record_selection_latency(started.elapsed().as_secs_f64());

        // Local apply runs the exact path a non-aggregator node runs when
        // the broadcast arrives; there is no single-node shortcut. The pool
        // clear below covers the error path too.
        if let Err(err) = self.apply_finalized(&block, &proof).await {
            warn!(
                "[kc-aggregation] local apply failed for height {}: {}",
                height, err
            );
            self.pool.clear_height(height).await;
        }
    }

    /// Entry point for finalized blocks, used both by the aggregator's own
    /// round and by the gossip subscriber on every other node.
    pub async fn apply_finalized(&self, block: &Block, proof: &DistanceProof) -> Result<()> {
        let height = block.header.height;
        let valid = self
            .pow
            .verify(&block.header, &proof.selected_hash)
            .await
            .map_err(|e| AggregationError::PoWInvalid(e.to_string()))?;
        if !valid {
            return Err(AggregationError::PoWInvalid(format!(
                "finalized block {} fails verification",
                short_hex(&proof.selected_hash)
            )));
        }
        self.apply
            .apply_block(block)
            .await
            .map_err(|e| AggregationError::ApplyFailed {
                block_hash: short_hex(&proof.selected_hash),
                reason: e.to_string(),
            })?;
        info!(
            "[kc-aggregation] applied finalized block {} at height {}",
            short_hex(&proof.selected_hash),
            height
        );
        self.pool.clear_height(height).await;
        Ok(())
    }
}
