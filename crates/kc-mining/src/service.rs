//! Miner orchestrator: one mining round.
//!
//! A round is: gate check, wait for the mining slot, height-gate check,
//! candidate build, proof of work, optional compliance re-check, submission
//! to the aggregator, and arming the confirmation watcher. The round ends
//! at submission; the watcher closes the loop asynchronously.

use crate::config::MinerConfig;
use crate::error::{MiningError, Result};
use crate::gate::QuorumGate;
use crate::height_gate::HeightGate;
use crate::metrics;
use crate::ports::{
    BlockBuilder, CandidateRequest, ChainQuery, CompliancePolicy, IncentiveCollector,
    PeerDirectory, PowEngine, RoundSubmitter,
};
use crate::watcher::ConfirmationWatchers;
use kc_consensus_rules as rules;
use shared_types::{BlockHeader, CandidateBlock, Hash, TimeSource};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// External collaborators of the orchestrator.
pub struct MinerDependencies {
    /// Local chain reads.
    pub chain: Arc<dyn ChainQuery>,
    /// Candidate assembly.
    pub builder: Arc<dyn BlockBuilder>,
    /// Fee and incentive construction.
    pub incentives: Arc<dyn IncentiveCollector>,
    /// Proof-of-work kernel.
    pub engine: Arc<dyn PowEngine>,
    /// The aggregation entry point.
    pub submitter: Arc<dyn RoundSubmitter>,
    /// Peer visibility (for the candidate's source id).
    pub peers: Arc<dyn PeerDirectory>,
    /// Wall clock.
    pub clock: Arc<dyn TimeSource>,
    /// Optional post-mining policy check.
    pub compliance: Option<Arc<dyn CompliancePolicy>>,
}

/// Result of one mining round.
#[derive(Debug, Clone)]
pub enum RoundOutcome {
    /// A block was mined and submitted; a watcher is now running.
    Completed {
        /// Height mined.
        height: u64,
        /// Hash of the mined block.
        block_hash: Hash,
    },
    /// No new height to mine yet; the round ended silently.
    SkippedHeightGate {
        /// The height that was already processed.
        height: u64,
    },
}

/// The per-round miner orchestrator.
pub struct MinerService {
    chain: Arc<dyn ChainQuery>,
    builder: Arc<dyn BlockBuilder>,
    incentives: Arc<dyn IncentiveCollector>,
    engine: Arc<dyn PowEngine>,
    submitter: Arc<dyn RoundSubmitter>,
    peers: Arc<dyn PeerDirectory>,
    clock: Arc<dyn TimeSource>,
    compliance: Option<Arc<dyn CompliancePolicy>>,
    gate: Arc<QuorumGate>,
    height_gate: Arc<HeightGate>,
    watchers: ConfirmationWatchers,
    config: MinerConfig,
    address_set: AtomicBool,
}

impl MinerService {
    /// Create the orchestrator.
    pub fn new(
        deps: MinerDependencies,
        gate: Arc<QuorumGate>,
        height_gate: Arc<HeightGate>,
        watchers: ConfirmationWatchers,
        config: MinerConfig,
    ) -> Self {
        Self {
            chain: deps.chain,
            builder: deps.builder,
            incentives: deps.incentives,
            engine: deps.engine,
            submitter: deps.submitter,
            peers: deps.peers,
            clock: deps.clock,
            compliance: deps.compliance,
            gate,
            height_gate,
            watchers,
            config,
            address_set: AtomicBool::new(false),
        }
    }

    /// The quorum gate, shared with the controller.
    pub fn gate(&self) -> &Arc<QuorumGate> {
        &self.gate
    }

    /// The height gate.
    pub fn height_gate(&self) -> &Arc<HeightGate> {
        &self.height_gate
    }

    /// The watcher registry.
    pub fn watchers(&self) -> &ConfirmationWatchers {
        &self.watchers
    }

    /// Validate and propagate the miner beneficiary address. Must be called
    /// before the first round.
    pub fn set_miner_address(&self, address: &[u8]) -> Result<()> {
        if address.len() < 20 {
            return Err(MiningError::InvalidMinerAddress(format!(
                "address must be at least 20 bytes, got {}",
                address.len()
            )));
        }
        if address.iter().all(|b| *b == 0) {
            return Err(MiningError::InvalidMinerAddress(
                "address must not be all zero".into(),
            ));
        }
        self.incentives.set_miner_address(address);
        self.builder.set_miner_address(address);
        self.address_set.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Run one mining round. `cancel` aborts the slot wait and the PoW
    /// search; submitted work is never recalled.
    pub async fn run_round(&self, cancel: watch::Receiver<bool>) -> Result<RoundOutcome> {
        if !self.address_set.load(Ordering::SeqCst) {
            return Err(MiningError::MinerAddressNotSet);
        }

        // Step 1: safety gate.
        let verdict = self.gate.check().await;
        if !verdict.allow_mining {
            metrics::record_round("gate_blocked");
            return Err(verdict.to_error());
        }

        // Steps 2-3: slot wait and height parity.
        let (best_block_hash, parent, timestamps) = self.chain_context().await?;
        self.wait_for_mining_slot(parent.as_ref(), &timestamps, cancel.clone())
            .await?;

        let next_height = parent.as_ref().map(|p| p.height + 1).unwrap_or(0);
        let last_processed = self.height_gate.get();
        let height_gate_open =
            next_height > last_processed || (next_height == 0 && last_processed == 0);
        if !height_gate_open {
            debug!(
                "[kc-mining] no new height to mine: next={} last_processed={}",
                next_height, last_processed
            );
            metrics::record_round("skipped");
            return Ok(RoundOutcome::SkippedHeightGate {
                height: last_processed,
            });
        }

        // Steps 4-7, bounded by the optional round timeout.
        let work = self.mine_and_submit(next_height, best_block_hash, parent, &timestamps, cancel);
        let outcome = if self.config.mining_timeout > 0 {
            match tokio::time::timeout(Duration::from_secs(self.config.mining_timeout), work).await
            {
                Ok(result) => result?,
                Err(_) => {
                    metrics::record_round("timeout");
                    return Err(MiningError::PowFailed(format!(
                        "round exceeded mining timeout of {}s",
                        self.config.mining_timeout
                    )));
                }
            }
        } else {
            work.await?
        };

        metrics::record_round("completed");
        Ok(outcome)
    }

    async fn chain_context(&self) -> Result<(Hash, Option<BlockHeader>, Vec<u64>)> {
        let info = self.chain.chain_info().await?;
        let window = self
            .config
            .consensus
            .mtp_window
            .max(self.config.consensus.difficulty_window);
        let parent = self.chain.header_by_height(info.height).await?;
        if parent.is_none() && !(info.height == 0 && info.best_block_hash == [0u8; 32]) {
            return Err(MiningError::QueryFailed(format!(
                "tip header at height {} unreadable",
                info.height
            )));
        }
        let timestamps = self.chain.recent_timestamps(window).await?;
        Ok((info.best_block_hash, parent, timestamps))
    }

    /// Sleep (cancellably) until the consensus rules allow the next block.
    /// An empty chain returns immediately.
    async fn wait_for_mining_slot(
        &self,
        parent: Option<&BlockHeader>,
        timestamps: &[u64],
        mut cancel: watch::Receiver<bool>,
    ) -> Result<()> {
        let earliest =
            rules::earliest_allowed_timestamp(parent, timestamps, &self.config.consensus);
        let now = self.clock.now();
        if now >= earliest {
            return Ok(());
        }
        let wait = Duration::from_secs(earliest - now);
        debug!(
            "[kc-mining] waiting {:?} for mining slot (earliest allowed {})",
            wait, earliest
        );
        tokio::select! {
            _ = tokio::time::sleep(wait) => Ok(()),
            _ = cancel.changed() => Err(MiningError::Cancelled),
        }
    }

    async fn mine_and_submit(
        &self,
        height: u64,
        best_block_hash: Hash,
        parent: Option<BlockHeader>,
        timestamps: &[u64],
        mut cancel: watch::Receiver<bool>,
    ) -> Result<RoundOutcome> {
        let now = self.clock.now();

        // Step 4: difficulty and candidate assembly.
        let difficulty = match &parent {
            Some(parent) => {
                let base = rules::next_difficulty(parent, timestamps, &self.config.consensus)
                    .map_err(|e| MiningError::BuildFailed(e.to_string()))?;
                let bits = rules::emergency_downshift_bits(parent, now, &self.config.consensus);
                if bits > 0 {
                    warn!(
                        "[kc-mining] emergency downshift of {} bits after stall (parent ts {})",
                        bits, parent.timestamp
                    );
                }
                rules::apply_emergency_downshift(base, bits, &self.config.consensus)
            }
            None => self.config.initial_difficulty,
        };

        let request = CandidateRequest {
            height,
            parent_hash: best_block_hash,
            difficulty,
            earliest_timestamp: rules::earliest_allowed_timestamp(
                parent.as_ref(),
                timestamps,
                &self.config.consensus,
            ),
            max_transactions: self.config.max_transactions,
            min_transactions: self.config.min_transactions,
            selection_mode: self.config.tx_selection_mode,
        };
        let candidate = self
            .builder
            .build_candidate(request)
            .await
            .map_err(|e| MiningError::BuildFailed(e.to_string()))?;

        // Step 5: proof of work. No internal timeout; cancellation drops
        // the future.
        let mined = tokio::select! {
            mined = self.engine.mine(candidate) => {
                mined.map_err(|e| MiningError::PowFailed(e.to_string()))?
            }
            _ = cancel.changed() => return Err(MiningError::Cancelled),
        };

        // Step 6: optional compliance re-check of the fully-mined block.
        if let Some(policy) = &self.compliance {
            policy
                .validate_mined(&mined.block)
                .await
                .map_err(|e| MiningError::ComplianceRejected(e.to_string()))?;
        }

        // Step 7: the single submission path, elected or not.
        let produced_at = self.clock.now();
        let submission = CandidateBlock {
            block: mined.block,
            block_hash: mined.block_hash,
            height,
            produced_at,
            received_at: produced_at,
            source: self.peers.local_node_id(),
        };
        self.submitter
            .submit_round(submission)
            .await
            .map_err(|e| MiningError::SubmitFailed(e.to_string()))?;

        info!(
            "[kc-mining] mined and submitted block {} at height {}",
            hex::encode(&mined.block_hash[..8]),
            height
        );

        // Step 8 happens in the watcher; step 9: arm it.
        self.watchers.start_watch(height);
        Ok(RoundOutcome::Completed {
            height,
            block_hash: mined.block_hash,
        })
    }
}
