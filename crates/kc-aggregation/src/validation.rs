//! Candidate validation.
//!
//! Checks run in a fixed order and the first failure short-circuits with a
//! specific error kind: structure, timestamp, minimum block interval (tip+1
//! only), heuristic drift, parent hash, quality filters, proof of work.
//! Validation never retries; recovery belongs to the callers.

use crate::config::{ValidationConfig, HEURISTIC_FUTURE_SECS, HEURISTIC_PAST_SECS};
use crate::error::{short_hex, AggregationError, Result};
use crate::ports::{ChainQuery, PowVerifier, SyncTrigger};
use kc_consensus_rules::ConsensusParams;
use shared_types::{CandidateBlock, TimeSource};
use std::sync::Arc;
use tracing::warn;

/// Validator for submitted candidate blocks.
pub struct CandidateValidator {
    chain: Arc<dyn ChainQuery>,
    pow: Arc<dyn PowVerifier>,
    sync: Arc<dyn SyncTrigger>,
    clock: Arc<dyn TimeSource>,
    params: ConsensusParams,
    config: ValidationConfig,
}

impl CandidateValidator {
    /// Create a validator over the given collaborators.
    pub fn new(
        chain: Arc<dyn ChainQuery>,
        pow: Arc<dyn PowVerifier>,
        sync: Arc<dyn SyncTrigger>,
        clock: Arc<dyn TimeSource>,
        params: ConsensusParams,
        config: ValidationConfig,
    ) -> Self {
        Self {
            chain,
            pow,
            sync,
            clock,
            params,
            config,
        }
    }

    /// Run the full check sequence against one candidate.
    pub async fn validate(&self, candidate: &CandidateBlock) -> Result<()> {
        self.check_structure(candidate)?;
        self.check_timestamp(candidate)?;
        self.check_min_interval(candidate).await?;
        self.check_heuristic_drift(candidate)?;
        self.check_parent(candidate).await?;
        self.check_quality(candidate).await?;
        Ok(())
    }

    fn check_structure(&self, candidate: &CandidateBlock) -> Result<()> {
        let header = &candidate.block.header;
        if candidate.block_hash == [0u8; 32] {
            return Err(AggregationError::InvalidStructure(
                "zero block hash".into(),
            ));
        }
        if header.height != candidate.height {
            return Err(AggregationError::InvalidStructure(format!(
                "header height {} does not match candidate height {}",
                header.height, candidate.height
            )));
        }
        if header.merkle_root == [0u8; 32] {
            return Err(AggregationError::InvalidStructure(
                "empty merkle root".into(),
            ));
        }
        Ok(())
    }

    fn check_timestamp(&self, candidate: &CandidateBlock) -> Result<()> {
        let now = self.clock.now();
        let ts = candidate.block.header.timestamp;
        let offset = ts.abs_diff(now);
        if offset > self.config.max_timestamp_offset {
            return Err(AggregationError::InvalidTimestamp {
                reason: format!(
                    "offset {}s exceeds limit {}s",
                    offset, self.config.max_timestamp_offset
                ),
                candidate_ts: ts,
                now,
            });
        }
        if candidate.received_at < candidate.produced_at {
            return Err(AggregationError::InvalidTimestamp {
                reason: format!(
                    "received_at {} precedes produced_at {}",
                    candidate.received_at, candidate.produced_at
                ),
                candidate_ts: ts,
                now,
            });
        }
        Ok(())
    }

    /// Minimum block interval, enforced only for candidates extending the
    /// local tip. Other heights are handled by the parent-hash check or by
    /// sync.
    async fn check_min_interval(&self, candidate: &CandidateBlock) -> Result<()> {
        if candidate.height == 0 {
            return Ok(());
        }
        let min_interval = self.params.min_block_interval_s;
        if min_interval == 0 {
            return Ok(());
        }
        let info = self
            .chain
            .chain_info()
            .await
            .map_err(|e| AggregationError::QueryFailed(e.to_string()))?;
        if candidate.height != info.height + 1 {
            return Ok(());
        }

        let parent = match self.chain.header_by_height(info.height).await {
            Ok(Some(header)) => header,
            // Failing to read the parent timestamp here is fatal for this
            // candidate: without it the interval rule cannot be evaluated.
            other => {
                warn!(
                    "[kc-aggregation] cannot read parent header at height {} for interval check: {:?}",
                    info.height,
                    other.err().map(|e| e.to_string())
                );
                self.sync
                    .trigger_urgent_sync(
                        Some(candidate.source),
                        "parent header unreadable during interval check",
                    )
                    .await;
                return Err(AggregationError::MissingParentData(format!(
                    "parent header at height {} unreadable",
                    info.height
                )));
            }
        };

        let candidate_ts = candidate.block.header.timestamp;
        if candidate_ts < parent.timestamp.saturating_add(min_interval) {
            warn!(
                "[kc-aggregation] min interval reject: parent_ts={} candidate_ts={} min_interval={}s",
                parent.timestamp, candidate_ts, min_interval
            );
            return Err(AggregationError::MinIntervalViolation {
                parent_ts: parent.timestamp,
                candidate_ts,
                min_interval,
            });
        }
        Ok(())
    }

    /// Belt-and-suspenders wall-clock bounds, independent of consensus
    /// drift rules.
    fn check_heuristic_drift(&self, candidate: &CandidateBlock) -> Result<()> {
        let now = self.clock.now();
        let ts = candidate.block.header.timestamp;
        if ts > now.saturating_add(HEURISTIC_FUTURE_SECS) {
            return Err(AggregationError::InvalidTimestamp {
                reason: format!("more than {HEURISTIC_FUTURE_SECS}s ahead of wall clock"),
                candidate_ts: ts,
                now,
            });
        }
        if ts.saturating_add(HEURISTIC_PAST_SECS) < now {
            return Err(AggregationError::InvalidTimestamp {
                reason: format!("more than {HEURISTIC_PAST_SECS}s behind wall clock"),
                candidate_ts: ts,
                now,
            });
        }
        Ok(())
    }

    async fn check_parent(&self, candidate: &CandidateBlock) -> Result<()> {
        if candidate.height == 0 {
            return Ok(());
        }
        let header = &candidate.block.header;
        if header.parent_hash == [0u8; 32] {
            return Err(AggregationError::InvalidStructure(
                "zero parent hash above genesis".into(),
            ));
        }

        let info = self
            .chain
            .chain_info()
            .await
            .map_err(|e| AggregationError::QueryFailed(e.to_string()))?;

        if candidate.height > info.height + 1 {
            self.sync
                .trigger_urgent_sync(
                    Some(candidate.source),
                    "candidate height ahead of local tip",
                )
                .await;
            return Err(AggregationError::MissingParentData(format!(
                "candidate height {} ahead of local tip {}",
                candidate.height, info.height
            )));
        }
        if candidate.height != info.height + 1 {
            return Err(AggregationError::InvalidStructure(format!(
                "candidate height {} does not extend tip {}",
                candidate.height, info.height
            )));
        }

        // Parent body must be readable byte-level, not just indexed.
        match self.chain.read_block_bytes(&header.parent_hash).await {
            Ok(Some(bytes)) if !bytes.is_empty() => {}
            _ => {
                self.sync
                    .trigger_urgent_sync(Some(candidate.source), "missing parent block data")
                    .await;
                return Err(AggregationError::MissingParentData(
                    "missing parent block data".into(),
                ));
            }
        }

        if header.parent_hash != info.best_block_hash {
            self.sync
                .trigger_urgent_sync(Some(candidate.source), "parent hash mismatch with local best")
                .await;
            return Err(AggregationError::ParentHashMismatch {
                expected: short_hex(&info.best_block_hash),
                actual: short_hex(&header.parent_hash),
            });
        }
        Ok(())
    }

    async fn check_quality(&self, candidate: &CandidateBlock) -> Result<()> {
        let block = &candidate.block;
        if block.transactions.len() < self.config.min_transaction_count {
            return Err(AggregationError::QualityFilter(format!(
                "transaction count {} below minimum {}",
                block.transactions.len(),
                self.config.min_transaction_count
            )));
        }
        let size = block.serialized_size();
        if size > self.config.max_block_size {
            return Err(AggregationError::QualityFilter(format!(
                "serialized size {} exceeds limit {}",
                size, self.config.max_block_size
            )));
        }
        if block.header.nonce == [0u8; 8] {
            return Err(AggregationError::PoWInvalid("empty nonce".into()));
        }
        if block.header.difficulty == 0 {
            return Err(AggregationError::PoWInvalid("zero difficulty".into()));
        }
        let valid = self
            .pow
            .verify(&block.header, &candidate.block_hash)
            .await
            .map_err(|e| AggregationError::PoWInvalid(e.to_string()))?;
        if !valid {
            return Err(AggregationError::PoWInvalid(format!(
                "hash {} does not meet difficulty {}",
                short_hex(&candidate.block_hash),
                block.header.difficulty
            )));
        }
        Ok(())
    }
}
