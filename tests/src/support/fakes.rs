//! In-memory fakes wiring the mining and aggregation subsystems together.
//!
//! One `TestChain` backs both subsystems' chain-query ports, the
//! `FinalizingApply` hook advances it when the aggregator applies a block,
//! and `SubmitAdapter` is the production wiring between the miner's
//! submission port and the aggregator's `process_round`.

use async_trait::async_trait;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use shared_types::{
    Block, BlockHeader, CandidateBlock, ChainInfo, ChainStatus, Hash, NodeId, Transaction,
};
use std::collections::HashMap;
use std::sync::Arc;

use kc_aggregation::domain::selector::DistanceProof;
use kc_aggregation::{AggregatorService, RoundOutcome};

/// Fixed test epoch.
pub const TEST_NOW: u64 = 1_700_000_000;

/// Local node id used across fixtures.
pub fn local_id() -> NodeId {
    NodeId([0x01; 32])
}

/// Helper: a peer node id.
pub fn peer_id(byte: u8) -> NodeId {
    NodeId([byte; 32])
}

/// Deterministic block hash for test blocks.
pub fn test_block_hash(header: &BlockHeader) -> Hash {
    let mut hasher = Sha256::new();
    hasher.update(header.height.to_be_bytes());
    hasher.update(header.merkle_root);
    hasher.update(header.nonce);
    hasher.finalize().into()
}

struct ChainModel {
    height: u64,
    best_hash: Hash,
    headers: HashMap<u64, BlockHeader>,
}

/// Mutable in-memory chain shared by every port that reads the chain.
pub struct TestChain {
    inner: Mutex<ChainModel>,
}

impl TestChain {
    /// Chain with `height + 1` blocks at 15-second spacing, tip at
    /// `TEST_NOW - 60`.
    pub fn new(height: u64) -> Self {
        let mut headers = HashMap::new();
        let mut best_hash = [0u8; 32];
        for h in 0..=height {
            let header = BlockHeader {
                version: 1,
                height: h,
                parent_hash: best_hash,
                merkle_root: [0x01; 32],
                state_root: [0x02; 32],
                timestamp: TEST_NOW - 60 - (height - h) * 15,
                difficulty: 1_000,
                nonce: [0x03; 8],
            };
            best_hash = test_block_hash(&header);
            headers.insert(h, header);
        }
        Self {
            inner: Mutex::new(ChainModel {
                height,
                best_hash,
                headers,
            }),
        }
    }

    /// Local tip height.
    pub fn height(&self) -> u64 {
        self.inner.lock().height
    }

    /// Local best hash.
    pub fn best_hash(&self) -> Hash {
        self.inner.lock().best_hash
    }

    /// Append an applied block.
    pub fn apply(&self, header: BlockHeader, block_hash: Hash) {
        let mut inner = self.inner.lock();
        inner.height = header.height;
        inner.best_hash = block_hash;
        inner.headers.insert(header.height, header);
    }

    fn info(&self) -> ChainInfo {
        let inner = self.inner.lock();
        ChainInfo {
            height: inner.height,
            best_block_hash: inner.best_hash,
            is_ready: true,
            status: ChainStatus::Ready,
        }
    }

    fn header(&self, height: u64) -> Option<BlockHeader> {
        self.inner.lock().headers.get(&height).cloned()
    }

    fn timestamps(&self, count: usize) -> Vec<u64> {
        let inner = self.inner.lock();
        let start = inner.height.saturating_sub(count.saturating_sub(1) as u64);
        (start..=inner.height)
            .filter_map(|h| inner.headers.get(&h).map(|hdr| hdr.timestamp))
            .collect()
    }
}

#[async_trait]
impl kc_mining::ports::ChainQuery for TestChain {
    async fn chain_info(&self) -> kc_mining::Result<ChainInfo> {
        Ok(self.info())
    }

    async fn header_by_height(&self, height: u64) -> kc_mining::Result<Option<BlockHeader>> {
        Ok(self.header(height))
    }

    async fn recent_timestamps(&self, count: usize) -> kc_mining::Result<Vec<u64>> {
        Ok(self.timestamps(count))
    }
}

#[async_trait]
impl kc_aggregation::ports::ChainQuery for TestChain {
    async fn chain_info(&self) -> kc_aggregation::Result<ChainInfo> {
        Ok(self.info())
    }

    async fn header_by_height(&self, height: u64) -> kc_aggregation::Result<Option<BlockHeader>> {
        Ok(self.header(height))
    }

    async fn header_by_hash(&self, hash: &Hash) -> kc_aggregation::Result<Option<BlockHeader>> {
        let inner = self.inner.lock();
        Ok(inner
            .headers
            .values()
            .find(|h| test_block_hash(h) == *hash)
            .cloned())
    }

    async fn read_block_bytes(&self, _hash: &Hash) -> kc_aggregation::Result<Option<Vec<u8>>> {
        Ok(Some(vec![0xAB; 64]))
    }
}

/// PoW verifier that accepts any sealed block (non-zero nonce).
pub struct AcceptingPow;

#[async_trait]
impl kc_aggregation::ports::PowVerifier for AcceptingPow {
    async fn verify(&self, header: &BlockHeader, _hash: &Hash) -> kc_aggregation::Result<bool> {
        Ok(header.nonce != [0u8; 8])
    }
}

/// Sync trigger recording reasons.
#[derive(Default)]
pub struct RecordingSync {
    pub reasons: Mutex<Vec<String>>,
}

#[async_trait]
impl kc_aggregation::ports::SyncTrigger for RecordingSync {
    async fn trigger_urgent_sync(&self, _peer: Option<NodeId>, reason: &str) {
        self.reasons.lock().push(reason.to_string());
    }
}

#[async_trait]
impl kc_mining::ports::SyncService for RecordingSync {
    async fn trigger_sync(&self, reason: &str) -> kc_mining::Result<()> {
        self.reasons.lock().push(reason.to_string());
        Ok(())
    }

    async fn check_sync(&self) -> kc_mining::Result<kc_mining::ports::SyncCheck> {
        Ok(kc_mining::ports::SyncCheck {
            local_height: 0,
            network_height: 0,
            syncing: false,
        })
    }
}

/// Routing that ranks the local node closest for every key.
pub struct LocalFirstRouting {
    pub others: Vec<NodeId>,
}

impl kc_aggregation::ports::AggregatorRouting for LocalFirstRouting {
    fn local_node_id(&self) -> NodeId {
        local_id()
    }

    fn closest_nodes(&self, _key: &Hash, count: usize) -> Vec<NodeId> {
        let mut ranked = vec![local_id()];
        ranked.extend(self.others.iter().copied());
        ranked.truncate(count);
        ranked
    }
}

/// Candidate channel that should never be used (local node is elected).
pub struct UnreachableChannel;

#[async_trait]
impl kc_aggregation::ports::CandidateChannel for UnreachableChannel {
    async fn supports_aggregation(&self, _target: &NodeId) -> kc_aggregation::Result<bool> {
        Ok(false)
    }

    async fn forward_candidate(
        &self,
        _target: &NodeId,
        _candidate: &CandidateBlock,
    ) -> kc_aggregation::Result<()> {
        Err(kc_aggregation::AggregationError::NetworkError(
            "unexpected forward in local-aggregator test".into(),
        ))
    }
}

/// Gossip recorder.
#[derive(Default)]
pub struct RecordingGossip {
    pub broadcasts: Mutex<Vec<(u64, DistanceProof)>>,
}

#[async_trait]
impl kc_aggregation::ports::ConsensusGossip for RecordingGossip {
    async fn broadcast_finalized(
        &self,
        block: &Block,
        proof: &DistanceProof,
    ) -> kc_aggregation::Result<()> {
        self.broadcasts
            .lock()
            .push((block.header.height, proof.clone()));
        Ok(())
    }
}

/// Apply hook that advances the shared test chain, closing the miner's
/// confirmation loop.
pub struct FinalizingApply {
    pub chain: Arc<TestChain>,
}

#[async_trait]
impl kc_aggregation::ports::ChainApply for FinalizingApply {
    async fn apply_block(&self, block: &Block) -> kc_aggregation::Result<()> {
        let hash = test_block_hash(&block.header);
        self.chain.apply(block.header.clone(), hash);
        Ok(())
    }
}

/// Candidate pool recorder.
#[derive(Default)]
pub struct RecordingPool {
    pub cleared: Mutex<Vec<u64>>,
}

#[async_trait]
impl kc_aggregation::ports::CandidatePool for RecordingPool {
    async fn clear_height(&self, height: u64) {
        self.cleared.lock().push(height);
    }
}

/// Production wiring: the miner's submission port delegating to the
/// aggregator state machine.
pub struct SubmitAdapter {
    pub aggregator: Arc<AggregatorService>,
}

#[async_trait]
impl kc_mining::ports::RoundSubmitter for SubmitAdapter {
    async fn submit_round(&self, candidate: CandidateBlock) -> kc_mining::Result<()> {
        match self.aggregator.process_round(candidate).await {
            Ok(RoundOutcome::Forwarded { .. }) | Ok(RoundOutcome::Accepted { .. }) => Ok(()),
            Err(err) => Err(kc_mining::MiningError::SubmitFailed(err.to_string())),
        }
    }
}

/// Introspection adapter from the aggregator's collector to the watcher
/// diagnostics.
pub struct IntrospectAdapter {
    pub aggregator: Arc<AggregatorService>,
}

impl kc_mining::ports::AggregationIntrospect for IntrospectAdapter {
    fn round_status(&self, height: u64) -> Option<kc_mining::ports::AggregationStatus> {
        self.aggregator.collector().progress(height).map(|p| {
            kc_mining::ports::AggregationStatus {
                window_active: p.active,
                collected: p.counters.collected,
                validated: p.counters.validated,
                rejected: p.counters.rejected,
                duplicates: p.counters.duplicates,
                progress: p.progress,
                mean_receive_delay_secs: p.mean_receive_delay_secs,
            }
        })
    }
}

/// Peer directory over a fixed connected set.
pub struct StaticPeers {
    pub connected: Vec<NodeId>,
}

impl kc_mining::ports::PeerDirectory for StaticPeers {
    fn local_node_id(&self) -> NodeId {
        local_id()
    }

    fn discovered_peers(&self) -> Vec<NodeId> {
        self.connected.clone()
    }

    fn connected_peers(&self) -> Vec<NodeId> {
        self.connected.clone()
    }
}

/// Hello service answering from the shared chain (peers track our tip).
pub struct ChainFollowingHello {
    pub chain: Arc<TestChain>,
    pub chain_id: String,
}

#[async_trait]
impl kc_mining::ports::HelloService for ChainFollowingHello {
    async fn hello_v2(&self, _peer: &NodeId) -> kc_mining::Result<kc_mining::ports::HelloResponse> {
        Ok(kc_mining::ports::HelloResponse {
            chain_id: self.chain_id.clone(),
            tip_height: self.chain.height(),
        })
    }
}

/// Builder assembling a single-transaction block per request.
#[derive(Default)]
pub struct TestBuilder;

#[async_trait]
impl kc_mining::ports::BlockBuilder for TestBuilder {
    async fn build_candidate(
        &self,
        request: kc_mining::ports::CandidateRequest,
    ) -> kc_mining::Result<Block> {
        Ok(Block {
            header: BlockHeader {
                version: 1,
                height: request.height,
                parent_hash: request.parent_hash,
                merkle_root: [0x21; 32],
                state_root: [0x22; 32],
                timestamp: request.earliest_timestamp.max(TEST_NOW),
                difficulty: request.difficulty,
                nonce: [0u8; 8],
            },
            transactions: vec![Transaction {
                tx_hash: [request.height as u8; 32],
                raw: vec![0u8; 24],
            }],
        })
    }

    fn set_miner_address(&self, _address: &[u8]) {}
}

#[async_trait]
impl kc_mining::ports::IncentiveCollector for TestBuilder {
    fn set_miner_address(&self, _address: &[u8]) {}
}

/// Engine sealing instantly with the deterministic test hash.
pub struct InstantEngine;

#[async_trait]
impl kc_mining::ports::PowEngine for InstantEngine {
    async fn mine(&self, candidate: Block) -> kc_mining::Result<kc_mining::ports::MinedBlock> {
        let mut block = candidate;
        block.header.nonce = [0x5A; 8];
        let block_hash = test_block_hash(&block.header);
        Ok(kc_mining::ports::MinedBlock { block, block_hash })
    }
}
