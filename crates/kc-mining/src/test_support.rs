//! In-memory fake ports shared by the orchestrator and controller tests.

use crate::error::{MiningError, Result};
use crate::ports::{
    BlockBuilder, CandidateRequest, ChainQuery, HelloResponse, HelloService, IncentiveCollector,
    MinedBlock, PeerDirectory, PowEngine, RoundSubmitter, SyncCheck, SyncService,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use shared_types::{Block, BlockHeader, CandidateBlock, ChainInfo, ChainStatus, Hash, NodeId, Transaction};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Fixed "now" used across mining tests.
pub const TEST_NOW: u64 = 1_700_000_000;

/// Chain with a mutable tip height and a fixed tip timestamp.
pub struct FakeChain {
    pub height: AtomicU64,
    pub tip_timestamp: u64,
}

impl FakeChain {
    pub fn new(height: u64, tip_timestamp: u64) -> Self {
        Self {
            height: AtomicU64::new(height),
            tip_timestamp,
        }
    }

    pub fn set_height(&self, height: u64) {
        self.height.store(height, Ordering::SeqCst);
    }
}

#[async_trait]
impl ChainQuery for FakeChain {
    async fn chain_info(&self) -> Result<ChainInfo> {
        Ok(ChainInfo {
            height: self.height.load(Ordering::SeqCst),
            best_block_hash: [0x0B; 32],
            is_ready: true,
            status: ChainStatus::Ready,
        })
    }

    async fn header_by_height(&self, height: u64) -> Result<Option<BlockHeader>> {
        Ok((height == self.height.load(Ordering::SeqCst)).then(|| BlockHeader {
            version: 1,
            height,
            parent_hash: [0x0A; 32],
            merkle_root: [0x01; 32],
            state_root: [0x02; 32],
            timestamp: self.tip_timestamp,
            difficulty: 1_000,
            nonce: [0x03; 8],
        }))
    }

    async fn recent_timestamps(&self, count: usize) -> Result<Vec<u64>> {
        // A clean history of 15-second blocks ending at the tip timestamp.
        let count = count.min(20) as u64;
        Ok((0..count)
            .map(|i| self.tip_timestamp.saturating_sub((count - 1 - i) * 15))
            .collect())
    }
}

/// Peer directory with a fixed local id.
pub struct FakePeersDir {
    pub connected: Vec<NodeId>,
}

impl FakePeersDir {
    pub fn new(peer_bytes: impl Iterator<Item = u8>) -> Self {
        Self {
            connected: peer_bytes.map(|b| NodeId([b; 32])).collect(),
        }
    }
}

impl PeerDirectory for FakePeersDir {
    fn local_node_id(&self) -> NodeId {
        NodeId([0x01; 32])
    }

    fn discovered_peers(&self) -> Vec<NodeId> {
        self.connected.clone()
    }

    fn connected_peers(&self) -> Vec<NodeId> {
        self.connected.clone()
    }
}

/// Hello service answering with a fixed chain id per peer.
pub struct FakeHello {
    pub responses: HashMap<NodeId, (String, u64)>,
}

impl FakeHello {
    pub fn aligned(chain_id: &str, peer_heights: &[(u8, u64)]) -> Self {
        Self {
            responses: peer_heights
                .iter()
                .map(|(b, h)| (NodeId([*b; 32]), (chain_id.to_string(), *h)))
                .collect(),
        }
    }
}

#[async_trait]
impl HelloService for FakeHello {
    async fn hello_v2(&self, peer: &NodeId) -> Result<HelloResponse> {
        match self.responses.get(peer) {
            Some((chain_id, height)) => Ok(HelloResponse {
                chain_id: chain_id.clone(),
                tip_height: *height,
            }),
            None => Err(MiningError::QueryFailed("peer unreachable".into())),
        }
    }
}

/// Builder producing a one-transaction block from the request.
#[derive(Default)]
pub struct FakeBuilder {
    pub address: Mutex<Option<Vec<u8>>>,
}

#[async_trait]
impl BlockBuilder for FakeBuilder {
    async fn build_candidate(&self, request: CandidateRequest) -> Result<Block> {
        Ok(Block {
            header: BlockHeader {
                version: 1,
                height: request.height,
                parent_hash: request.parent_hash,
                merkle_root: [0x33; 32],
                state_root: [0x44; 32],
                timestamp: request.earliest_timestamp.max(TEST_NOW),
                difficulty: request.difficulty,
                nonce: [0u8; 8],
            },
            transactions: vec![Transaction {
                tx_hash: [request.height as u8; 32],
                raw: vec![0u8; 32],
            }],
        })
    }

    fn set_miner_address(&self, address: &[u8]) {
        *self.address.lock() = Some(address.to_vec());
    }
}

#[async_trait]
impl IncentiveCollector for FakeBuilder {
    fn set_miner_address(&self, address: &[u8]) {
        *self.address.lock() = Some(address.to_vec());
    }
}

/// Engine that seals immediately with a height-derived hash.
#[derive(Default)]
pub struct FakeEngine;

#[async_trait]
impl PowEngine for FakeEngine {
    async fn mine(&self, candidate: Block) -> Result<MinedBlock> {
        let mut block = candidate;
        block.header.nonce = [0x5A; 8];
        let mut block_hash: Hash = [0u8; 32];
        block_hash[0] = 0x5A;
        block_hash[31] = block.header.height as u8;
        Ok(MinedBlock { block, block_hash })
    }
}

/// Engine that never finds a nonce; used to exercise cancellation.
pub struct StuckEngine;

#[async_trait]
impl PowEngine for StuckEngine {
    async fn mine(&self, _candidate: Block) -> Result<MinedBlock> {
        std::future::pending::<()>().await;
        unreachable!()
    }
}

/// Submitter recording every candidate.
#[derive(Default)]
pub struct FakeSubmitter {
    pub submitted: Mutex<Vec<CandidateBlock>>,
}

#[async_trait]
impl RoundSubmitter for FakeSubmitter {
    async fn submit_round(&self, candidate: CandidateBlock) -> Result<()> {
        self.submitted.lock().push(candidate);
        Ok(())
    }
}

/// Sync service with nothing to do.
#[derive(Default)]
pub struct FakeSyncSvc {
    pub triggers: Mutex<Vec<String>>,
}

#[async_trait]
impl SyncService for FakeSyncSvc {
    async fn trigger_sync(&self, reason: &str) -> Result<()> {
        self.triggers.lock().push(reason.to_string());
        Ok(())
    }

    async fn check_sync(&self) -> Result<SyncCheck> {
        Ok(SyncCheck {
            local_height: 0,
            network_height: 0,
            syncing: false,
        })
    }
}

/// Convenience: an Arc'd fake chain shared between ports.
pub fn arc_chain(height: u64) -> Arc<FakeChain> {
    Arc::new(FakeChain::new(height, TEST_NOW - 60))
}
