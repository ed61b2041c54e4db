//! Outbound ports (driven side).
//!
//! Every external collaborator of the aggregator is consumed through one of
//! these contracts. Implementations are thread-safe; the service holds them
//! behind `Arc<dyn …>`.

use crate::error::Result;
use async_trait::async_trait;
use shared_types::{Block, BlockHeader, CandidateBlock, ChainInfo, Hash, NodeId};

use crate::domain::selector::DistanceProof;

/// Port: read the local chain.
#[async_trait]
pub trait ChainQuery: Send + Sync {
    /// Snapshot of the local tip.
    async fn chain_info(&self) -> Result<ChainInfo>;

    /// Header at a height, if present.
    async fn header_by_height(&self, height: u64) -> Result<Option<BlockHeader>>;

    /// Header by block hash, if present.
    async fn header_by_hash(&self, hash: &Hash) -> Result<Option<BlockHeader>>;

    /// Raw block bytes by hash. `None` when the block body is not stored
    /// locally (header-only or pruned).
    async fn read_block_bytes(&self, hash: &Hash) -> Result<Option<Vec<u8>>>;
}

/// Port: proof-of-work verification kernel.
#[async_trait]
pub trait PowVerifier: Send + Sync {
    /// Whether `block_hash` satisfies the difficulty target committed in
    /// `header`.
    async fn verify(&self, header: &BlockHeader, block_hash: &Hash) -> Result<bool>;
}

/// Port: ask the sync engine for help.
#[async_trait]
pub trait SyncTrigger: Send + Sync {
    /// Request an urgent sync, optionally hinting at a peer known to have
    /// the missing data.
    async fn trigger_urgent_sync(&self, peer_hint: Option<NodeId>, reason: &str);
}

/// Port: routing-table distance queries.
pub trait AggregatorRouting: Send + Sync {
    /// This node's id.
    fn local_node_id(&self) -> NodeId;

    /// Nodes closest to `key` by XOR distance, closest first. May include
    /// the local node.
    fn closest_nodes(&self, key: &Hash, count: usize) -> Vec<NodeId>;
}

/// Port: unary candidate-submission RPC toward a peer aggregator.
#[async_trait]
pub trait CandidateChannel: Send + Sync {
    /// Whether the peer speaks the aggregation submission protocol.
    async fn supports_aggregation(&self, target: &NodeId) -> Result<bool>;

    /// Deliver a candidate to a peer aggregator. Carries the local chain
    /// identity; the callee aborts on mismatch.
    async fn forward_candidate(&self, target: &NodeId, candidate: &CandidateBlock) -> Result<()>;
}

/// Port: gossip publishing on the consensus-result topic.
#[async_trait]
pub trait ConsensusGossip: Send + Sync {
    /// Broadcast the finalized block together with its distance proof.
    async fn broadcast_finalized(&self, block: &Block, proof: &DistanceProof) -> Result<()>;
}

/// Port: hand a finalized block to the chain.
#[async_trait]
pub trait ChainApply: Send + Sync {
    /// Apply a finalized block locally. The same hook runs on aggregator
    /// and non-aggregator nodes.
    async fn apply_block(&self, block: &Block) -> Result<()>;
}

/// Port: the external candidate pool.
///
/// The pool is cleared wholesale when a round completes; candidates carry no
/// individual "processed" markers.
#[async_trait]
pub trait CandidatePool: Send + Sync {
    /// Drop every pooled candidate for `height`.
    async fn clear_height(&self, height: u64);
}
