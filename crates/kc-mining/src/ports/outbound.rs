//! Outbound ports (driven side).
//!
//! The miner's external collaborators: chain reads, candidate building,
//! PoW compute, sync, peer probes, and the aggregator entry point. All are
//! consumed behind `Arc<dyn …>`.

use crate::config::TxSelectionMode;
use crate::error::Result;
use async_trait::async_trait;
use shared_types::{Block, BlockHeader, CandidateBlock, ChainInfo, Hash, NodeId};

/// Port: read the local chain.
#[async_trait]
pub trait ChainQuery: Send + Sync {
    /// Snapshot of the local tip.
    async fn chain_info(&self) -> Result<ChainInfo>;

    /// Header at a height, if present.
    async fn header_by_height(&self, height: u64) -> Result<Option<BlockHeader>>;

    /// Timestamps of the most recent `count` blocks, oldest first.
    async fn recent_timestamps(&self, count: usize) -> Result<Vec<u64>>;
}

/// Everything the external builder needs to assemble one candidate.
#[derive(Debug, Clone)]
pub struct CandidateRequest {
    /// Height the candidate will compete at.
    pub height: u64,
    /// Parent block hash.
    pub parent_hash: Hash,
    /// Difficulty to commit in the header.
    pub difficulty: u64,
    /// Earliest timestamp the header may carry.
    pub earliest_timestamp: u64,
    /// Transaction count bounds.
    pub max_transactions: usize,
    /// Minimum transactions (the incentive transaction counts).
    pub min_transactions: usize,
    /// Selection policy.
    pub selection_mode: TxSelectionMode,
}

/// Port: candidate assembly (transaction selection, incentive transaction,
/// merkle root). External subsystem; the orchestrator only consumes it.
#[async_trait]
pub trait BlockBuilder: Send + Sync {
    /// Build an unmined candidate block.
    async fn build_candidate(&self, request: CandidateRequest) -> Result<Block>;

    /// Set the beneficiary address for future candidates.
    fn set_miner_address(&self, address: &[u8]);
}

/// Port: fee and incentive construction.
#[async_trait]
pub trait IncentiveCollector: Send + Sync {
    /// Set the beneficiary address for future incentive transactions.
    fn set_miner_address(&self, address: &[u8]);
}

/// A block that has been mined: the sealed block plus its hash.
#[derive(Debug, Clone)]
pub struct MinedBlock {
    /// The sealed block (nonce filled in).
    pub block: Block,
    /// Hash of the sealed block.
    pub block_hash: Hash,
}

/// Port: proof-of-work compute kernel.
///
/// `mine` has no internal timeout; cancellation is external — the caller
/// drops the future when the round is cancelled or superseded.
#[async_trait]
pub trait PowEngine: Send + Sync {
    /// Search for a nonce satisfying the difficulty committed in the
    /// candidate's header.
    async fn mine(&self, candidate: Block) -> Result<MinedBlock>;
}

/// Result of a sync-state probe.
#[derive(Debug, Clone, Copy)]
pub struct SyncCheck {
    /// Local best height.
    pub local_height: u64,
    /// Best height observed across the network.
    pub network_height: u64,
    /// Whether a sync is already running.
    pub syncing: bool,
}

/// Port: the sync engine. The core only ever triggers and inspects.
#[async_trait]
pub trait SyncService: Send + Sync {
    /// Request a sync run.
    async fn trigger_sync(&self, reason: &str) -> Result<()>;

    /// Compare local and network heights.
    async fn check_sync(&self) -> Result<SyncCheck>;
}

/// Port: peer visibility from the routing table and network host.
pub trait PeerDirectory: Send + Sync {
    /// This node's id.
    fn local_node_id(&self) -> NodeId;

    /// Peers known to discovery (not necessarily connected).
    fn discovered_peers(&self) -> Vec<NodeId>;

    /// Currently connected peers.
    fn connected_peers(&self) -> Vec<NodeId>;
}

/// Response to a hello-v2 probe.
#[derive(Debug, Clone)]
pub struct HelloResponse {
    /// The peer's chain identity.
    pub chain_id: String,
    /// The peer's best height.
    pub tip_height: u64,
}

/// Port: the hello-v2 RPC used by the quorum gate.
#[async_trait]
pub trait HelloService: Send + Sync {
    /// Ask a peer for its chain identity and tip height.
    async fn hello_v2(&self, peer: &NodeId) -> Result<HelloResponse>;
}

/// Port: the single submission path for mined blocks. Implemented by the
/// aggregation engine; every mined block goes through here whether or not
/// the local node is the elected aggregator.
#[async_trait]
pub trait RoundSubmitter: Send + Sync {
    /// Hand a mined candidate to the aggregation state machine.
    async fn submit_round(&self, candidate: CandidateBlock) -> Result<()>;
}

/// Snapshot of aggregation progress for the watcher diagnostic.
#[derive(Debug, Clone, Default)]
pub struct AggregationStatus {
    /// Whether a collection window is open for the height.
    pub window_active: bool,
    /// Candidates collected.
    pub collected: u64,
    /// Candidates validated.
    pub validated: u64,
    /// Candidates rejected.
    pub rejected: u64,
    /// Duplicate submissions.
    pub duplicates: u64,
    /// Window progress in [0, 1]. Operator display only.
    pub progress: f64,
    /// Mean candidate receive delay, seconds.
    pub mean_receive_delay_secs: u64,
}

/// Port: optional introspection into the aggregator, for diagnostics.
pub trait AggregationIntrospect: Send + Sync {
    /// Aggregation progress at a height, if a round is open locally.
    fn round_status(&self, height: u64) -> Option<AggregationStatus>;
}

/// Port: optional network introspection, for diagnostics.
pub trait NetworkIntrospect: Send + Sync {
    /// Peer count on the consensus-result topic.
    fn topic_peer_count(&self) -> usize;

    /// Registered protocol handler count.
    fn protocol_registration_count(&self) -> usize;
}

/// Port: optional re-check of fully-mined blocks before submission.
#[async_trait]
pub trait CompliancePolicy: Send + Sync {
    /// Validate a mined block against local policy.
    async fn validate_mined(&self, block: &Block) -> Result<()>;
}
