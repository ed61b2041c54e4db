//! # Core Chain Entities
//!
//! The block, candidate, and chain-info types exchanged between the miner,
//! the aggregator, and their external collaborators.
//!
//! ## Clusters
//!
//! - **Chain**: [`BlockHeader`], [`Block`], [`Transaction`]
//! - **Aggregation**: [`CandidateBlock`]
//! - **Queries**: [`ChainInfo`], [`ChainStatus`]
//! - **Networking**: [`NodeId`]

use serde::{Deserialize, Serialize};

/// A 32-byte hash (SHA-256).
pub type Hash = [u8; 32];

/// Unique identifier for a node in the network.
///
/// Node ids live in the same 256-bit space as block hashes and routing keys,
/// so XOR distance is defined between any pair of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub [u8; 32]);

impl NodeId {
    /// Short hex form for log lines.
    pub fn short(&self) -> String {
        hex::encode(&self.0[..6])
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.short())
    }
}

/// The header of a block. Immutable once mined.
///
/// The block hash is SHA-256 over the deterministic serialization of this
/// header; hashing itself is performed by the external hash service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    /// Protocol version for this block.
    pub version: u32,
    /// Block height in the chain.
    pub height: u64,
    /// Hash of the parent block.
    pub parent_hash: Hash,
    /// Merkle root of all transactions in the block.
    pub merkle_root: Hash,
    /// Root hash of the state trie after applying this block.
    pub state_root: Hash,
    /// Unix timestamp (seconds) when the block was produced.
    pub timestamp: u64,
    /// Difficulty the block was mined at. Higher is harder.
    pub difficulty: u64,
    /// Proof-of-work nonce.
    pub nonce: [u8; 8],
}

impl BlockHeader {
    /// Whether this is the genesis header.
    pub fn is_genesis(&self) -> bool {
        self.height == 0
    }
}

/// A transaction carried by a block.
///
/// The consensus core treats transactions as opaque: construction (including
/// fee-paying and incentive transactions) happens in the external builder,
/// and per-transaction validation happens outside this workspace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Hash of the transaction for indexing and dedup.
    pub tx_hash: Hash,
    /// Canonical serialized transaction bytes.
    pub raw: Vec<u8>,
}

/// A block: header plus ordered transaction list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// The block header.
    pub header: BlockHeader,
    /// Ordered transactions, incentive transaction first.
    pub transactions: Vec<Transaction>,
}

impl Block {
    /// Canonical serialized length in bytes, used by the block-size quality
    /// filter.
    pub fn serialized_size(&self) -> usize {
        bincode::serialized_size(self).map(|n| n as usize).unwrap_or(usize::MAX)
    }
}

/// A fully-mined block submitted by a miner for aggregation at one height.
///
/// Candidates exist only inside a collection window: they are created at
/// produce time and destroyed when the window closes or the candidate pool
/// for the height is cleared.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateBlock {
    /// The mined block.
    pub block: Block,
    /// Hash of the mined block (32 bytes, computed by the hash service).
    pub block_hash: Hash,
    /// Height the candidate competes at. Must equal `block.header.height`.
    pub height: u64,
    /// Unix timestamp (seconds) the producing miner finished the block.
    pub produced_at: u64,
    /// Unix timestamp (seconds) this node received the candidate.
    pub received_at: u64,
    /// The peer that produced the candidate.
    pub source: NodeId,
}

impl CandidateBlock {
    /// Delay between production and local receipt, in seconds.
    /// Zero when clocks disagree.
    pub fn receive_delay_secs(&self) -> u64 {
        self.received_at.saturating_sub(self.produced_at)
    }
}

/// Coarse readiness of the local chain store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChainStatus {
    /// Chain is readable and up to date as far as the node knows.
    Ready,
    /// A sync is in progress.
    Syncing,
    /// The store is reachable but reported an internal problem.
    Degraded,
}

impl std::fmt::Display for ChainStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChainStatus::Ready => write!(f, "ready"),
            ChainStatus::Syncing => write!(f, "syncing"),
            ChainStatus::Degraded => write!(f, "degraded"),
        }
    }
}

/// Snapshot of the local chain tip, as reported by the external query
/// service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainInfo {
    /// Local best height.
    pub height: u64,
    /// Hash of the local best block.
    pub best_block_hash: Hash,
    /// Whether the chain store is ready to serve reads.
    pub is_ready: bool,
    /// Coarse store status.
    pub status: ChainStatus,
}
