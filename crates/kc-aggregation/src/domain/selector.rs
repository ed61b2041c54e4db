//! XOR-distance candidate selection.
//!
//! Every height has a deterministic 256-bit routing key. Candidates are
//! ranked by the XOR distance between their block hash and that key; the
//! smallest distance wins. Because the inputs are identical on every node,
//! every node that sees the same candidate set selects the same block.

use primitive_types::U256;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use shared_types::{CandidateBlock, Hash};

/// Domain-separation prefix for routing key derivation.
const ROUTING_KEY_DOMAIN: &[u8] = b"kestrel/aggregator/v1";

/// Deterministic routing key for a height:
/// `SHA-256(domain || height_be_bytes)`.
pub fn routing_key_for_height(height: u64) -> Hash {
    let mut hasher = Sha256::new();
    hasher.update(ROUTING_KEY_DOMAIN);
    hasher.update(height.to_be_bytes());
    hasher.finalize().into()
}

/// XOR distance between two 256-bit values, as an unsigned integer.
pub fn xor_distance(a: &Hash, b: &Hash) -> U256 {
    let mut xored = [0u8; 32];
    for (i, byte) in xored.iter_mut().enumerate() {
        *byte = a[i] ^ b[i];
    }
    U256::from_big_endian(&xored)
}

/// Audit record of one selection: enough for any peer to re-derive and
/// check the winner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistanceProof {
    /// Hash of the selected candidate.
    pub selected_hash: Hash,
    /// Routing key the distances were measured against.
    pub routing_key: Hash,
    /// Distance of the selected candidate.
    pub selected_distance: U256,
    /// Distance of the runner-up, if there was more than one candidate.
    pub runner_up_distance: Option<U256>,
}

/// Select the candidate XOR-closest to `routing_key`.
///
/// Ties on distance break by lexicographic block hash. Returns `None` for an
/// empty set. Pure function of `(candidates, routing_key)`.
pub fn select_candidate<'a>(
    candidates: &'a [CandidateBlock],
    routing_key: &Hash,
) -> Option<(&'a CandidateBlock, DistanceProof)> {
    let mut ranked: Vec<(U256, &CandidateBlock)> = candidates
        .iter()
        .map(|c| (xor_distance(&c.block_hash, routing_key), c))
        .collect();
    ranked.sort_by(|(da, ca), (db, cb)| da.cmp(db).then_with(|| ca.block_hash.cmp(&cb.block_hash)));

    let (selected_distance, selected) = *ranked.first()?;
    let proof = DistanceProof {
        selected_hash: selected.block_hash,
        routing_key: *routing_key,
        selected_distance,
        runner_up_distance: ranked.get(1).map(|(d, _)| *d),
    };
    Some((selected, proof))
}
