//! Literal acceptance scenarios for the consensus core.
//!
//! Each test pins one externally observable behavior end to end, with
//! concrete numbers, against the real components.

#[cfg(test)]
mod tests {
    use crate::support::*;
    use async_trait::async_trait;
    use kc_aggregation::{
        select_candidate, xor_distance, AggregationError, CandidateValidator, ValidationConfig,
    };
    use kc_consensus_rules::ConsensusParams;
    use kc_mining::ports::{HelloResponse, HelloService};
    use kc_mining::{
        ConfirmationWatchers, MinerConfig, QuorumGate, QuorumState, SuggestedAction,
        HeightGate, WatchStatus, WatcherDependencies,
    };
    use primitive_types::U256;
    use shared_types::{
        Block, BlockHeader, CandidateBlock, Hash, ManualTimeSource, NodeId, TimeSource, Transaction,
    };
    use std::collections::HashMap;
    use std::sync::Arc;

    /// Hello service with fixed per-peer heights, independent of the chain.
    struct FixedHello {
        chain_id: String,
        heights: HashMap<NodeId, u64>,
    }

    #[async_trait]
    impl HelloService for FixedHello {
        async fn hello_v2(&self, peer: &NodeId) -> kc_mining::Result<HelloResponse> {
            match self.heights.get(peer) {
                Some(height) => Ok(HelloResponse {
                    chain_id: self.chain_id.clone(),
                    tip_height: *height,
                }),
                None => Err(kc_mining::MiningError::QueryFailed("unreachable".into())),
            }
        }
    }

    fn validator_over(
        chain: Arc<TestChain>,
        clock: Arc<ManualTimeSource>,
        min_interval: u64,
    ) -> CandidateValidator {
        CandidateValidator::new(
            chain,
            Arc::new(AcceptingPow),
            Arc::new(RecordingSync::default()),
            clock as Arc<dyn TimeSource>,
            ConsensusParams {
                min_block_interval_s: min_interval,
                ..Default::default()
            },
            ValidationConfig::default(),
        )
    }

    /// Re-point the tip of a test chain at height 10 to a chosen timestamp.
    fn repoint_tip(chain: &TestChain, timestamp: u64) -> Hash {
        let header = BlockHeader {
            version: 1,
            height: 10,
            parent_hash: [0x0A; 32],
            merkle_root: [0x01; 32],
            state_root: [0x02; 32],
            timestamp,
            difficulty: 1_000,
            nonce: [0x03; 8],
        };
        let hash = test_block_hash(&header);
        chain.apply(header, hash);
        hash
    }

    fn tip_child(parent_hash: Hash, timestamp: u64) -> CandidateBlock {
        let header = BlockHeader {
            version: 1,
            height: 11,
            parent_hash,
            merkle_root: [0x21; 32],
            state_root: [0x22; 32],
            timestamp,
            difficulty: 1_200,
            nonce: [0x5A; 8],
        };
        let block_hash = test_block_hash(&header);
        CandidateBlock {
            block: Block {
                header,
                transactions: vec![Transaction {
                    tx_hash: [0x31; 32],
                    raw: vec![0u8; 16],
                }],
            },
            block_hash,
            height: 11,
            produced_at: timestamp,
            received_at: timestamp,
            source: peer_id(0x66),
        }
    }

    /// Scenario: parent at `now - 120`, 30-second minimum interval, child
    /// dated 29 seconds after the parent. Rejected with both timestamps in
    /// the error.
    #[tokio::test]
    async fn scenario_min_interval_reject_at_tip_plus_one() {
        let clock = Arc::new(ManualTimeSource::new(TEST_NOW));
        let chain = Arc::new(TestChain::new(10));
        let parent_ts = TEST_NOW - 120;
        let tip_hash = repoint_tip(&chain, parent_ts);
        let validator = validator_over(chain, clock, 30);

        let err = validator
            .validate(&tip_child(tip_hash, parent_ts + 29))
            .await
            .unwrap_err();
        match err {
            AggregationError::MinIntervalViolation {
                parent_ts: p,
                candidate_ts: c,
                min_interval,
            } => {
                assert_eq!(p, TEST_NOW - 120);
                assert_eq!(c, TEST_NOW - 91);
                assert_eq!(min_interval, 30);
            }
            other => panic!("expected MinIntervalViolation, got {other:?}"),
        }
    }

    /// Scenario: same parent, child dated exactly at the boundary. Passes.
    #[tokio::test]
    async fn scenario_min_interval_allow_at_boundary() {
        let clock = Arc::new(ManualTimeSource::new(TEST_NOW));
        let chain = Arc::new(TestChain::new(10));
        let parent_ts = TEST_NOW - 120;
        let tip_hash = repoint_tip(&chain, parent_ts);
        let validator = validator_over(chain, clock, 30);

        validator
            .validate(&tip_child(tip_hash, parent_ts + 30))
            .await
            .unwrap();
    }

    /// Scenario: isolated node with single-node mining enabled. After the
    /// discovery timeout the gate allows mining in test mode.
    #[tokio::test]
    async fn scenario_isolated_single_node_allowed() {
        let config = MinerConfig {
            min_network_quorum_total: 2,
            allow_single_node_mining: true,
            network_discovery_timeout_seconds: 120,
            ..Default::default()
        };
        let clock = Arc::new(ManualTimeSource::new(TEST_NOW));
        let chain = Arc::new(TestChain::new(10));
        let gate = QuorumGate::new(
            chain,
            Arc::new(StaticPeers { connected: vec![] }),
            Arc::new(FixedHello {
                chain_id: config.chain_id.clone(),
                heights: HashMap::new(),
            }),
            clock.clone(),
            config,
        );

        clock.advance(121);
        let result = gate.check().await;
        assert_eq!(result.state, QuorumState::Isolated);
        assert!(result.allow_mining);
        assert!(result.reason.contains("single-node"));
        assert_eq!(result.suggested_action, SuggestedAction::SingleNodeWarning);
    }

    /// Scenario: local height 1000 against peers at 500/510/520. Within
    /// the recovery grace the gate waits on sync; 31 minutes later it
    /// degrades to mining with a manual-check demand.
    #[tokio::test]
    async fn scenario_height_conflict_with_degradation() {
        let config = MinerConfig {
            max_height_skew: 5,
            quorum_recovery_timeout_seconds: 60,
            ..Default::default()
        };
        let clock = Arc::new(ManualTimeSource::new(TEST_NOW));
        let chain = Arc::new(TestChain::new(1_000));
        let peers = vec![peer_id(0x21), peer_id(0x22), peer_id(0x23)];
        let heights: HashMap<NodeId, u64> = peers
            .iter()
            .zip([500u64, 510, 520])
            .map(|(p, h)| (*p, h))
            .collect();
        let gate = QuorumGate::new(
            chain,
            Arc::new(StaticPeers { connected: peers }),
            Arc::new(FixedHello {
                chain_id: config.chain_id.clone(),
                heights,
            }),
            clock.clone(),
            config,
        );

        let first = gate.check().await;
        assert_eq!(first.state, QuorumState::QuorumReached);
        assert!(!first.allow_mining);
        assert_eq!(first.suggested_action, SuggestedAction::Sync);
        assert_eq!(first.metrics.median_peer_height, 510);
        assert_eq!(first.metrics.height_skew, 490);

        clock.advance(31 * 60);
        let degraded = gate.check().await;
        assert_eq!(degraded.state, QuorumState::HeightAligned);
        assert!(degraded.allow_mining);
        assert_eq!(
            degraded.suggested_action,
            SuggestedAction::ManualCheckRequired
        );
    }

    /// Scenario: hashes ...01/...02/...03 against routing key ...02 give
    /// distances 3/0/1; every node picks ...02.
    #[test]
    fn scenario_xor_selection_determinism() {
        fn ending(last: u8) -> Hash {
            let mut h = [0u8; 32];
            h[31] = last;
            h
        }
        fn with_hash(block_hash: Hash) -> CandidateBlock {
            let mut c = tip_child([0u8; 32], TEST_NOW);
            c.block_hash = block_hash;
            c
        }

        let key = ending(0x02);
        let candidates = vec![
            with_hash(ending(0x01)),
            with_hash(ending(0x02)),
            with_hash(ending(0x03)),
        ];
        assert_eq!(xor_distance(&ending(0x01), &key), U256::from(3u32));
        assert_eq!(xor_distance(&ending(0x02), &key), U256::zero());
        assert_eq!(xor_distance(&ending(0x03), &key), U256::from(1u32));

        let (selected, proof) = select_candidate(&candidates, &key).unwrap();
        assert_eq!(selected.block_hash, ending(0x02));
        assert_eq!(proof.selected_distance, U256::zero());

        // Same set in any order selects the same block.
        let mut reversed = candidates;
        reversed.reverse();
        let (again, _) = select_candidate(&reversed, &key).unwrap();
        assert_eq!(again.block_hash, ending(0x02));
    }

    /// Scenario: two submissions for height 100 inside the resubmit
    /// interval leave exactly one watcher running with submits == 2.
    #[tokio::test(start_paused = true)]
    async fn scenario_confirmation_watcher_dedup() {
        let config = MinerConfig {
            confirmation_resubmit_min_interval: 10,
            ..Default::default()
        };
        let clock = Arc::new(ManualTimeSource::new(TEST_NOW));
        let chain = Arc::new(TestChain::new(50));
        let sync = Arc::new(RecordingSync::default());
        let height_gate = Arc::new(HeightGate::new(config.max_fork_depth));
        let watchers = ConfirmationWatchers::new(
            WatcherDependencies {
                chain,
                sync,
                clock,
                height_gate,
                aggregation: None,
                network: None,
            },
            config,
        );

        assert_eq!(watchers.start_watch(100), WatchStatus::Started);
        assert_eq!(
            watchers.start_watch(100),
            WatchStatus::Resubmitted { submits: 2 }
        );
        assert_eq!(watchers.submits(100), Some(2));
        assert_eq!(watchers.active_heights(), vec![100]);
    }
}
