//! Full production round over in-memory collaborators:
//!
//! gate allows -> orchestrator builds and mines -> submission reaches the
//! aggregator -> local node is elected -> window collects -> selection ->
//! broadcast -> local apply advances the chain -> confirmation watcher sees
//! the height and advances the height gate.

#[cfg(test)]
mod tests {
    use crate::support::*;
    use kc_aggregation::{
        AggregatorConfig, AggregatorDependencies, AggregatorService, CandidateValidator,
        ValidationConfig,
    };
    use kc_consensus_rules::ConsensusParams;
    use kc_mining::{
        ConfirmationWatchers, MinerConfig, MinerController, MinerDependencies, MinerService,
        HeightGate, QuorumGate, WatcherDependencies,
    };
    use shared_types::{ManualTimeSource, TimeSource};
    use std::sync::Arc;
    use std::time::Duration;

    struct Node {
        controller: MinerController,
        chain: Arc<TestChain>,
        gossip: Arc<RecordingGossip>,
        pool: Arc<RecordingPool>,
        height_gate: Arc<HeightGate>,
    }

    fn build_node() -> Node {
        let params = ConsensusParams::default();
        let miner_config = MinerConfig {
            loop_interval: 1,
            confirmation_check_interval: 1,
            consensus: params.clone(),
            ..Default::default()
        };
        let aggregator_config = AggregatorConfig {
            collection_window_duration: 2,
            collection_timeout: 6,
            min_peer_threshold: 1,
            ..Default::default()
        };

        let clock: Arc<ManualTimeSource> = Arc::new(ManualTimeSource::new(TEST_NOW));
        let chain = Arc::new(TestChain::new(10));
        let sync = Arc::new(RecordingSync::default());
        let gossip = Arc::new(RecordingGossip::default());
        let pool = Arc::new(RecordingPool::default());

        // Aggregation side.
        let validator = Arc::new(CandidateValidator::new(
            chain.clone(),
            Arc::new(AcceptingPow),
            sync.clone(),
            clock.clone() as Arc<dyn TimeSource>,
            params,
            ValidationConfig::default(),
        ));
        let aggregator = AggregatorService::new(
            AggregatorDependencies {
                chain: chain.clone(),
                pow: Arc::new(AcceptingPow),
                sync: sync.clone(),
                routing: Arc::new(LocalFirstRouting { others: vec![] }),
                channel: Arc::new(UnreachableChannel),
                gossip: gossip.clone(),
                apply: Arc::new(FinalizingApply {
                    chain: chain.clone(),
                }),
                pool: pool.clone(),
                clock: clock.clone(),
            },
            aggregator_config,
            validator,
        );

        // Mining side.
        let peers = Arc::new(StaticPeers {
            connected: vec![peer_id(0x21)],
        });
        let hello = Arc::new(ChainFollowingHello {
            chain: chain.clone(),
            chain_id: miner_config.chain_id.clone(),
        });
        let gate = Arc::new(QuorumGate::new(
            chain.clone(),
            peers.clone(),
            hello,
            clock.clone(),
            miner_config.clone(),
        ));
        let height_gate = Arc::new(HeightGate::new(miner_config.max_fork_depth));
        let watchers = ConfirmationWatchers::new(
            WatcherDependencies {
                chain: chain.clone(),
                sync: sync.clone(),
                clock: clock.clone(),
                height_gate: height_gate.clone(),
                aggregation: Some(Arc::new(IntrospectAdapter {
                    aggregator: aggregator.clone(),
                })),
                network: None,
            },
            miner_config.clone(),
        );
        let service = Arc::new(MinerService::new(
            MinerDependencies {
                chain: chain.clone(),
                builder: Arc::new(TestBuilder),
                incentives: Arc::new(TestBuilder),
                engine: Arc::new(InstantEngine),
                submitter: Arc::new(SubmitAdapter {
                    aggregator: aggregator.clone(),
                }),
                peers,
                clock,
                compliance: None,
            },
            gate,
            height_gate.clone(),
            watchers,
            miner_config.clone(),
        ));

        Node {
            controller: MinerController::new(service, miner_config),
            chain,
            gossip,
            pool,
            height_gate,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_round_confirms_and_advances_height_gate() {
        let node = build_node();
        assert_eq!(node.chain.height(), 10);

        node.controller.start_mining(&[0xAB; 20]).await.unwrap();

        // One round: window (2s) + finalize + watcher check (1s cadence).
        tokio::time::sleep(Duration::from_secs(10)).await;
        node.controller.stop_mining().await.unwrap();

        // The chain advanced through the aggregator's apply hook.
        assert!(node.chain.height() >= 11, "chain should have advanced");

        // The finalized block was broadcast with its distance proof.
        let broadcasts = node.gossip.broadcasts.lock();
        assert!(!broadcasts.is_empty());
        let (height, proof) = &broadcasts[0];
        assert_eq!(*height, 11);
        assert_eq!(proof.routing_key, kc_aggregation::routing_key_for_height(11));
        drop(broadcasts);

        // The candidate pool was cleared for the finalized height.
        assert!(node.pool.cleared.lock().contains(&11));

        // The watcher confirmed on-chain arrival and advanced the gate.
        assert!(node.height_gate.get() >= 11);
    }

    #[tokio::test(start_paused = true)]
    async fn test_consecutive_heights_chain_together() {
        let node = build_node();
        node.controller.start_mining(&[0xAB; 20]).await.unwrap();

        // Long enough for several rounds (window 2s + slot waits).
        tokio::time::sleep(Duration::from_secs(40)).await;
        node.controller.stop_mining().await.unwrap();

        let final_height = node.chain.height();
        assert!(
            final_height >= 12,
            "expected at least two finalized blocks, tip is {final_height}"
        );
        // Every finalized height had its candidate pool cleared. A height
        // can clear more than once when a late round re-opens before the
        // watcher advances the height gate; never zero times.
        let cleared = node.pool.cleared.lock();
        for h in 11..=final_height {
            assert!(
                cleared.contains(&h),
                "height {h} should have been pool-cleared"
            );
        }
    }
}
