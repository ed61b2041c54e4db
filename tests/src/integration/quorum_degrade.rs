//! Interplay between the gate's defensive median fallback and the
//! long-conflict degrade rule.
//!
//! The `median == 0 -> use local height` fallback can mask a partition in
//! which peers genuinely sit at height zero; the 30-minute degrade rule is
//! the intended safety net for the conflicts the fallback does surface.
//! These tests pin both behaviors side by side.

#[cfg(test)]
mod tests {
    use crate::support::*;
    use async_trait::async_trait;
    use kc_mining::ports::{HelloResponse, HelloService};
    use kc_mining::{MinerConfig, QuorumGate, QuorumState, SuggestedAction};
    use parking_lot::Mutex;
    use shared_types::{ManualTimeSource, NodeId};
    use std::collections::HashMap;
    use std::sync::Arc;

    /// Hello service whose peer heights can be changed mid-test.
    struct MutableHello {
        chain_id: String,
        heights: Mutex<HashMap<NodeId, u64>>,
    }

    #[async_trait]
    impl HelloService for MutableHello {
        async fn hello_v2(&self, peer: &NodeId) -> kc_mining::Result<HelloResponse> {
            match self.heights.lock().get(peer) {
                Some(height) => Ok(HelloResponse {
                    chain_id: self.chain_id.clone(),
                    tip_height: *height,
                }),
                None => Err(kc_mining::MiningError::QueryFailed("unreachable".into())),
            }
        }
    }

    struct Fixture {
        gate: QuorumGate,
        hello: Arc<MutableHello>,
        clock: Arc<ManualTimeSource>,
    }

    fn fixture(local_height: u64, peer_heights: &[(u8, u64)], config: MinerConfig) -> Fixture {
        let clock = Arc::new(ManualTimeSource::new(TEST_NOW));
        let chain = Arc::new(TestChain::new(local_height));
        let peers: Vec<NodeId> = peer_heights.iter().map(|(b, _)| peer_id(*b)).collect();
        let hello = Arc::new(MutableHello {
            chain_id: config.chain_id.clone(),
            heights: Mutex::new(
                peer_heights
                    .iter()
                    .map(|(b, h)| (peer_id(*b), *h))
                    .collect(),
            ),
        });
        let gate = QuorumGate::new(
            chain,
            Arc::new(StaticPeers { connected: peers }),
            hello.clone(),
            clock.clone(),
            config,
        );
        Fixture { gate, hello, clock }
    }

    /// All peers at height zero on a non-empty local chain: the fallback
    /// treats the median as local, mining continues, and no degrade timer
    /// ever starts.
    #[tokio::test]
    async fn test_zero_median_fallback_allows_mining_without_degrade() {
        let fx = fixture(
            1_000,
            &[(0x21, 0), (0x22, 0), (0x23, 0)],
            MinerConfig::default(),
        );

        let first = fx.gate.check().await;
        assert_eq!(first.state, QuorumState::HeightAligned);
        assert!(first.allow_mining);
        assert_eq!(first.metrics.median_peer_height, 1_000);
        assert_eq!(first.suggested_action, SuggestedAction::None);

        // Even far in the future the verdict is identical: the fallback
        // path never arms the conflict clock.
        fx.clock.advance(60 * 60);
        let later = fx.gate.check().await;
        assert_eq!(later.state, QuorumState::HeightAligned);
        assert_eq!(later.suggested_action, SuggestedAction::None);
    }

    /// A real conflict (non-zero median) arms the conflict clock, and a
    /// later recovery to alignment disarms it: a second conflict restarts
    /// the 30-minute horizon rather than inheriting the old one.
    #[tokio::test]
    async fn test_recovered_conflict_restarts_degrade_horizon() {
        let config = MinerConfig {
            max_height_skew: 5,
            quorum_recovery_timeout_seconds: 0,
            ..Default::default()
        };
        let fx = fixture(1_000, &[(0x21, 500), (0x22, 500), (0x23, 500)], config);

        // Conflict arms the clock.
        let first = fx.gate.check().await;
        assert_eq!(first.state, QuorumState::HeightConflict);

        // 20 minutes in, peers recover to our height: aligned, clock
        // disarmed.
        fx.clock.advance(20 * 60);
        for (_, h) in fx.hello.heights.lock().iter_mut() {
            *h = 1_000;
        }
        assert_eq!(fx.gate.check().await.state, QuorumState::HeightAligned);

        // Peers diverge again. 20 more minutes is past the original
        // horizon but not the restarted one: still a hard conflict.
        for (_, h) in fx.hello.heights.lock().iter_mut() {
            *h = 500;
        }
        let renewed = fx.gate.check().await;
        assert_eq!(renewed.state, QuorumState::HeightConflict);

        fx.clock.advance(20 * 60);
        let still_conflict = fx.gate.check().await;
        assert_eq!(still_conflict.state, QuorumState::HeightConflict);

        // Only after a full 30 minutes of uninterrupted conflict does the
        // gate degrade.
        fx.clock.advance(11 * 60);
        let degraded = fx.gate.check().await;
        assert_eq!(degraded.state, QuorumState::HeightAligned);
        assert_eq!(
            degraded.suggested_action,
            SuggestedAction::ManualCheckRequired
        );
    }
}
