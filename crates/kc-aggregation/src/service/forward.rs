//! Candidate forwarding toward the elected aggregator.
//!
//! Per-target retry with exponential backoff; protocol-incompatible peers
//! are skipped up to a configured count; unhealthy peers are not attempted
//! at all. When backup nodes are enabled the next-closest nodes after the
//! elected one are tried in distance order.

use crate::domain::backoff::backoff_delay;
use crate::error::{AggregationError, Result};
use crate::metrics;
use crate::service::{AggregatorService, RoundOutcome};
use shared_types::{CandidateBlock, Hash, NodeId};
use std::time::Duration;
use tracing::{debug, info, warn};

impl AggregatorService {
    /// Forward one candidate to the elected aggregator (or its backups).
    pub(super) async fn forward_round(
        &self,
        height: u64,
        _key: &Hash,
        candidate: &CandidateBlock,
        ranked: Vec<NodeId>,
    ) -> Result<RoundOutcome> {
        let local = self.routing.local_node_id();
        let targets: Vec<NodeId> = ranked.into_iter().filter(|n| *n != local).collect();
        if targets.is_empty() {
            return Err(AggregationError::NoHealthyAggregator(height));
        }

        let forward = &self.config.forward;
        let base = Duration::from_millis(forward.retry_backoff_base);
        let max_backoff = Duration::from_millis(forward.retry_backoff_max);

        let mut retries_used: u32 = 0;
        let mut protocol_skips: u32 = 0;
        let mut attempted_any = false;

        for target in &targets {
            if !self.health.lock().is_healthy(target, self.clock.now()) {
                debug!(
                    "[kc-aggregation] skipping unhealthy aggregator {} for height {}",
                    target, height
                );
                continue;
            }

            match self.channel.supports_aggregation(target).await {
                Ok(true) => {}
                Ok(false) => {
                    protocol_skips += 1;
                    debug!(
                        "[kc-aggregation] peer {} lacks aggregation protocol ({}/{})",
                        target, protocol_skips, forward.max_protocol_retries
                    );
                    if protocol_skips > forward.max_protocol_retries {
                        break;
                    }
                    continue;
                }
                Err(err) => {
                    self.health.lock().record_failure(target, self.clock.now());
                    debug!(
                        "[kc-aggregation] protocol probe failed for {}: {}",
                        target, err
                    );
                    continue;
                }
            }

            attempted_any = true;
            for attempt in 0..=forward.max_retries {
                let call_timeout = forward.call_timeout_for(attempt);
                let result = tokio::time::timeout(
                    call_timeout,
                    self.channel.forward_candidate(target, candidate),
                )
                .await;

                match result {
                    Ok(Ok(())) => {
                        self.health.lock().record_success(target, self.clock.now());
                        metrics::record_round_forwarded();
                        info!(
                            "[kc-aggregation] forwarded candidate for height {} to {}",
                            height, target
                        );
                        return Ok(RoundOutcome::Forwarded { target: *target });
                    }
                    Ok(Err(err)) => {
                        retries_used += 1;
                        self.health.lock().record_failure(target, self.clock.now());
                        warn!(
                            "[kc-aggregation] forward to {} failed (attempt {}): {}",
                            target,
                            attempt + 1,
                            err
                        );
                    }
                    Err(_) => {
                        retries_used += 1;
                        self.health.lock().record_failure(target, self.clock.now());
                        warn!(
                            "[kc-aggregation] forward to {} timed out after {:?} (attempt {})",
                            target,
                            call_timeout,
                            attempt + 1
                        );
                    }
                }

                if attempt < forward.max_retries {
                    tokio::time::sleep(backoff_delay(
                        attempt,
                        base,
                        forward.retry_backoff_factor,
                        max_backoff,
                    ))
                    .await;
                }
            }
        }

        if !attempted_any {
            return Err(AggregationError::NoHealthyAggregator(height));
        }
        Err(AggregationError::ForwardFailed { retries_used })
    }
}
