// Copyright (c) Circle Ledger Contributors
// SPDX-License-Identifier: Apache-2.0

//! Node assembly and lifecycle.
//!
//! Wires the syncer, ingester, reconciler, proposal coordinator, and
//! health monitor together, spawns the background tasks, and tears all
//! of them down on shutdown.

use crate::chain_client::{EventScope, LedgerChainClient};
use crate::chain_syncer::{LedgerChainSyncer, LedgerSyncerConfig};
use crate::config::MirrorNodeConfig;
use crate::error::{MirrorError, MirrorResult};
use crate::health::{SyncHealthMonitor, SyncState};
use crate::ingester::ChainEventIngester;
use crate::metrics::MirrorMetrics;
use crate::notify::NotificationSender;
use crate::proposals::{ProposalCoordinator, ResilientProposalClient, ShadowProposalStore};
use crate::reconciler::{ReconcilerConfig, StateReconciler};
use crate::store::ActivityProjectionStore;
use prometheus::Registry;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub struct MirrorNode {
    store: Arc<ActivityProjectionStore>,
    health: Arc<SyncHealthMonitor>,
    proposals: Arc<ResilientProposalClient>,
    coordinator: Arc<ProposalCoordinator>,
    metrics: Arc<MirrorMetrics>,
    cancel: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

impl MirrorNode {
    /// Build and start a node against the given chain client.
    pub async fn start(
        config: MirrorNodeConfig,
        client: Arc<dyn LedgerChainClient>,
        notifier: Arc<dyn NotificationSender>,
    ) -> MirrorResult<Self> {
        config.validate().map_err(MirrorError::InternalError)?;
        info!("[Node] Starting mirror node for {}", config.chain_name);

        let registry = Registry::new();
        let metrics = Arc::new(MirrorMetrics::new(&registry));
        let cancel = CancellationToken::new();

        let store = Arc::new(ActivityProjectionStore::new());
        let state = Arc::new(SyncState::new());

        let ingester = Arc::new(
            ChainEventIngester::new(store.clone(), state.clone())
                .with_event_timeout(config.event_timeout())
                .with_metrics(metrics.clone()),
        );

        let syncer_config = LedgerSyncerConfig::new(&config.chain_name)
            .with_scope(EventScope::Factory, config.factory_start_block)
            .with_scope(EventScope::Groups, config.groups_start_block)
            .with_max_block_range(config.max_block_range)
            .with_head_refresh_interval(config.head_refresh_interval());
        let syncer = LedgerChainSyncer::new(syncer_config, client.clone())?
            .with_metrics(metrics.clone());
        let (mut handles, event_rx) = syncer.run(cancel.clone()).await?;

        handles.push(tokio::spawn(
            ingester.clone().run(event_rx, cancel.clone()),
        ));

        let reconciler = Arc::new(
            StateReconciler::new(
                client.clone(),
                store.clone(),
                ingester.clone(),
                state.clone(),
                ReconcilerConfig {
                    interval: config.resync_interval(),
                    max_block_range: config.max_block_range,
                },
            )
            .with_metrics(metrics.clone()),
        );
        handles.push(tokio::spawn(reconciler.clone().run(cancel.clone())));

        let health = Arc::new(SyncHealthMonitor::new(
            state.clone(),
            store.clone(),
            reconciler.clone(),
        ));

        let coordinator = Arc::new(
            ProposalCoordinator::new(notifier)
                .with_default_threshold(config.default_signature_threshold)
                .with_metrics(metrics.clone()),
        );
        let shadow = Arc::new(ShadowProposalStore::in_memory());
        let proposals = Arc::new(
            ResilientProposalClient::new(coordinator.clone(), shadow)
                .with_timeout(config.proposal_timeout())
                .with_metrics(metrics.clone()),
        );

        Ok(Self {
            store,
            health,
            proposals,
            coordinator,
            metrics,
            cancel,
            handles,
        })
    }

    pub fn store(&self) -> Arc<ActivityProjectionStore> {
        self.store.clone()
    }

    pub fn health(&self) -> Arc<SyncHealthMonitor> {
        self.health.clone()
    }

    pub fn proposals(&self) -> Arc<ResilientProposalClient> {
        self.proposals.clone()
    }

    pub fn coordinator(&self) -> Arc<ProposalCoordinator> {
        self.coordinator.clone()
    }

    pub fn metrics(&self) -> Arc<MirrorMetrics> {
        self.metrics.clone()
    }

    /// Cancel every background task and wait for them to finish.
    pub async fn shutdown(self) {
        info!("[Node] Shutting down");
        self.cancel.cancel();
        for handle in self.handles {
            let _ = handle.await;
        }
        info!("[Node] Shutdown complete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock_chain_client::MockLedgerClient;
    use crate::notify::NoopNotifier;
    use crate::types::{EventEnvelope, LedgerEvent, PrivacyTier, ProposalStatus};
    use std::time::Duration;

    fn test_config() -> MirrorNodeConfig {
        MirrorNodeConfig {
            head_refresh_interval_ms: 20,
            resync_interval_secs: 1,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_node_end_to_end_sync_and_proposals() {
        let client = Arc::new(MockLedgerClient::new());
        client.set_head(2).await;
        client
            .push_event(
                EventScope::Factory,
                LedgerEvent::GroupCreated {
                    envelope: EventEnvelope {
                        tx_hash: "0xcreate".to_string(),
                        log_index: 0,
                        block_number: 1,
                        timestamp_ms: 1_000,
                    },
                    group_address: "0xg1".to_string(),
                    name: "trip".to_string(),
                    creator: "0xalice".to_string(),
                },
            )
            .await;
        client
            .push_event(
                EventScope::Groups,
                LedgerEvent::ExpenseRecorded {
                    envelope: EventEnvelope {
                        tx_hash: "0xexp".to_string(),
                        log_index: 0,
                        block_number: 2,
                        timestamp_ms: 2_000,
                    },
                    group_address: "0xg1".to_string(),
                    payer: "0xalice".to_string(),
                    amount: "30.00".to_string(),
                    currency: "USD".to_string(),
                    description: "fuel".to_string(),
                },
            )
            .await;

        let node = MirrorNode::start(test_config(), client, Arc::new(NoopNotifier))
            .await
            .unwrap();

        // Wait for the sync pipeline to land both events
        let store = node.store();
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while store.activity_count().await < 2 {
            assert!(
                tokio::time::Instant::now() < deadline,
                "sync did not complete in time"
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let group = store.get_group("0xg1").await.unwrap();
        assert_eq!(group.name, "trip");
        assert_eq!(group.total_expenses, "30.00");

        let page = store
            .query_by_group("0xg1", PrivacyTier::admin(), &Default::default())
            .await;
        assert_eq!(page.total, 2);

        // Proposal flow through the resilient client
        let proposals = node.proposals();
        let p = proposals
            .create("0xg1", "0xalice", "0xdest", "10.00", "refund")
            .await
            .unwrap();
        proposals.sign(&p.id, "0xalice").await.unwrap();
        let approved = proposals.sign(&p.id, "0xbob").await.unwrap();
        assert_eq!(approved.status, ProposalStatus::Approved);

        let report = node.health().report().await;
        assert_eq!(report.group_count, 1);
        assert!(report.chain_head >= 2);

        node.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_stops_all_tasks() {
        let client = Arc::new(MockLedgerClient::new());
        client.set_head(0).await;
        let node = MirrorNode::start(test_config(), client, Arc::new(NoopNotifier))
            .await
            .unwrap();

        // Must return promptly; hanging tasks would make this time out
        tokio::time::timeout(Duration::from_secs(5), node.shutdown())
            .await
            .expect("shutdown timed out");
    }

    #[tokio::test]
    async fn test_start_rejects_invalid_config() {
        let client = Arc::new(MockLedgerClient::new());
        let mut config = test_config();
        config.max_block_range = 0;
        let result = MirrorNode::start(config, client, Arc::new(NoopNotifier)).await;
        assert!(result.is_err());
    }
}
