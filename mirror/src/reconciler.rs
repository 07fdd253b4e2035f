// Copyright (c) Circle Ledger Contributors
// SPDX-License-Identifier: Apache-2.0

//! State reconciler.
//!
//! Heals projection drift independently of the event stream by reading
//! canonical chain state, and periodically reprocesses any block gap
//! between the sync checkpoint and the chain head. The checkpoint only
//! advances after the gap's events have actually been re-applied.

use crate::chain_client::{EventScope, LedgerChainClient};
use crate::error::{MirrorError, MirrorResult};
use crate::health::SyncState;
use crate::ingester::ChainEventIngester;
use crate::metrics::MirrorMetrics;
use crate::store::ActivityProjectionStore;
use crate::types::{normalize_address, GroupProjection};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// Interval of the periodic gap check
    pub interval: Duration,
    /// Maximum blocks re-fetched per chunk while closing a gap
    pub max_block_range: u64,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            max_block_range: 500,
        }
    }
}

/// Outcome of a full resync pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResyncReport {
    pub synced: usize,
    pub failed: usize,
}

pub struct StateReconciler {
    client: Arc<dyn LedgerChainClient>,
    store: Arc<ActivityProjectionStore>,
    ingester: Arc<ChainEventIngester>,
    state: Arc<SyncState>,
    config: ReconcilerConfig,
    /// Per-group serialization: no two reconciliation passes may touch
    /// the same projection concurrently
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    metrics: Option<Arc<MirrorMetrics>>,
}

impl StateReconciler {
    pub fn new(
        client: Arc<dyn LedgerChainClient>,
        store: Arc<ActivityProjectionStore>,
        ingester: Arc<ChainEventIngester>,
        state: Arc<SyncState>,
        config: ReconcilerConfig,
    ) -> Self {
        Self {
            client,
            store,
            ingester,
            state,
            config,
            locks: Mutex::new(HashMap::new()),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<MirrorMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    async fn lock_for(&self, address: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(address.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Re-derive one group's projection from canonical chain state.
    ///
    /// `GroupNotFound` is the not-found signal for addresses the factory
    /// does not know.
    pub async fn resync_one(&self, address: &str) -> MirrorResult<GroupProjection> {
        let address = normalize_address(address);
        let lock = self.lock_for(&address).await;
        let _guard = lock.lock().await;

        let canonical = self
            .client
            .get_group_state(&address)
            .await?
            .ok_or_else(|| MirrorError::GroupNotFound(address.clone()))?;

        let projection = self.store.apply_canonical_state(&canonical).await;
        self.state.record_resync();
        if let Some(ref m) = self.metrics {
            m.resync_groups_updated.inc();
        }
        debug!("[Reconciler] Resynced {}", address);
        Ok(projection)
    }

    /// Re-derive every known group's projection. Individual failures are
    /// counted and skipped; enumeration failure propagates.
    pub async fn resync_all(&self) -> MirrorResult<ResyncReport> {
        let addresses = self.client.list_group_addresses().await?;
        info!("[Reconciler] Full resync of {} groups", addresses.len());

        let mut report = ResyncReport::default();
        for address in addresses {
            match self.resync_one(&address).await {
                Ok(_) => report.synced += 1,
                Err(e) => {
                    warn!("[Reconciler] Resync failed for {}: {}", address, e);
                    report.failed += 1;
                }
            }
        }

        if let Some(ref m) = self.metrics {
            let outcome = if report.failed == 0 { "ok" } else { "partial" };
            m.resync_runs.with_label_values(&[outcome]).inc();
        }
        Ok(report)
    }

    /// Periodic task: close any gap between the checkpoint and the chain
    /// head, then keep ticking until cancelled.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        info!(
            "[Reconciler] Starting periodic gap check every {:?}",
            self.config.interval
        );
        let mut interval = time::interval(self.config.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("[Reconciler] Cancelled");
                    break;
                }
                _ = interval.tick() => {
                    match self.reconcile_gap().await {
                        Ok(0) => {}
                        Ok(blocks) => {
                            info!("[Reconciler] Reprocessed {} gap blocks", blocks);
                        }
                        Err(MirrorError::ChainUnavailable(msg)) => {
                            // Chain outage: degrade silently and retry on
                            // the next tick
                            debug!("[Reconciler] Chain unavailable, deferring: {}", msg);
                        }
                        Err(e) => {
                            warn!("[Reconciler] Gap check failed: {}", e);
                            if let Some(ref m) = self.metrics {
                                m.sync_errors.with_label_values(&["reconciler"]).inc();
                            }
                        }
                    }
                }
            }
        }
    }

    /// Compare the checkpoint to the chain head and reprocess the gap.
    ///
    /// The checkpoint advances only after the chunk's events have been
    /// re-applied; skipping the range and advancing anyway would silently
    /// lose events.
    pub async fn reconcile_gap(&self) -> MirrorResult<u64> {
        let head = self.client.get_latest_block().await?;
        self.state.set_chain_head(head);
        let checkpoint = self.state.last_processed_block();

        if head <= checkpoint {
            return Ok(0);
        }

        let mut cursor = checkpoint + 1;
        let mut reprocessed = 0u64;
        while cursor <= head {
            let end = std::cmp::min(cursor + self.config.max_block_range - 1, head);
            for scope in [EventScope::Factory, EventScope::Groups] {
                let events = self.client.get_events_in_range(scope, cursor, end).await?;
                for event in &events {
                    // Deterministic ids make replays no-op upserts, so
                    // re-applying already-seen events is safe
                    let _ = self.ingester.ingest_event(event).await;
                }
            }
            self.state.set_last_processed_block(end);
            reprocessed += end - cursor + 1;
            cursor = end + 1;
        }

        if let Some(ref m) = self.metrics {
            m.gap_blocks_reprocessed.inc_by(reprocessed);
            m.last_processed_block.set(head as i64);
        }
        Ok(reprocessed)
    }
}
