// Copyright (c) Circle Ledger Contributors
// SPDX-License-Identifier: Apache-2.0

//! Chain event ingester.
//!
//! Converts ledger events into activity records and projection updates,
//! exactly-once in effect: record ids derive from tx hash + log index,
//! so a redelivered event upserts as a no-op. One failing event never
//! terminates the consumer loop; the reconciler heals whatever the event
//! would have produced.

use crate::chain_syncer::SyncerEvent;
use crate::error::{MirrorError, MirrorResult};
use crate::health::SyncState;
use crate::metrics::MirrorMetrics;
use crate::store::{ActivityProjectionStore, ProjectionEffect};
use crate::types::{
    ActivityMetadata, ActivityRecord, ActivityType, LedgerEvent, PrivacyTier,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Upper bound on one event's processing time. A handler that exceeds it
/// is abandoned and the event left to reconciliation.
const DEFAULT_EVENT_TIMEOUT: Duration = Duration::from_secs(5);

pub struct ChainEventIngester {
    store: Arc<ActivityProjectionStore>,
    state: Arc<SyncState>,
    event_timeout: Duration,
    metrics: Option<Arc<MirrorMetrics>>,
}

impl ChainEventIngester {
    pub fn new(store: Arc<ActivityProjectionStore>, state: Arc<SyncState>) -> Self {
        Self {
            store,
            state,
            event_timeout: DEFAULT_EVENT_TIMEOUT,
            metrics: None,
        }
    }

    pub fn with_event_timeout(mut self, timeout: Duration) -> Self {
        self.event_timeout = timeout;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<MirrorMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Consume the syncer's event stream until cancellation or channel
    /// close.
    pub async fn run(
        self: Arc<Self>,
        mut rx: mpsc::Receiver<SyncerEvent>,
        cancel: CancellationToken,
    ) {
        info!("[Ingester] Starting event consumer");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("[Ingester] Cancelled");
                    break;
                }
                event = rx.recv() => {
                    let Some(event) = event else {
                        info!("[Ingester] Syncer channel closed");
                        break;
                    };
                    self.handle_syncer_event(event).await;
                }
            }
        }
    }

    async fn handle_syncer_event(&self, event: SyncerEvent) {
        match event {
            SyncerEvent::Started { chain, from_block } => {
                info!("[Ingester] Syncer started: chain={}, from={}", chain, from_block);
            }
            SyncerEvent::HeadUpdated { height } => {
                self.state.set_chain_head(height);
            }
            SyncerEvent::Events {
                scope,
                start_block,
                end_block,
                events,
            } => {
                debug!(
                    "[Ingester] {} events for {} (blocks {}-{})",
                    events.len(),
                    scope,
                    start_block,
                    end_block
                );
                for event in &events {
                    // A single bad event is logged and skipped; the batch
                    // and the subscription keep going.
                    let _ = self.ingest_event(event).await;
                }
                self.state.set_last_processed_block(end_block);
                if let Some(ref m) = self.metrics {
                    m.last_processed_block.set(end_block as i64);
                    m.last_successful_sync_timestamp
                        .set((crate::health::now_ms() / 1000) as i64);
                }
            }
            SyncerEvent::CaughtUp { scope, height } => {
                debug!("[Ingester] {} caught up at {}", scope, height);
                self.state.set_caught_up(true);
            }
            SyncerEvent::SyncError {
                scope,
                error,
                recoverable,
            } => {
                warn!(
                    "[Ingester] Sync error (scope={:?}, recoverable={}): {}",
                    scope, recoverable, error
                );
                self.state.record_sync_error();
                if let Some(ref m) = self.metrics {
                    m.sync_errors.with_label_values(&["ingester"]).inc();
                }
            }
            SyncerEvent::Stopped { reason } => {
                info!("[Ingester] Syncer stopped: {}", reason);
            }
        }
    }

    /// Ingest one ledger event under the bounded per-event budget.
    ///
    /// Returns whether a new activity record was created. Duplicate
    /// delivery returns `Ok(false)`.
    pub async fn ingest_event(&self, event: &LedgerEvent) -> MirrorResult<bool> {
        if let Some(ref m) = self.metrics {
            m.events_received
                .with_label_values(&[event.type_name()])
                .inc();
        }
        let result =
            tokio::time::timeout(self.event_timeout, self.apply_event(event)).await;
        match result {
            Ok(Ok(inserted)) => {
                self.state.record_event(event.envelope().timestamp_ms);
                if let Some(ref m) = self.metrics {
                    if inserted {
                        m.events_processed
                            .with_label_values(&[event.type_name()])
                            .inc();
                        m.activities_stored.inc();
                    } else {
                        m.activities_duplicate.inc();
                    }
                }
                Ok(inserted)
            }
            Ok(Err(e)) => {
                warn!(
                    "[Ingester] Event handler failed (id={}, type={}): {}",
                    event.event_id(),
                    event.type_name(),
                    e
                );
                if let Some(ref m) = self.metrics {
                    m.events_failed.with_label_values(&[e.error_type()]).inc();
                }
                Err(e)
            }
            Err(_) => {
                warn!(
                    "[Ingester] Event handler timed out after {:?} (id={})",
                    self.event_timeout,
                    event.event_id()
                );
                if let Some(ref m) = self.metrics {
                    m.events_timed_out.inc();
                }
                Err(MirrorError::Timeout(format!(
                    "event {} processing",
                    event.event_id()
                )))
            }
        }
    }

    async fn apply_event(&self, event: &LedgerEvent) -> MirrorResult<bool> {
        let (record, effect) = event_to_activity(event);
        self.store
            .ingest_ledger_activity(record, effect, event.block_number())
            .await
    }
}

/// Map a ledger event to its activity record and projection effect.
///
/// Group lifecycle events are public; membership and financial activity
/// defaults to members-only visibility.
pub fn event_to_activity(event: &LedgerEvent) -> (ActivityRecord, ProjectionEffect) {
    let envelope = event.envelope();
    let id = event.event_id();
    let base_metadata = ActivityMetadata {
        tx_hash: Some(envelope.tx_hash.clone()),
        block_number: Some(envelope.block_number),
        ..Default::default()
    };

    match event {
        LedgerEvent::GroupCreated {
            group_address,
            name,
            creator,
            ..
        } => {
            let record = ActivityRecord::new(
                &id,
                ActivityType::GroupCreated,
                group_address,
                creator,
                envelope.timestamp_ms,
            )
            .with_privacy(PrivacyTier::Public)
            .with_metadata(ActivityMetadata {
                description: Some(name.clone()),
                ..base_metadata
            });
            (
                record,
                ProjectionEffect::CreateGroup {
                    name: name.clone(),
                    creator: creator.clone(),
                },
            )
        }
        LedgerEvent::GroupDeactivated {
            group_address,
            actor,
            ..
        } => {
            let record = ActivityRecord::new(
                &id,
                ActivityType::GroupDeactivated,
                group_address,
                actor,
                envelope.timestamp_ms,
            )
            .with_privacy(PrivacyTier::Public)
            .with_metadata(base_metadata);
            (record, ProjectionEffect::CloseGroup)
        }
        LedgerEvent::MemberAdded {
            group_address,
            member,
            added_by,
            ..
        } => {
            let record = ActivityRecord::new(
                &id,
                ActivityType::MemberJoined,
                group_address,
                added_by,
                envelope.timestamp_ms,
            )
            .with_target(member)
            .with_metadata(base_metadata);
            (record, ProjectionEffect::MemberDelta(1))
        }
        LedgerEvent::MemberRemoved {
            group_address,
            member,
            removed_by,
            ..
        } => {
            let record = ActivityRecord::new(
                &id,
                ActivityType::MemberLeft,
                group_address,
                removed_by,
                envelope.timestamp_ms,
            )
            .with_target(member)
            .with_metadata(base_metadata);
            (record, ProjectionEffect::MemberDelta(-1))
        }
        LedgerEvent::ExpenseRecorded {
            group_address,
            payer,
            amount,
            currency,
            description,
            ..
        } => {
            let record = ActivityRecord::new(
                &id,
                ActivityType::ExpenseRecorded,
                group_address,
                payer,
                envelope.timestamp_ms,
            )
            .with_metadata(ActivityMetadata {
                amount: Some(amount.clone()),
                currency: Some(currency.clone()),
                description: Some(description.clone()),
                ..base_metadata
            });
            (
                record,
                ProjectionEffect::Expense {
                    amount: amount.clone(),
                },
            )
        }
        LedgerEvent::DebtSettled {
            group_address,
            debtor,
            creditor,
            amount,
            currency,
            ..
        } => {
            let record = ActivityRecord::new(
                &id,
                ActivityType::DebtSettled,
                group_address,
                debtor,
                envelope.timestamp_ms,
            )
            .with_target(creditor)
            .with_metadata(ActivityMetadata {
                amount: Some(amount.clone()),
                currency: Some(currency.clone()),
                ..base_metadata
            });
            (
                record,
                ProjectionEffect::Settlement {
                    amount: amount.clone(),
                },
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EventEnvelope;

    fn envelope(tx: &str, log_index: u32, block: u64) -> EventEnvelope {
        EventEnvelope {
            tx_hash: tx.to_string(),
            log_index,
            block_number: block,
            timestamp_ms: block * 1_000,
        }
    }

    fn ingester() -> (Arc<ChainEventIngester>, Arc<ActivityProjectionStore>) {
        let store = Arc::new(ActivityProjectionStore::new());
        let state = Arc::new(SyncState::new());
        let ingester = Arc::new(ChainEventIngester::new(store.clone(), state));
        (ingester, store)
    }

    fn expense(tx: &str, block: u64, amount: &str) -> LedgerEvent {
        LedgerEvent::ExpenseRecorded {
            envelope: envelope(tx, 0, block),
            group_address: "0xg1".to_string(),
            payer: "0xalice".to_string(),
            amount: amount.to_string(),
            currency: "USD".to_string(),
            description: "groceries".to_string(),
        }
    }

    #[tokio::test]
    async fn test_redelivered_event_is_noop() {
        let (ingester, store) = ingester();
        let event = expense("0xaaa", 3, "12.00");

        assert!(ingester.ingest_event(&event).await.unwrap());
        assert!(!ingester.ingest_event(&event).await.unwrap());

        let group = store.get_group("0xg1").await.unwrap();
        assert_eq!(group.activity_score, 1);
        assert_eq!(group.total_expenses, "12.00");
        assert_eq!(store.activity_count().await, 1);
    }

    #[tokio::test]
    async fn test_event_id_is_deterministic_not_random() {
        let event = expense("0xBBB", 4, "1.00");
        let (record, _) = event_to_activity(&event);
        let (record_again, _) = event_to_activity(&event);
        assert_eq!(record.id, record_again.id);
        assert_eq!(record.id, "0xbbb:0");
    }

    #[tokio::test]
    async fn test_all_event_types_map_to_activities() {
        let (ingester, store) = ingester();
        let events = vec![
            LedgerEvent::GroupCreated {
                envelope: envelope("0xt1", 0, 1),
                group_address: "0xg1".to_string(),
                name: "trip".to_string(),
                creator: "0xalice".to_string(),
            },
            LedgerEvent::MemberAdded {
                envelope: envelope("0xt2", 0, 2),
                group_address: "0xg1".to_string(),
                member: "0xbob".to_string(),
                added_by: "0xalice".to_string(),
            },
            expense("0xt3", 3, "30.00"),
            LedgerEvent::DebtSettled {
                envelope: envelope("0xt4", 0, 4),
                group_address: "0xg1".to_string(),
                debtor: "0xbob".to_string(),
                creditor: "0xalice".to_string(),
                amount: "15.00".to_string(),
                currency: "USD".to_string(),
            },
            LedgerEvent::MemberRemoved {
                envelope: envelope("0xt5", 0, 5),
                group_address: "0xg1".to_string(),
                member: "0xbob".to_string(),
                removed_by: "0xalice".to_string(),
            },
            LedgerEvent::GroupDeactivated {
                envelope: envelope("0xt6", 0, 6),
                group_address: "0xg1".to_string(),
                actor: "0xalice".to_string(),
            },
        ];

        for event in &events {
            assert!(ingester.ingest_event(event).await.unwrap());
        }

        let group = store.get_group("0xg1").await.unwrap();
        assert_eq!(group.name, "trip");
        assert_eq!(group.activity_score, 6);
        assert_eq!(group.member_count, 0); // +1 then -1
        assert_eq!(group.total_expenses, "30.00");
        assert_eq!(group.total_contributions, "15.00");
        assert_eq!(group.status, crate::types::GroupStatus::Closed);
        assert_eq!(group.last_synced_block, 6);
        assert_eq!(store.activity_count().await, 6);
    }

    #[tokio::test]
    async fn test_bad_event_does_not_stop_the_loop() {
        let (ingester, store) = ingester();
        let (tx, rx) = mpsc::channel(16);
        let cancel = CancellationToken::new();
        let consumer = tokio::spawn(ingester.clone().run(rx, cancel.clone()));

        tx.send(SyncerEvent::Events {
            scope: crate::chain_client::EventScope::Groups,
            start_block: 1,
            end_block: 2,
            events: vec![
                expense("0xbad", 1, "not-a-number"),
                expense("0xgood", 2, "5.00"),
            ],
        })
        .await
        .unwrap();
        drop(tx);

        consumer.await.unwrap();

        // The malformed event was skipped, the good one landed
        assert_eq!(store.activity_count().await, 1);
        let group = store.get_group("0xg1").await.unwrap();
        assert_eq!(group.total_expenses, "5.00");
    }

    #[tokio::test]
    async fn test_head_and_progress_tracking() {
        let store = Arc::new(ActivityProjectionStore::new());
        let state = Arc::new(SyncState::new());
        let ingester = Arc::new(ChainEventIngester::new(store, state.clone()));

        let (tx, rx) = mpsc::channel(16);
        let cancel = CancellationToken::new();
        let consumer = tokio::spawn(ingester.run(rx, cancel.clone()));

        tx.send(SyncerEvent::HeadUpdated { height: 9 }).await.unwrap();
        tx.send(SyncerEvent::Events {
            scope: crate::chain_client::EventScope::Groups,
            start_block: 1,
            end_block: 7,
            events: vec![],
        })
        .await
        .unwrap();
        tx.send(SyncerEvent::CaughtUp {
            scope: crate::chain_client::EventScope::Groups,
            height: 7,
        })
        .await
        .unwrap();
        drop(tx);
        consumer.await.unwrap();

        assert_eq!(state.chain_head(), 9);
        assert_eq!(state.last_processed_block(), 7);
        assert!(state.is_caught_up());
    }
}
