// Copyright (c) Circle Ledger Contributors
// SPDX-License-Identifier: Apache-2.0

use prometheus::{
    register_int_counter_vec_with_registry, register_int_counter_with_registry,
    register_int_gauge_vec_with_registry, register_int_gauge_with_registry, IntCounter,
    IntCounterVec, IntGauge, IntGaugeVec, Registry,
};

#[derive(Clone, Debug)]
#[allow(dead_code)]
pub struct MirrorMetrics {
    pub(crate) events_received: IntCounterVec,
    pub(crate) events_processed: IntCounterVec,
    pub(crate) events_failed: IntCounterVec,
    pub(crate) events_timed_out: IntCounter,

    pub(crate) chain_head_block: IntGauge,
    pub(crate) last_processed_block: IntGauge,
    pub(crate) last_synced_scope_blocks: IntGaugeVec,
    pub(crate) last_successful_sync_timestamp: IntGauge,

    pub(crate) resync_runs: IntCounterVec,
    pub(crate) resync_groups_updated: IntCounter,
    pub(crate) gap_blocks_reprocessed: IntCounter,

    pub(crate) activities_stored: IntCounter,
    pub(crate) activities_duplicate: IntCounter,

    pub(crate) proposal_operations: IntCounterVec,
    pub(crate) proposal_operation_errors: IntCounterVec,
    pub(crate) proposal_fallbacks: IntCounterVec,

    pub(crate) sync_errors: IntCounterVec,
}

impl MirrorMetrics {
    pub fn new(registry: &Registry) -> Self {
        Self {
            events_received: register_int_counter_vec_with_registry!(
                "mirror_events_received",
                "Total ledger events received from the syncer, by event type",
                &["type"],
                registry,
            )
            .unwrap(),
            events_processed: register_int_counter_vec_with_registry!(
                "mirror_events_processed",
                "Total ledger events converted into activity records, by event type",
                &["type"],
                registry,
            )
            .unwrap(),
            events_failed: register_int_counter_vec_with_registry!(
                "mirror_events_failed",
                "Total ledger events whose handler failed, by error type",
                &["error"],
                registry,
            )
            .unwrap(),
            events_timed_out: register_int_counter_with_registry!(
                "mirror_events_timed_out",
                "Total ledger events whose handler exceeded the per-event budget",
                registry,
            )
            .unwrap(),
            chain_head_block: register_int_gauge_with_registry!(
                "mirror_chain_head_block",
                "Latest block number observed at the chain head",
                registry,
            )
            .unwrap(),
            last_processed_block: register_int_gauge_with_registry!(
                "mirror_last_processed_block",
                "Highest block fully processed by the ingester",
                registry,
            )
            .unwrap(),
            last_synced_scope_blocks: register_int_gauge_vec_with_registry!(
                "mirror_last_synced_scope_blocks",
                "Last block synced per subscription scope",
                &["scope"],
                registry,
            )
            .unwrap(),
            last_successful_sync_timestamp: register_int_gauge_with_registry!(
                "mirror_last_successful_sync_timestamp",
                "Unix timestamp of the last successful sync step",
                registry,
            )
            .unwrap(),
            resync_runs: register_int_counter_vec_with_registry!(
                "mirror_resync_runs",
                "Total reconciliation passes, by outcome",
                &["outcome"],
                registry,
            )
            .unwrap(),
            resync_groups_updated: register_int_counter_with_registry!(
                "mirror_resync_groups_updated",
                "Total group projections upserted by reconciliation",
                registry,
            )
            .unwrap(),
            gap_blocks_reprocessed: register_int_counter_with_registry!(
                "mirror_gap_blocks_reprocessed",
                "Total blocks reprocessed by the periodic gap check",
                registry,
            )
            .unwrap(),
            activities_stored: register_int_counter_with_registry!(
                "mirror_activities_stored",
                "Total activity records accepted by the store",
                registry,
            )
            .unwrap(),
            activities_duplicate: register_int_counter_with_registry!(
                "mirror_activities_duplicate",
                "Total activity records skipped as duplicates",
                registry,
            )
            .unwrap(),
            proposal_operations: register_int_counter_vec_with_registry!(
                "mirror_proposal_operations",
                "Total proposal mutations, by operation",
                &["op"],
                registry,
            )
            .unwrap(),
            proposal_operation_errors: register_int_counter_vec_with_registry!(
                "mirror_proposal_operation_errors",
                "Total failed proposal mutations, by operation and error type",
                &["op", "error"],
                registry,
            )
            .unwrap(),
            proposal_fallbacks: register_int_counter_vec_with_registry!(
                "mirror_proposal_fallbacks",
                "Total proposal mutations served by the shadow store, by operation",
                &["op"],
                registry,
            )
            .unwrap(),
            sync_errors: register_int_counter_vec_with_registry!(
                "mirror_sync_errors",
                "Total sync errors, by component",
                &["component"],
                registry,
            )
            .unwrap(),
        }
    }

    pub fn new_for_testing() -> Self {
        let registry = Registry::new();
        Self::new(&registry)
    }
}
