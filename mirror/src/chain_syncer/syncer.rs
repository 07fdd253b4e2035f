// Copyright (c) Circle Ledger Contributors
// SPDX-License-Identifier: Apache-2.0

//! Ledger chain syncer implementation.
//!
//! Spawns one head-refresh task publishing the chain head over a watch
//! channel, plus one fetch task per subscription scope. Each fetch task
//! owns its cursor and pulls bounded block ranges, so the factory-level
//! and group-level subscriptions run concurrently without shared mutable
//! state. Output is a stream of `SyncerEvent` consumed by the ingester.

use super::config::LedgerSyncerConfig;
use super::events::SyncerEvent;
use crate::chain_client::{EventScope, LedgerChainClient};
use crate::error::{MirrorError, MirrorResult};
use crate::metrics::MirrorMetrics;
use crate::retry_with_max_elapsed_time;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Duration};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub struct LedgerChainSyncer {
    config: LedgerSyncerConfig,
    client: Arc<dyn LedgerChainClient>,
    metrics: Option<Arc<MirrorMetrics>>,
}

impl LedgerChainSyncer {
    pub fn new(
        config: LedgerSyncerConfig,
        client: Arc<dyn LedgerChainClient>,
    ) -> MirrorResult<Self> {
        config
            .validate()
            .map_err(MirrorError::InternalError)?;
        Ok(Self {
            config,
            client,
            metrics: None,
        })
    }

    pub fn with_metrics(mut self, metrics: Arc<MirrorMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Run the syncer; returns the spawned task handles and the event
    /// receiver. All tasks terminate when `cancel` fires.
    pub async fn run(
        self,
        cancel: CancellationToken,
    ) -> MirrorResult<(Vec<JoinHandle<()>>, mpsc::Receiver<SyncerEvent>)> {
        let (event_tx, event_rx) = mpsc::channel(self.config.channel_size);

        let from_block = self
            .config
            .scopes
            .iter()
            .map(|s| s.start_block)
            .min()
            .unwrap_or(0);
        let _ = event_tx
            .send(SyncerEvent::Started {
                chain: self.config.chain_name.clone(),
                from_block,
            })
            .await;

        let initial_head = self.client.get_latest_block().await?;
        let (head_tx, head_rx) = watch::channel(initial_head);

        let mut handles = Vec::new();

        let client = self.client.clone();
        let config = self.config.clone();
        let tx = event_tx.clone();
        let cancel_clone = cancel.clone();
        let metrics = self.metrics.clone();
        handles.push(tokio::spawn(async move {
            run_head_refresh_task(client, config, head_tx, tx, cancel_clone, metrics).await;
        }));

        for scope_config in &self.config.scopes {
            let client = self.client.clone();
            let config = self.config.clone();
            let tx = event_tx.clone();
            let head_rx = head_rx.clone();
            let cancel_clone = cancel.clone();
            let metrics = self.metrics.clone();
            let scope = scope_config.scope;
            let start_block = scope_config.start_block;
            handles.push(tokio::spawn(async move {
                run_scope_sync_task(
                    client,
                    config,
                    scope,
                    start_block,
                    head_rx,
                    tx,
                    cancel_clone,
                    metrics,
                )
                .await;
            }));
        }

        Ok((handles, event_rx))
    }
}

/// Task to refresh the chain head
async fn run_head_refresh_task(
    client: Arc<dyn LedgerChainClient>,
    config: LedgerSyncerConfig,
    sender: watch::Sender<u64>,
    event_tx: mpsc::Sender<SyncerEvent>,
    cancel: CancellationToken,
    metrics: Option<Arc<MirrorMetrics>>,
) {
    info!("[{}] Starting head refresh task", config.chain_name);

    let mut last_head = 0u64;
    let mut interval = time::interval(config.fetch.head_refresh_interval);
    interval.set_missed_tick_behavior(time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("[{}] Head refresh task cancelled", config.chain_name);
                break;
            }
            _ = interval.tick() => {
                match retry_with_max_elapsed_time!(
                    client.get_latest_block(),
                    config.fetch.max_retry_duration
                ) {
                    Ok(Ok(head)) => {
                        if head > last_head {
                            debug!("[{}] New chain head: {}", config.chain_name, head);
                            let _ = sender.send(head);
                            let _ = event_tx
                                .send(SyncerEvent::HeadUpdated { height: head })
                                .await;
                            if let Some(ref m) = metrics {
                                m.chain_head_block.set(head as i64);
                            }
                            last_head = head;
                        }
                    }
                    _ => {
                        error!(
                            "[{}] Failed to refresh chain head after retry",
                            config.chain_name
                        );
                        let _ = event_tx
                            .send(SyncerEvent::SyncError {
                                scope: None,
                                error: "failed to refresh chain head".to_string(),
                                recoverable: true,
                            })
                            .await;
                    }
                }
            }
        }
    }
}

/// Task to sync events for a single subscription scope
#[allow(clippy::too_many_arguments)]
async fn run_scope_sync_task(
    client: Arc<dyn LedgerChainClient>,
    config: LedgerSyncerConfig,
    scope: EventScope,
    start_block: u64,
    mut head_rx: watch::Receiver<u64>,
    event_tx: mpsc::Sender<SyncerEvent>,
    cancel: CancellationToken,
    metrics: Option<Arc<MirrorMetrics>>,
) {
    info!(
        "[{}] Starting {} scope sync from block {}",
        config.chain_name, scope, start_block
    );

    let mut cursor = start_block;
    let mut more_blocks = false;

    loop {
        // When catching up, don't wait for head notifications
        if !more_blocks {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("[{}] {} scope sync cancelled", config.chain_name, scope);
                    break;
                }
                result = head_rx.changed() => {
                    if result.is_err() {
                        error!("[{}] Head channel closed", config.chain_name);
                        break;
                    }
                }
            }
        } else if cancel.is_cancelled() {
            info!("[{}] {} scope sync cancelled", config.chain_name, scope);
            break;
        }

        let head = *head_rx.borrow();
        if head < cursor {
            debug!(
                "[{}] {} head {} < cursor {}, waiting",
                config.chain_name, scope, head, cursor
            );
            more_blocks = false;
            continue;
        }

        let end_block = std::cmp::min(cursor + config.fetch.max_block_range - 1, head);
        more_blocks = end_block < head;

        let started = Instant::now();
        let fetch_result = retry_with_max_elapsed_time!(
            client.get_events_in_range(scope, cursor, end_block),
            config.fetch.max_retry_duration
        );

        match fetch_result {
            Ok(Ok(events)) => {
                debug!(
                    "[{}] Fetched {} {} events in {:?} (blocks {}-{})",
                    config.chain_name,
                    events.len(),
                    scope,
                    started.elapsed(),
                    cursor,
                    end_block
                );

                if let Some(ref m) = metrics {
                    m.last_synced_scope_blocks
                        .with_label_values(&[scope.as_str()])
                        .set(end_block as i64);
                }

                let _ = event_tx
                    .send(SyncerEvent::Events {
                        scope,
                        start_block: cursor,
                        end_block,
                        events,
                    })
                    .await;

                if !more_blocks {
                    let _ = event_tx
                        .send(SyncerEvent::CaughtUp {
                            scope,
                            height: end_block,
                        })
                        .await;
                }

                cursor = end_block + 1;
            }
            _ => {
                warn!(
                    "[{}] Failed to fetch {} events after retry (blocks {}-{})",
                    config.chain_name, scope, cursor, end_block
                );
                if let Some(ref m) = metrics {
                    m.sync_errors.with_label_values(&["syncer"]).inc();
                }
                let _ = event_tx
                    .send(SyncerEvent::SyncError {
                        scope: Some(scope),
                        error: format!("failed to fetch {} events", scope),
                        recoverable: true,
                    })
                    .await;
                // Wait for the next head change before retrying the range
                more_blocks = false;
            }
        }
    }
}
