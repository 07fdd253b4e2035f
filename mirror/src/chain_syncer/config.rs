// Copyright (c) Circle Ledger Contributors
// SPDX-License-Identifier: Apache-2.0

use crate::chain_client::EventScope;
use std::time::Duration;

/// Fetch-side tuning for the syncer
#[derive(Debug, Clone)]
pub struct SyncerFetchConfig {
    /// How often to refresh the chain head
    pub head_refresh_interval: Duration,
    /// Maximum blocks fetched per event query
    pub max_block_range: u64,
    /// Cap on total retry time for one chain call
    pub max_retry_duration: Duration,
}

impl Default for SyncerFetchConfig {
    fn default() -> Self {
        Self {
            head_refresh_interval: Duration::from_secs(2),
            max_block_range: 500,
            max_retry_duration: Duration::from_secs(30),
        }
    }
}

/// One event subscription with its own cursor
#[derive(Debug, Clone)]
pub struct ScopeConfig {
    pub scope: EventScope,
    pub start_block: u64,
}

/// Configuration for `LedgerChainSyncer`
#[derive(Debug, Clone)]
pub struct LedgerSyncerConfig {
    /// Chain identifier used in logs and metric labels
    pub chain_name: String,
    /// Bound of the syncer event channel
    pub channel_size: usize,
    pub fetch: SyncerFetchConfig,
    pub scopes: Vec<ScopeConfig>,
}

impl LedgerSyncerConfig {
    pub fn new(chain_name: &str) -> Self {
        Self {
            chain_name: chain_name.to_string(),
            channel_size: 1024,
            fetch: SyncerFetchConfig::default(),
            scopes: Vec::new(),
        }
    }

    pub fn with_scope(mut self, scope: EventScope, start_block: u64) -> Self {
        self.scopes.push(ScopeConfig { scope, start_block });
        self
    }

    pub fn with_max_block_range(mut self, range: u64) -> Self {
        self.fetch.max_block_range = range;
        self
    }

    pub fn with_head_refresh_interval(mut self, interval: Duration) -> Self {
        self.fetch.head_refresh_interval = interval;
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.scopes.is_empty() {
            return Err("at least one subscription scope is required".to_string());
        }
        if self.fetch.max_block_range == 0 {
            return Err("max_block_range must be positive".to_string());
        }
        if self.channel_size == 0 {
            return Err("channel_size must be positive".to_string());
        }
        Ok(())
    }
}
