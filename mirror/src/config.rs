// Copyright (c) Circle Ledger Contributors
// SPDX-License-Identifier: Apache-2.0

use mirror_config::Config;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Node configuration, persisted as YAML or JSON.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct MirrorNodeConfig {
    /// Chain identifier used in logs and metric labels
    pub chain_name: String,
    /// JSON-RPC url of the ledger node
    pub ledger_rpc_url: String,
    /// First block of interest for factory events
    pub factory_start_block: u64,
    /// First block of interest for group events
    pub groups_start_block: u64,
    /// Chain head refresh cadence
    pub head_refresh_interval_ms: u64,
    /// Maximum blocks per event fetch
    pub max_block_range: u64,
    /// Periodic reconciliation cadence
    pub resync_interval_secs: u64,
    /// Per-event processing budget for the ingester
    pub event_timeout_ms: u64,
    /// Bound on one primary proposal call before shadow fallback
    pub proposal_timeout_ms: u64,
    /// Bound on one ledger RPC request
    pub rpc_timeout_ms: u64,
    /// Signatures required to approve a proposal unless a group carries
    /// its own policy
    pub default_signature_threshold: u32,
}

impl Config for MirrorNodeConfig {}

impl Default for MirrorNodeConfig {
    fn default() -> Self {
        Self {
            chain_name: "circlenet".to_string(),
            ledger_rpc_url: "http://127.0.0.1:8545".to_string(),
            factory_start_block: 0,
            groups_start_block: 0,
            head_refresh_interval_ms: 2_000,
            max_block_range: 500,
            resync_interval_secs: 30,
            event_timeout_ms: 5_000,
            proposal_timeout_ms: 5_000,
            rpc_timeout_ms: 10_000,
            default_signature_threshold: 2,
        }
    }
}

impl MirrorNodeConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.ledger_rpc_url.is_empty() {
            return Err("ledger-rpc-url must be set".to_string());
        }
        if self.max_block_range == 0 {
            return Err("max-block-range must be positive".to_string());
        }
        if self.default_signature_threshold == 0 {
            return Err("default-signature-threshold must be positive".to_string());
        }
        if self.event_timeout_ms == 0 || self.proposal_timeout_ms == 0 {
            return Err("timeouts must be positive".to_string());
        }
        Ok(())
    }

    pub fn head_refresh_interval(&self) -> Duration {
        Duration::from_millis(self.head_refresh_interval_ms)
    }

    pub fn resync_interval(&self) -> Duration {
        Duration::from_secs(self.resync_interval_secs)
    }

    pub fn event_timeout(&self) -> Duration {
        Duration::from_millis(self.event_timeout_ms)
    }

    pub fn proposal_timeout(&self) -> Duration {
        Duration::from_millis(self.proposal_timeout_ms)
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.rpc_timeout_ms)
    }
}
