// Copyright (c) Circle Ledger Contributors
// SPDX-License-Identifier: Apache-2.0

//! Read-side chain access.
//!
//! `LedgerChainClient` is the seam between the mirror and the ledger node:
//! canonical state reads for reconciliation plus event-range fetches for
//! the syncer. The JSON-RPC implementation below is the production path;
//! tests use the scripted mock client.

use crate::error::{MirrorError, MirrorResult};
use crate::types::{normalize_address, CanonicalGroupState, LedgerEvent};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use std::time::Duration;

/// Which contract family an event subscription covers.
///
/// Factory-level and per-group subscriptions run as independent tasks and
/// share no mutable state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventScope {
    /// Group factory: creation/deactivation events
    Factory,
    /// All group contracts: membership, expense, settlement events
    Groups,
}

impl EventScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventScope::Factory => "factory",
            EventScope::Groups => "groups",
        }
    }
}

impl std::fmt::Display for EventScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Chain read access used by the syncer and the reconciler.
#[async_trait]
pub trait LedgerChainClient: Send + Sync {
    /// Latest block number at the chain head
    async fn get_latest_block(&self) -> MirrorResult<u64>;

    /// All group contract addresses known to the factory
    async fn list_group_addresses(&self) -> MirrorResult<Vec<String>>;

    /// Canonical state of one group, or None if the factory does not
    /// know the address
    async fn get_group_state(
        &self,
        address: &str,
    ) -> MirrorResult<Option<CanonicalGroupState>>;

    /// Events for a scope in an inclusive block range
    async fn get_events_in_range(
        &self,
        scope: EventScope,
        from_block: u64,
        to_block: u64,
    ) -> MirrorResult<Vec<LedgerEvent>>;
}

/// JSON-RPC 2.0 client for a ledger node.
pub struct JsonRpcLedgerClient {
    url: String,
    client: reqwest::Client,
}

impl JsonRpcLedgerClient {
    pub fn new(url: &str, request_timeout: Duration) -> MirrorResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| MirrorError::InternalError(format!("http client: {}", e)))?;
        Ok(Self {
            url: url.to_string(),
            client,
        })
    }

    async fn call<P: Serialize, T: DeserializeOwned>(
        &self,
        method: &str,
        params: P,
    ) -> MirrorResult<T> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });

        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    MirrorError::Timeout(format!("{} timed out", method))
                } else {
                    MirrorError::ChainUnavailable(format!("{}: {}", method, e))
                }
            })?;

        let payload: serde_json::Value = response.json().await.map_err(|e| {
            MirrorError::ChainUnavailable(format!("{}: invalid response: {}", method, e))
        })?;

        if let Some(err) = payload.get("error") {
            return Err(MirrorError::ChainUnavailable(format!(
                "{}: rpc error: {}",
                method, err
            )));
        }

        let result = payload.get("result").cloned().ok_or_else(|| {
            MirrorError::ChainUnavailable(format!("{}: missing result", method))
        })?;

        serde_json::from_value(result)
            .map_err(|e| MirrorError::SerializationError(format!("{}: {}", method, e)))
    }
}

#[async_trait]
impl LedgerChainClient for JsonRpcLedgerClient {
    async fn get_latest_block(&self) -> MirrorResult<u64> {
        self.call("ledger_getLatestBlock", json!([])).await
    }

    async fn list_group_addresses(&self) -> MirrorResult<Vec<String>> {
        let addresses: Vec<String> = self.call("ledger_listGroups", json!([])).await?;
        Ok(addresses.iter().map(|a| normalize_address(a)).collect())
    }

    async fn get_group_state(
        &self,
        address: &str,
    ) -> MirrorResult<Option<CanonicalGroupState>> {
        self.call(
            "ledger_getGroupState",
            json!([normalize_address(address)]),
        )
        .await
    }

    async fn get_events_in_range(
        &self,
        scope: EventScope,
        from_block: u64,
        to_block: u64,
    ) -> MirrorResult<Vec<LedgerEvent>> {
        self.call(
            "ledger_getEvents",
            json!([scope.as_str(), from_block, to_block]),
        )
        .await
    }
}
