// Copyright (c) Circle Ledger Contributors
// SPDX-License-Identifier: Apache-2.0

//! Scripted in-memory ledger client for tests.

use crate::chain_client::{EventScope, LedgerChainClient};
use crate::error::{MirrorError, MirrorResult};
use crate::types::{normalize_address, CanonicalGroupState, LedgerEvent};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::RwLock;

pub struct MockLedgerClient {
    head: RwLock<u64>,
    groups: RwLock<HashMap<String, CanonicalGroupState>>,
    /// Addresses the factory lists without serving state for, to script
    /// canonical-read failures
    phantom_addresses: RwLock<Vec<String>>,
    events: RwLock<HashMap<EventScope, Vec<LedgerEvent>>>,
    unavailable: AtomicBool,
    event_fetches: AtomicUsize,
}

impl MockLedgerClient {
    pub fn new() -> Self {
        Self {
            head: RwLock::new(0),
            groups: RwLock::new(HashMap::new()),
            phantom_addresses: RwLock::new(Vec::new()),
            events: RwLock::new(HashMap::new()),
            unavailable: AtomicBool::new(false),
            event_fetches: AtomicUsize::new(0),
        }
    }

    pub async fn set_head(&self, head: u64) {
        *self.head.write().await = head;
    }

    pub async fn set_group_state(&self, state: CanonicalGroupState) {
        let mut groups = self.groups.write().await;
        groups.insert(normalize_address(&state.address), state);
    }

    pub async fn push_phantom_address(&self, address: &str) {
        let mut phantom = self.phantom_addresses.write().await;
        phantom.push(normalize_address(address));
    }

    pub async fn push_event(&self, scope: EventScope, event: LedgerEvent) {
        let mut events = self.events.write().await;
        events.entry(scope).or_default().push(event);
    }

    /// Make every call fail with ChainUnavailable
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn event_fetch_count(&self) -> usize {
        self.event_fetches.load(Ordering::SeqCst)
    }

    fn check_available(&self) -> MirrorResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(MirrorError::ChainUnavailable("mock outage".to_string()))
        } else {
            Ok(())
        }
    }
}

impl Default for MockLedgerClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LedgerChainClient for MockLedgerClient {
    async fn get_latest_block(&self) -> MirrorResult<u64> {
        self.check_available()?;
        Ok(*self.head.read().await)
    }

    async fn list_group_addresses(&self) -> MirrorResult<Vec<String>> {
        self.check_available()?;
        let groups = self.groups.read().await;
        let mut addresses: Vec<String> = groups.keys().cloned().collect();
        addresses.extend(self.phantom_addresses.read().await.iter().cloned());
        addresses.sort();
        Ok(addresses)
    }

    async fn get_group_state(
        &self,
        address: &str,
    ) -> MirrorResult<Option<CanonicalGroupState>> {
        self.check_available()?;
        let groups = self.groups.read().await;
        Ok(groups.get(&normalize_address(address)).cloned())
    }

    async fn get_events_in_range(
        &self,
        scope: EventScope,
        from_block: u64,
        to_block: u64,
    ) -> MirrorResult<Vec<LedgerEvent>> {
        self.check_available()?;
        self.event_fetches.fetch_add(1, Ordering::SeqCst);
        let events = self.events.read().await;
        Ok(events
            .get(&scope)
            .map(|list| {
                list.iter()
                    .filter(|e| {
                        let block = e.block_number();
                        block >= from_block && block <= to_block
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}
