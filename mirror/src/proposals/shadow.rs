// Copyright (c) Circle Ledger Contributors
// SPDX-License-Identifier: Apache-2.0

//! Local shadow store for proposals.
//!
//! Serves mutations when the primary coordinator is unreachable. Entries
//! live in an injected key-value cache, keyed by group, in the `local_`
//! id namespace, disjoint from primary ids, so a shadow entry can never
//! collide with or be mistaken for a primary record. The same transition
//! methods as the coordinator apply, so duplicate-signature rejection,
//! threshold approval, and revoke demotion behave identically on this
//! path. Nothing is merged back into the primary on reconnect.

use super::coordinator::ProposalService;
use crate::error::{MirrorError, MirrorResult};
use crate::health::now_ms;
use crate::kv::{InMemoryKvCache, KvCache};
use crate::types::{
    normalize_address, parse_amount, Proposal, DEFAULT_SIGNATURE_THRESHOLD, SHADOW_ID_PREFIX,
};
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

pub struct ShadowProposalStore {
    /// Proposals keyed by shadow id
    entries: Arc<dyn KvCache<Proposal>>,
    /// Shadow ids keyed by group address
    group_index: Arc<dyn KvCache<Vec<String>>>,
    next_seq: AtomicU64,
    /// Single-writer discipline for the read-modify-write cycles on the
    /// injected cache
    write_lock: Mutex<()>,
}

impl ShadowProposalStore {
    pub fn new(
        entries: Arc<dyn KvCache<Proposal>>,
        group_index: Arc<dyn KvCache<Vec<String>>>,
    ) -> Self {
        Self {
            entries,
            group_index,
            next_seq: AtomicU64::new(1),
            write_lock: Mutex::new(()),
        }
    }

    /// Shadow store backed by fresh in-memory caches
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(InMemoryKvCache::new()),
            Arc::new(InMemoryKvCache::new()),
        )
    }

    async fn load(&self, proposal_id: &str) -> MirrorResult<Proposal> {
        self.entries
            .get(proposal_id)
            .await
            .ok_or_else(|| MirrorError::ProposalNotFound(proposal_id.to_string()))
    }

    async fn store(&self, proposal: Proposal) {
        let id = proposal.id.clone();
        self.entries.put(&id, proposal).await;
    }
}

#[async_trait]
impl ProposalService for ShadowProposalStore {
    async fn create(
        &self,
        group: &str,
        proposer: &str,
        destination: &str,
        amount: &str,
        description: &str,
    ) -> MirrorResult<Proposal> {
        parse_amount(amount)?;
        let _guard = self.write_lock.lock().await;
        let group = normalize_address(group);
        let id = format!(
            "{}{}",
            SHADOW_ID_PREFIX,
            self.next_seq.fetch_add(1, Ordering::SeqCst)
        );
        let proposal = Proposal::new(
            &id,
            &group,
            proposer,
            destination,
            amount,
            description,
            DEFAULT_SIGNATURE_THRESHOLD,
            now_ms(),
        );

        self.store(proposal.clone()).await;
        let mut ids = self.group_index.get(&group).await.unwrap_or_default();
        ids.push(id.clone());
        self.group_index.put(&group, ids).await;

        info!("[Shadow] Created {} for group {}", id, group);
        Ok(proposal)
    }

    async fn sign(&self, proposal_id: &str, signer: &str) -> MirrorResult<Proposal> {
        let _guard = self.write_lock.lock().await;
        let mut proposal = self.load(proposal_id).await?;
        proposal.apply_sign(signer, now_ms())?;
        self.store(proposal.clone()).await;
        Ok(proposal)
    }

    async fn revoke(&self, proposal_id: &str, signer: &str) -> MirrorResult<Proposal> {
        let _guard = self.write_lock.lock().await;
        let mut proposal = self.load(proposal_id).await?;
        proposal.apply_revoke(signer)?;
        self.store(proposal.clone()).await;
        Ok(proposal)
    }

    async fn execute(&self, proposal_id: &str, tx_id: &str) -> MirrorResult<Proposal> {
        let _guard = self.write_lock.lock().await;
        let mut proposal = self.load(proposal_id).await?;
        proposal.apply_execute(tx_id, now_ms())?;
        self.store(proposal.clone()).await;
        Ok(proposal)
    }

    async fn get(&self, proposal_id: &str) -> MirrorResult<Proposal> {
        self.load(proposal_id).await
    }

    async fn list_by_group(&self, group: &str) -> MirrorResult<Vec<Proposal>> {
        let group = normalize_address(group);
        let ids = self.group_index.get(&group).await.unwrap_or_default();
        let mut proposals = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(proposal) = self.entries.get(&id).await {
                proposals.push(proposal);
            }
        }
        Ok(proposals)
    }
}
