// Copyright (c) Circle Ledger Contributors
// SPDX-License-Identifier: Apache-2.0

//! Proposal coordinator.
//!
//! Owns the proposal state machine. Every mutation is serialized per
//! proposal id through a mutex cache, so concurrent signs can neither
//! double-transition nor lose a signature, and no partial update is
//! externally observable.

use crate::error::{MirrorError, MirrorResult};
use crate::health::now_ms;
use crate::metrics::MirrorMetrics;
use crate::notify::NotificationSender;
use crate::types::{
    normalize_address, parse_amount, Proposal, ProposalStatus, DEFAULT_SIGNATURE_THRESHOLD,
};
use async_trait::async_trait;
use lru::LruCache;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

/// Mutating and read operations on proposals. The coordinator is the
/// primary implementation; the shadow store implements the same contract
/// so behavior is consistent regardless of which path served a call.
#[async_trait]
pub trait ProposalService: Send + Sync {
    async fn create(
        &self,
        group: &str,
        proposer: &str,
        destination: &str,
        amount: &str,
        description: &str,
    ) -> MirrorResult<Proposal>;

    async fn sign(&self, proposal_id: &str, signer: &str) -> MirrorResult<Proposal>;

    async fn revoke(&self, proposal_id: &str, signer: &str) -> MirrorResult<Proposal>;

    async fn execute(&self, proposal_id: &str, tx_id: &str) -> MirrorResult<Proposal>;

    async fn get(&self, proposal_id: &str) -> MirrorResult<Proposal>;

    async fn list_by_group(&self, group: &str) -> MirrorResult<Vec<Proposal>>;
}

pub struct ProposalCoordinator {
    proposals: RwLock<HashMap<String, Proposal>>,
    /// Per-proposal-id mutexes; the cache itself sits behind a mutex so
    /// two callers can't double-insert an entry for the same id
    locks: Mutex<LruCache<String, Arc<Mutex<()>>>>,
    /// Per-group signature-threshold policy
    thresholds: RwLock<HashMap<String, u32>>,
    /// Threshold applied when a group carries no explicit policy
    default_threshold: u32,
    next_seq: AtomicU64,
    notifier: Arc<dyn NotificationSender>,
    metrics: Option<Arc<MirrorMetrics>>,
}

impl ProposalCoordinator {
    pub fn new(notifier: Arc<dyn NotificationSender>) -> Self {
        Self {
            proposals: RwLock::new(HashMap::new()),
            locks: Mutex::new(LruCache::new(NonZeroUsize::new(1024).unwrap())),
            thresholds: RwLock::new(HashMap::new()),
            default_threshold: DEFAULT_SIGNATURE_THRESHOLD,
            next_seq: AtomicU64::new(1),
            notifier,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<MirrorMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn with_default_threshold(mut self, threshold: u32) -> Self {
        self.default_threshold = threshold.max(1);
        self
    }

    /// Override the signature threshold for one group
    pub async fn set_group_threshold(&self, group: &str, threshold: u32) {
        let mut thresholds = self.thresholds.write().await;
        thresholds.insert(normalize_address(group), threshold.max(1));
    }

    async fn threshold_for(&self, group: &str) -> u32 {
        let thresholds = self.thresholds.read().await;
        thresholds
            .get(group)
            .copied()
            .unwrap_or(self.default_threshold)
    }

    async fn lock_for(&self, proposal_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .get_or_insert(proposal_id.to_string(), || Arc::new(Mutex::new(())))
            .clone()
    }

    fn count_op(&self, op: &str) {
        if let Some(ref m) = self.metrics {
            m.proposal_operations.with_label_values(&[op]).inc();
        }
    }

    fn count_op_error(&self, op: &str, error: &MirrorError) {
        if let Some(ref m) = self.metrics {
            m.proposal_operation_errors
                .with_label_values(&[op, error.error_type()])
                .inc();
        }
    }

    async fn notify_status(&self, proposal: &Proposal) {
        let subject = match proposal.status {
            ProposalStatus::Approved => "proposal approved",
            ProposalStatus::Executed => "proposal executed",
            _ => return,
        };
        let body = format!(
            "proposal {} for group {}: {} -> {}",
            proposal.id, proposal.group_address, proposal.amount, proposal.destination
        );
        // Fire-and-forget: only the boolean outcome is consumed
        let delivered = self.notifier.notify(subject, &body).await;
        if !delivered {
            warn!(
                "[Coordinator] Notification delivery failed for {}",
                proposal.id
            );
        }
    }

    /// Mutate one proposal under its id lock, returning the updated copy.
    async fn mutate<F>(&self, op: &str, proposal_id: &str, f: F) -> MirrorResult<Proposal>
    where
        F: FnOnce(&mut Proposal) -> MirrorResult<()>,
    {
        let lock = self.lock_for(proposal_id).await;
        let _guard = lock.lock().await;

        let result = {
            let mut proposals = self.proposals.write().await;
            match proposals.get_mut(proposal_id) {
                None => Err(MirrorError::ProposalNotFound(proposal_id.to_string())),
                Some(proposal) => f(proposal).map(|_| proposal.clone()),
            }
        };

        match result {
            Ok(proposal) => {
                self.count_op(op);
                Ok(proposal)
            }
            Err(e) => {
                self.count_op_error(op, &e);
                Err(e)
            }
        }
    }
}

#[async_trait]
impl ProposalService for ProposalCoordinator {
    async fn create(
        &self,
        group: &str,
        proposer: &str,
        destination: &str,
        amount: &str,
        description: &str,
    ) -> MirrorResult<Proposal> {
        parse_amount(amount)?;
        let group = normalize_address(group);
        let threshold = self.threshold_for(&group).await;
        let id = format!("prop-{}", self.next_seq.fetch_add(1, Ordering::SeqCst));
        let proposal = Proposal::new(
            &id,
            &group,
            proposer,
            destination,
            amount,
            description,
            threshold,
            now_ms(),
        );

        let mut proposals = self.proposals.write().await;
        proposals.insert(id.clone(), proposal.clone());
        drop(proposals);

        info!(
            "[Coordinator] Created {} for group {} (threshold={})",
            id, group, threshold
        );
        self.count_op("create");
        Ok(proposal)
    }

    async fn sign(&self, proposal_id: &str, signer: &str) -> MirrorResult<Proposal> {
        let now = now_ms();
        let signer = signer.to_string();
        let updated = self
            .mutate("sign", proposal_id, |p| p.apply_sign(&signer, now))
            .await?;
        debug!(
            "[Coordinator] {} signed by {}: {}/{} ({})",
            proposal_id,
            signer,
            updated.signature_count(),
            updated.required_signatures,
            updated.status
        );
        if updated.status == ProposalStatus::Approved {
            self.notify_status(&updated).await;
        }
        Ok(updated)
    }

    async fn revoke(&self, proposal_id: &str, signer: &str) -> MirrorResult<Proposal> {
        let signer = signer.to_string();
        let updated = self
            .mutate("revoke", proposal_id, |p| p.apply_revoke(&signer))
            .await?;
        debug!(
            "[Coordinator] {} revoked by {}: {}/{} ({})",
            proposal_id,
            signer,
            updated.signature_count(),
            updated.required_signatures,
            updated.status
        );
        Ok(updated)
    }

    async fn execute(&self, proposal_id: &str, tx_id: &str) -> MirrorResult<Proposal> {
        let now = now_ms();
        let tx_id = tx_id.to_string();
        let updated = self
            .mutate("execute", proposal_id, |p| p.apply_execute(&tx_id, now))
            .await?;
        info!(
            "[Coordinator] Executed {} with tx {}",
            proposal_id, tx_id
        );
        self.notify_status(&updated).await;
        Ok(updated)
    }

    async fn get(&self, proposal_id: &str) -> MirrorResult<Proposal> {
        let proposals = self.proposals.read().await;
        proposals
            .get(proposal_id)
            .cloned()
            .ok_or_else(|| MirrorError::ProposalNotFound(proposal_id.to_string()))
    }

    async fn list_by_group(&self, group: &str) -> MirrorResult<Vec<Proposal>> {
        let group = normalize_address(group);
        let proposals = self.proposals.read().await;
        let mut matching: Vec<Proposal> = proposals
            .values()
            .filter(|p| p.group_address == group)
            .cloned()
            .collect();
        matching.sort_by(|a, b| a.created_at_ms.cmp(&b.created_at_ms).then_with(|| a.id.cmp(&b.id)));
        Ok(matching)
    }
}
