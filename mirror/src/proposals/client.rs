// Copyright (c) Circle Ledger Contributors
// SPDX-License-Identifier: Apache-2.0

//! Resilient proposal client.
//!
//! Wraps the primary coordinator with a bounded timeout per call. On
//! timeout or transport failure the call falls back to the local shadow
//! store; domain errors pass through unchanged so the caller still sees
//! duplicate-signature and invalid-state rejections exactly as the
//! coordinator reports them.

use super::coordinator::ProposalService;
use super::shadow::ShadowProposalStore;
use crate::error::{MirrorError, MirrorResult};
use crate::metrics::MirrorMetrics;
use crate::types::Proposal;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Default bound on one primary call
pub const DEFAULT_PROPOSAL_TIMEOUT: Duration = Duration::from_secs(5);

pub struct ResilientProposalClient {
    primary: Arc<dyn ProposalService>,
    shadow: Arc<ShadowProposalStore>,
    timeout: Duration,
    metrics: Option<Arc<MirrorMetrics>>,
}

impl ResilientProposalClient {
    pub fn new(primary: Arc<dyn ProposalService>, shadow: Arc<ShadowProposalStore>) -> Self {
        Self {
            primary,
            shadow,
            timeout: DEFAULT_PROPOSAL_TIMEOUT,
            metrics: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<MirrorMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn shadow(&self) -> Arc<ShadowProposalStore> {
        self.shadow.clone()
    }

    /// Run a primary call under the timeout; on transport-class failure
    /// run the equivalent shadow operation instead.
    async fn with_fallback<T, P, PF, S, SF>(
        &self,
        op: &str,
        primary_call: P,
        shadow_call: S,
    ) -> MirrorResult<T>
    where
        P: FnOnce() -> PF,
        PF: Future<Output = MirrorResult<T>>,
        S: FnOnce() -> SF,
        SF: Future<Output = MirrorResult<T>>,
    {
        let outcome = tokio::time::timeout(self.timeout, primary_call()).await;
        let transport_error = match outcome {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(e)) if e.is_transport() => e,
            Ok(Err(e)) => return Err(e),
            Err(_) => MirrorError::Timeout(format!("{} exceeded {:?}", op, self.timeout)),
        };

        warn!(
            "[ProposalClient] Primary {} failed ({}), using shadow store",
            op, transport_error
        );
        if let Some(ref m) = self.metrics {
            m.proposal_fallbacks.with_label_values(&[op]).inc();
        }
        shadow_call().await
    }

    pub async fn create(
        &self,
        group: &str,
        proposer: &str,
        destination: &str,
        amount: &str,
        description: &str,
    ) -> MirrorResult<Proposal> {
        self.with_fallback(
            "create",
            || self.primary.create(group, proposer, destination, amount, description),
            || self.shadow.create(group, proposer, destination, amount, description),
        )
        .await
    }

    pub async fn sign(&self, proposal_id: &str, signer: &str) -> MirrorResult<Proposal> {
        self.with_fallback(
            "sign",
            || self.primary.sign(proposal_id, signer),
            || self.shadow.sign(proposal_id, signer),
        )
        .await
    }

    pub async fn revoke(&self, proposal_id: &str, signer: &str) -> MirrorResult<Proposal> {
        self.with_fallback(
            "revoke",
            || self.primary.revoke(proposal_id, signer),
            || self.shadow.revoke(proposal_id, signer),
        )
        .await
    }

    pub async fn execute(&self, proposal_id: &str, tx_id: &str) -> MirrorResult<Proposal> {
        self.with_fallback(
            "execute",
            || self.primary.execute(proposal_id, tx_id),
            || self.shadow.execute(proposal_id, tx_id),
        )
        .await
    }

    pub async fn get(&self, proposal_id: &str) -> MirrorResult<Proposal> {
        self.with_fallback(
            "get",
            || self.primary.get(proposal_id),
            || self.shadow.get(proposal_id),
        )
        .await
    }

    pub async fn list_by_group(&self, group: &str) -> MirrorResult<Vec<Proposal>> {
        self.with_fallback(
            "list",
            || self.primary.list_by_group(group),
            || self.shadow.list_by_group(group),
        )
        .await
    }
}
