// Copyright (c) Circle Ledger Contributors
// SPDX-License-Identifier: Apache-2.0

//! Domain types shared across the mirror: group projections, activity
//! records, proposals, and the ledger events they are derived from.

use crate::error::{MirrorError, MirrorResult};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Signatures required to approve a proposal when the group carries no
/// explicit policy.
pub const DEFAULT_SIGNATURE_THRESHOLD: u32 = 2;

/// Id prefix for proposals created in the local shadow store. Disjoint
/// from primary ids so the two namespaces can never collide.
pub const SHADOW_ID_PREFIX: &str = "local_";

/// Normalize a contract/identity address for storage and lookups.
///
/// All addresses are stored lower-case with a `0x` prefix.
pub fn normalize_address(address: &str) -> String {
    let stripped = address.trim().trim_start_matches("0x");
    format!("0x{}", stripped.to_lowercase())
}

/// Add two monetary amounts expressed as decimal strings.
///
/// Monetary values never pass through floating point.
pub fn add_amounts(a: &str, b: &str) -> MirrorResult<String> {
    let lhs =
        Decimal::from_str(a).map_err(|_| MirrorError::InvalidAmount(a.to_string()))?;
    let rhs =
        Decimal::from_str(b).map_err(|_| MirrorError::InvalidAmount(b.to_string()))?;
    Ok((lhs + rhs).to_string())
}

/// Subtract one monetary amount from another, both decimal strings.
pub fn sub_amounts(a: &str, b: &str) -> MirrorResult<String> {
    let lhs =
        Decimal::from_str(a).map_err(|_| MirrorError::InvalidAmount(a.to_string()))?;
    let rhs =
        Decimal::from_str(b).map_err(|_| MirrorError::InvalidAmount(b.to_string()))?;
    Ok((lhs - rhs).to_string())
}

/// Validate that a string parses as a decimal amount.
pub fn parse_amount(value: &str) -> MirrorResult<Decimal> {
    Decimal::from_str(value).map_err(|_| MirrorError::InvalidAmount(value.to_string()))
}

/// Deterministic activity id for a ledger event.
///
/// Derived from the transaction hash and log index so redelivery of the
/// same event maps to the same id and upserts as a no-op.
pub fn activity_id(tx_hash: &str, log_index: u32) -> String {
    format!("{}:{}", normalize_address(tx_hash), log_index)
}

// ============================================================================
// Group projections
// ============================================================================

/// Lifecycle status of a group projection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GroupStatus {
    Active,
    Paused,
    Closed,
}

impl fmt::Display for GroupStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroupStatus::Active => write!(f, "active"),
            GroupStatus::Paused => write!(f, "paused"),
            GroupStatus::Closed => write!(f, "closed"),
        }
    }
}

/// Off-chain read model of an on-chain group.
///
/// Created on first sight of a group (event or reconciliation), updated by
/// both the ingester and the reconciler, never deleted, only marked
/// `Closed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupProjection {
    /// Contract address, normalized lower-case. Unique.
    pub address: String,
    pub name: String,
    pub creator: String,
    pub status: GroupStatus,
    /// Aggregates as decimal strings, never floats
    pub total_balance: String,
    pub total_contributions: String,
    pub total_expenses: String,
    pub member_count: u32,
    pub activity_score: u64,
    pub last_activity_ms: u64,
    pub last_synced_block: u64,
}

impl GroupProjection {
    pub fn new(address: &str, name: &str, creator: &str) -> Self {
        Self {
            address: normalize_address(address),
            name: name.to_string(),
            creator: normalize_address(creator),
            status: GroupStatus::Active,
            total_balance: "0".to_string(),
            total_contributions: "0".to_string(),
            total_expenses: "0".to_string(),
            member_count: 0,
            activity_score: 0,
            last_activity_ms: 0,
            last_synced_block: 0,
        }
    }
}

/// Canonical group state as read directly from the chain, bypassing the
/// event stream. The reconciler overwrites projection aggregates with
/// these values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalGroupState {
    pub address: String,
    pub name: String,
    pub creator: String,
    pub status: GroupStatus,
    pub total_balance: String,
    pub total_contributions: String,
    pub total_expenses: String,
    pub member_count: u32,
    pub block_number: u64,
}

// ============================================================================
// Activity records
// ============================================================================

/// Broad category of an activity type, used for privacy defaults and stats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityCategory {
    Membership,
    Financial,
    Governance,
    System,
}

/// Closed enum of activity kinds mirrored into the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActivityType {
    // Membership
    MemberJoined,
    MemberLeft,
    MemberInvited,
    RoleChanged,
    // Financial
    ExpenseRecorded,
    DebtSettled,
    ContributionMade,
    WithdrawalMade,
    // Governance
    ProposalCreated,
    ProposalSigned,
    ProposalExecuted,
    VoteCast,
    // System
    GroupCreated,
    GroupDeactivated,
    SystemAnnouncement,
}

impl ActivityType {
    pub fn category(&self) -> ActivityCategory {
        match self {
            ActivityType::MemberJoined
            | ActivityType::MemberLeft
            | ActivityType::MemberInvited
            | ActivityType::RoleChanged => ActivityCategory::Membership,
            ActivityType::ExpenseRecorded
            | ActivityType::DebtSettled
            | ActivityType::ContributionMade
            | ActivityType::WithdrawalMade => ActivityCategory::Financial,
            ActivityType::ProposalCreated
            | ActivityType::ProposalSigned
            | ActivityType::ProposalExecuted
            | ActivityType::VoteCast => ActivityCategory::Governance,
            ActivityType::GroupCreated
            | ActivityType::GroupDeactivated
            | ActivityType::SystemAnnouncement => ActivityCategory::System,
        }
    }

    /// Stable name for logging and metric labels
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityType::MemberJoined => "member_joined",
            ActivityType::MemberLeft => "member_left",
            ActivityType::MemberInvited => "member_invited",
            ActivityType::RoleChanged => "role_changed",
            ActivityType::ExpenseRecorded => "expense_recorded",
            ActivityType::DebtSettled => "debt_settled",
            ActivityType::ContributionMade => "contribution_made",
            ActivityType::WithdrawalMade => "withdrawal_made",
            ActivityType::ProposalCreated => "proposal_created",
            ActivityType::ProposalSigned => "proposal_signed",
            ActivityType::ProposalExecuted => "proposal_executed",
            ActivityType::VoteCast => "vote_cast",
            ActivityType::GroupCreated => "group_created",
            ActivityType::GroupDeactivated => "group_deactivated",
            ActivityType::SystemAnnouncement => "system_announcement",
        }
    }
}

impl fmt::Display for ActivityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Visibility tier of an activity. Ordering matters: a viewer with
/// ceiling `t` sees every record whose tier is `<= t`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum PrivacyTier {
    Public,
    MembersOnly,
    Private,
}

impl PrivacyTier {
    /// Ceiling for a caller who is not a member of the group
    pub fn non_member() -> Self {
        PrivacyTier::Public
    }

    /// Ceiling for a regular member
    pub fn member() -> Self {
        PrivacyTier::MembersOnly
    }

    /// Ceiling for a group admin
    pub fn admin() -> Self {
        PrivacyTier::Private
    }
}

/// Processing status of an activity record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActivityStatus {
    Pending,
    Completed,
    Failed,
    Cancelled,
}

/// Free-form metadata carried by an activity record
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityMetadata {
    pub amount: Option<String>,
    pub currency: Option<String>,
    pub description: Option<String>,
    pub tx_hash: Option<String>,
    pub block_number: Option<u64>,
    pub proposal_id: Option<String>,
    pub vote_count: Option<u32>,
    pub role_from: Option<String>,
    pub role_to: Option<String>,
    pub tags: Vec<String>,
}

/// A comment appended to an activity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub author: String,
    pub body: String,
    pub timestamp_ms: u64,
}

/// Immutable activity record plus its mutable interaction counters.
///
/// Core fields never change after creation; only `view_count`,
/// `reactions`, and `comments` are mutated, and only through
/// `ActivityProjectionStore::record_interaction`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityRecord {
    pub id: String,
    pub activity_type: ActivityType,
    pub group_address: String,
    pub actor: String,
    pub target: Option<String>,
    pub metadata: ActivityMetadata,
    pub privacy: PrivacyTier,
    pub status: ActivityStatus,
    pub timestamp_ms: u64,
    pub view_count: u64,
    /// One reaction per actor; a second reaction from the same actor
    /// replaces the first
    pub reactions: HashMap<String, String>,
    pub comments: Vec<Comment>,
}

impl ActivityRecord {
    pub fn new(
        id: &str,
        activity_type: ActivityType,
        group_address: &str,
        actor: &str,
        timestamp_ms: u64,
    ) -> Self {
        Self {
            id: id.to_string(),
            activity_type,
            group_address: normalize_address(group_address),
            actor: normalize_address(actor),
            target: None,
            metadata: ActivityMetadata::default(),
            privacy: PrivacyTier::MembersOnly,
            status: ActivityStatus::Completed,
            timestamp_ms,
            view_count: 0,
            reactions: HashMap::new(),
            comments: Vec::new(),
        }
    }

    pub fn with_target(mut self, target: &str) -> Self {
        self.target = Some(normalize_address(target));
        self
    }

    pub fn with_privacy(mut self, privacy: PrivacyTier) -> Self {
        self.privacy = privacy;
        self
    }

    pub fn with_metadata(mut self, metadata: ActivityMetadata) -> Self {
        self.metadata = metadata;
        self
    }
}

// ============================================================================
// Ledger events
// ============================================================================

/// Common envelope for every event observed on chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub tx_hash: String,
    pub log_index: u32,
    pub block_number: u64,
    pub timestamp_ms: u64,
}

/// Events emitted by the group factory and per-group contracts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerEvent {
    GroupCreated {
        envelope: EventEnvelope,
        group_address: String,
        name: String,
        creator: String,
    },
    GroupDeactivated {
        envelope: EventEnvelope,
        group_address: String,
        actor: String,
    },
    MemberAdded {
        envelope: EventEnvelope,
        group_address: String,
        member: String,
        added_by: String,
    },
    MemberRemoved {
        envelope: EventEnvelope,
        group_address: String,
        member: String,
        removed_by: String,
    },
    ExpenseRecorded {
        envelope: EventEnvelope,
        group_address: String,
        payer: String,
        amount: String,
        currency: String,
        description: String,
    },
    DebtSettled {
        envelope: EventEnvelope,
        group_address: String,
        debtor: String,
        creditor: String,
        amount: String,
        currency: String,
    },
}

impl LedgerEvent {
    pub fn envelope(&self) -> &EventEnvelope {
        match self {
            LedgerEvent::GroupCreated { envelope, .. }
            | LedgerEvent::GroupDeactivated { envelope, .. }
            | LedgerEvent::MemberAdded { envelope, .. }
            | LedgerEvent::MemberRemoved { envelope, .. }
            | LedgerEvent::ExpenseRecorded { envelope, .. }
            | LedgerEvent::DebtSettled { envelope, .. } => envelope,
        }
    }

    pub fn group_address(&self) -> &str {
        match self {
            LedgerEvent::GroupCreated { group_address, .. }
            | LedgerEvent::GroupDeactivated { group_address, .. }
            | LedgerEvent::MemberAdded { group_address, .. }
            | LedgerEvent::MemberRemoved { group_address, .. }
            | LedgerEvent::ExpenseRecorded { group_address, .. }
            | LedgerEvent::DebtSettled { group_address, .. } => group_address,
        }
    }

    pub fn block_number(&self) -> u64 {
        self.envelope().block_number
    }

    /// Stable event identity, shared with the derived activity record
    pub fn event_id(&self) -> String {
        let env = self.envelope();
        activity_id(&env.tx_hash, env.log_index)
    }

    /// Event type name for logging
    pub fn type_name(&self) -> &'static str {
        match self {
            LedgerEvent::GroupCreated { .. } => "group_created",
            LedgerEvent::GroupDeactivated { .. } => "group_deactivated",
            LedgerEvent::MemberAdded { .. } => "member_added",
            LedgerEvent::MemberRemoved { .. } => "member_removed",
            LedgerEvent::ExpenseRecorded { .. } => "expense_recorded",
            LedgerEvent::DebtSettled { .. } => "debt_settled",
        }
    }
}

// ============================================================================
// Proposals
// ============================================================================

/// Status of a fund-transfer proposal.
///
/// `Rejected` is declared for wire completeness; no operation currently
/// transitions into it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProposalStatus {
    Pending,
    Approved,
    Executed,
    Rejected,
}

impl fmt::Display for ProposalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProposalStatus::Pending => write!(f, "pending"),
            ProposalStatus::Approved => write!(f, "approved"),
            ProposalStatus::Executed => write!(f, "executed"),
            ProposalStatus::Rejected => write!(f, "rejected"),
        }
    }
}

/// A single member signature on a proposal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalSignature {
    pub signer: String,
    pub signed_at_ms: u64,
    pub confirmed_on_chain: bool,
}

/// A pending multi-party-approved instruction to move funds.
///
/// The signature count is always derived from the signature list; it is
/// never stored independently. All status transitions flow through the
/// methods below, which both the coordinator and the shadow store use.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proposal {
    pub id: String,
    pub group_address: String,
    pub proposer: String,
    pub destination: String,
    pub amount: String,
    pub description: String,
    pub status: ProposalStatus,
    pub required_signatures: u32,
    pub signatures: Vec<ProposalSignature>,
    pub executed_tx_id: Option<String>,
    pub executed_at_ms: Option<u64>,
    pub created_at_ms: u64,
}

impl Proposal {
    pub fn new(
        id: &str,
        group_address: &str,
        proposer: &str,
        destination: &str,
        amount: &str,
        description: &str,
        required_signatures: u32,
        created_at_ms: u64,
    ) -> Self {
        Self {
            id: id.to_string(),
            group_address: normalize_address(group_address),
            proposer: normalize_address(proposer),
            destination: normalize_address(destination),
            amount: amount.to_string(),
            description: description.to_string(),
            status: ProposalStatus::Pending,
            required_signatures,
            signatures: Vec::new(),
            executed_tx_id: None,
            executed_at_ms: None,
            created_at_ms,
        }
    }

    /// Derived signature count, always `signatures.len()`
    pub fn signature_count(&self) -> usize {
        self.signatures.len()
    }

    pub fn is_shadow(&self) -> bool {
        self.id.starts_with(SHADOW_ID_PREFIX)
    }

    /// Append a signature and promote to `Approved` at threshold.
    ///
    /// Rejects duplicates from the same signer without touching the list.
    pub fn apply_sign(&mut self, signer: &str, now_ms: u64) -> MirrorResult<()> {
        if self.status != ProposalStatus::Pending {
            return Err(MirrorError::InvalidState(format!(
                "proposal {} is {}, expected pending",
                self.id, self.status
            )));
        }
        let signer = normalize_address(signer);
        if self.signatures.iter().any(|s| s.signer == signer) {
            return Err(MirrorError::DuplicateSignature(signer));
        }
        self.signatures.push(ProposalSignature {
            signer,
            signed_at_ms: now_ms,
            confirmed_on_chain: false,
        });
        if self.signature_count() >= self.required_signatures as usize {
            self.status = ProposalStatus::Approved;
        }
        Ok(())
    }

    /// Remove the signer's signature if present and demote `Approved`
    /// back to `Pending` below threshold.
    pub fn apply_revoke(&mut self, signer: &str) -> MirrorResult<()> {
        if self.status == ProposalStatus::Executed {
            return Err(MirrorError::InvalidState(format!(
                "proposal {} is executed",
                self.id
            )));
        }
        let signer = normalize_address(signer);
        self.signatures.retain(|s| s.signer != signer);
        if self.status == ProposalStatus::Approved
            && self.signature_count() < self.required_signatures as usize
        {
            self.status = ProposalStatus::Pending;
        }
        Ok(())
    }

    /// Mark the proposal executed. Terminal: forbids further mutation.
    pub fn apply_execute(&mut self, tx_id: &str, now_ms: u64) -> MirrorResult<()> {
        if self.status != ProposalStatus::Approved {
            return Err(MirrorError::InvalidState(format!(
                "proposal {} is {}, expected approved",
                self.id, self.status
            )));
        }
        self.status = ProposalStatus::Executed;
        self.executed_tx_id = Some(tx_id.to_string());
        self.executed_at_ms = Some(now_ms);
        Ok(())
    }
}
