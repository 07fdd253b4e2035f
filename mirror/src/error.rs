// Copyright (c) Circle Ledger Contributors
// SPDX-License-Identifier: Apache-2.0

/// Domain errors for the mirror and proposal subsystems.
///
/// Every failure crossing a component boundary is re-expressed as one of
/// these kinds; raw transport/driver errors never leak out unwrapped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MirrorError {
    // Chain RPC or network is down; callers degrade and rely on reconciliation
    ChainUnavailable(String),
    // An outbound call exceeded its bounded timeout
    Timeout(String),
    // Unique-constraint collision on an activity id
    DuplicateRecord(String),
    // Signer already present on the proposal
    DuplicateSignature(String),
    // Proposal id is unknown
    ProposalNotFound(String),
    // Group projection/canonical group is unknown
    GroupNotFound(String),
    // Activity id is unknown
    ActivityNotFound(String),
    // Operation not permitted in the proposal's current status
    InvalidState(String),
    // Caller's privacy tier does not admit the record
    Unauthorized,
    // Monetary value is not a valid decimal string
    InvalidAmount(String),
    // Storage layer failure
    StorageError(String),
    // Failure to serialize/deserialize
    SerializationError(String),
    // Internal invariant violation
    InternalError(String),
}

impl MirrorError {
    /// Returns a short string identifying the error type for metrics labels
    pub fn error_type(&self) -> &'static str {
        match self {
            MirrorError::ChainUnavailable(_) => "chain_unavailable",
            MirrorError::Timeout(_) => "timeout",
            MirrorError::DuplicateRecord(_) => "duplicate_record",
            MirrorError::DuplicateSignature(_) => "duplicate_signature",
            MirrorError::ProposalNotFound(_) => "proposal_not_found",
            MirrorError::GroupNotFound(_) => "group_not_found",
            MirrorError::ActivityNotFound(_) => "activity_not_found",
            MirrorError::InvalidState(_) => "invalid_state",
            MirrorError::Unauthorized => "unauthorized",
            MirrorError::InvalidAmount(_) => "invalid_amount",
            MirrorError::StorageError(_) => "storage_error",
            MirrorError::SerializationError(_) => "serialization_error",
            MirrorError::InternalError(_) => "internal_error",
        }
    }

    /// Whether the resilient client should fall back to the shadow store
    /// for this error. Only transport-class failures qualify; domain
    /// errors must propagate unchanged.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            MirrorError::ChainUnavailable(_)
                | MirrorError::Timeout(_)
                | MirrorError::StorageError(_)
        )
    }
}

impl std::fmt::Display for MirrorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MirrorError::ChainUnavailable(msg) => write!(f, "chain unavailable: {}", msg),
            MirrorError::Timeout(msg) => write!(f, "timed out: {}", msg),
            MirrorError::DuplicateRecord(id) => write!(f, "duplicate record: {}", id),
            MirrorError::DuplicateSignature(signer) => {
                write!(f, "duplicate signature from {}", signer)
            }
            MirrorError::ProposalNotFound(id) => write!(f, "proposal not found: {}", id),
            MirrorError::GroupNotFound(addr) => write!(f, "group not found: {}", addr),
            MirrorError::ActivityNotFound(id) => write!(f, "activity not found: {}", id),
            MirrorError::InvalidState(msg) => write!(f, "invalid state: {}", msg),
            MirrorError::Unauthorized => write!(f, "unauthorized"),
            MirrorError::InvalidAmount(v) => write!(f, "invalid amount: {}", v),
            MirrorError::StorageError(msg) => write!(f, "storage error: {}", msg),
            MirrorError::SerializationError(msg) => write!(f, "serialization error: {}", msg),
            MirrorError::InternalError(msg) => write!(f, "internal error: {}", msg),
        }
    }
}

impl std::error::Error for MirrorError {}

pub type MirrorResult<T> = Result<T, MirrorError>;
