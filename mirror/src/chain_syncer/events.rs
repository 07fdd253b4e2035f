// Copyright (c) Circle Ledger Contributors
// SPDX-License-Identifier: Apache-2.0

//! Events emitted by the chain syncer.
//!
//! These are pure data; the ingester consumes them without any coupling
//! to the syncer's task structure.

use crate::chain_client::EventScope;
use crate::types::LedgerEvent;

#[derive(Debug, Clone, PartialEq)]
pub enum SyncerEvent {
    /// Syncer started
    Started { chain: String, from_block: u64 },

    /// Events fetched for a scope in an inclusive block range
    Events {
        scope: EventScope,
        start_block: u64,
        end_block: u64,
        events: Vec<LedgerEvent>,
    },

    /// New chain head observed
    HeadUpdated { height: u64 },

    /// A scope's cursor reached the chain head
    CaughtUp { scope: EventScope, height: u64 },

    /// Non-fatal sync failure; the reconciler heals whatever was missed
    SyncError {
        scope: Option<EventScope>,
        error: String,
        recoverable: bool,
    },

    /// Syncer stopped
    Stopped { reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_events_compare_by_content() {
        let a = SyncerEvent::HeadUpdated { height: 5 };
        let b = SyncerEvent::HeadUpdated { height: 5 };
        let c = SyncerEvent::HeadUpdated { height: 6 };
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_sync_error_carries_scope() {
        let err = SyncerEvent::SyncError {
            scope: Some(EventScope::Groups),
            error: "fetch failed".to_string(),
            recoverable: true,
        };
        match err {
            SyncerEvent::SyncError { scope, recoverable, .. } => {
                assert_eq!(scope, Some(EventScope::Groups));
                assert!(recoverable);
            }
            _ => panic!("expected SyncError"),
        }
    }
}
