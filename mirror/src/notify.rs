// Copyright (c) Circle Ledger Contributors
// SPDX-License-Identifier: Apache-2.0

//! Fire-and-forget notification seam.
//!
//! Delivery mechanics live outside the core; only the boolean outcome is
//! consumed, and failures are logged, never propagated.

use async_trait::async_trait;
use tracing::debug;

#[async_trait]
pub trait NotificationSender: Send + Sync {
    /// Send a notification. Returns whether delivery succeeded.
    async fn notify(&self, subject: &str, body: &str) -> bool;
}

/// Sender that drops every notification. Default for tests and for nodes
/// run without a configured notifier.
pub struct NoopNotifier;

#[async_trait]
impl NotificationSender for NoopNotifier {
    async fn notify(&self, subject: &str, _body: &str) -> bool {
        debug!("[Notify] Dropping notification: {}", subject);
        true
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_noop_notifier_reports_success() {
        assert!(NoopNotifier.notify("subject", "body").await);
    }
}
