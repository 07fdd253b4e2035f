// Copyright (c) Circle Ledger Contributors
// SPDX-License-Identifier: Apache-2.0

//! Activity projection store.
//!
//! The only write path for activity records and group projections. A
//! single RwLock guards both maps so every mutation that touches an
//! activity and its group's aggregates lands atomically, keeping the
//! activity-score invariant observable at all times.

use crate::error::{MirrorError, MirrorResult};
use crate::types::{
    add_amounts, normalize_address, sub_amounts, ActivityRecord, CanonicalGroupState,
    GroupProjection, GroupStatus, PrivacyTier,
};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Filters and pagination for activity queries
#[derive(Debug, Clone)]
pub struct ActivityQuery {
    pub activity_type: Option<crate::types::ActivityType>,
    pub since_ms: Option<u64>,
    /// 1-based page number
    pub page: usize,
    pub limit: usize,
}

impl Default for ActivityQuery {
    fn default() -> Self {
        Self {
            activity_type: None,
            since_ms: None,
            page: 1,
            limit: 20,
        }
    }
}

/// One page of query results with pagination totals
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: usize,
    pub total_pages: usize,
    pub page: usize,
    pub limit: usize,
}

/// Interaction applied to an existing activity record
#[derive(Debug, Clone)]
pub enum Interaction {
    /// Increment the view counter
    View,
    /// Add or replace the actor's reaction (one per actor, last write wins)
    Reaction { actor: String, emoji: String },
    /// Append a comment
    Comment {
        author: String,
        body: String,
        timestamp_ms: u64,
    },
}

/// Outcome of a bulk ingest
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub accepted: usize,
    pub skipped: usize,
}

/// Per-window activity statistics
#[derive(Debug, Clone, Default)]
pub struct ActivityStats {
    pub total: usize,
    pub by_type: HashMap<&'static str, usize>,
    pub latest_ms: Option<u64>,
}

/// Projection update applied together with a ledger-derived activity
#[derive(Debug, Clone)]
pub enum ProjectionEffect {
    CreateGroup { name: String, creator: String },
    CloseGroup,
    MemberDelta(i32),
    Expense { amount: String },
    Settlement { amount: String },
    None,
}

#[derive(Default)]
struct StoreInner {
    activities: HashMap<String, ActivityRecord>,
    groups: HashMap<String, GroupProjection>,
}

impl StoreInner {
    /// Get or create the projection for a group seen for the first time.
    /// Placeholder name/creator get overwritten by the next
    /// reconciliation pass or GroupCreated event.
    fn group_entry(&mut self, address: &str) -> &mut GroupProjection {
        self.groups
            .entry(address.to_string())
            .or_insert_with(|| GroupProjection::new(address, "", ""))
    }

    /// Insert one activity and bump its group's score/last-activity.
    /// Returns false if the id already exists (no-op).
    fn insert_activity(&mut self, record: ActivityRecord, block_number: Option<u64>) -> bool {
        if self.activities.contains_key(&record.id) {
            return false;
        }
        let group_address = record.group_address.clone();
        let timestamp_ms = record.timestamp_ms;
        self.activities.insert(record.id.clone(), record);

        let group = self.group_entry(&group_address);
        group.activity_score += 1;
        group.last_activity_ms = group.last_activity_ms.max(timestamp_ms);
        if let Some(block) = block_number {
            group.last_synced_block = group.last_synced_block.max(block);
        }
        true
    }

    fn apply_effect(&mut self, address: &str, effect: ProjectionEffect) -> MirrorResult<()> {
        match effect {
            ProjectionEffect::CreateGroup { name, creator } => {
                let group = self.group_entry(address);
                group.name = name;
                group.creator = normalize_address(&creator);
                group.status = GroupStatus::Active;
            }
            ProjectionEffect::CloseGroup => {
                self.group_entry(address).status = GroupStatus::Closed;
            }
            ProjectionEffect::MemberDelta(delta) => {
                let group = self.group_entry(address);
                group.member_count = if delta >= 0 {
                    group.member_count.saturating_add(delta as u32)
                } else {
                    group.member_count.saturating_sub((-delta) as u32)
                };
            }
            ProjectionEffect::Expense { amount } => {
                let group = self.group_entry(address);
                group.total_expenses = add_amounts(&group.total_expenses, &amount)?;
                group.total_balance = sub_amounts(&group.total_balance, &amount)?;
            }
            ProjectionEffect::Settlement { amount } => {
                let group = self.group_entry(address);
                group.total_contributions =
                    add_amounts(&group.total_contributions, &amount)?;
                group.total_balance = add_amounts(&group.total_balance, &amount)?;
            }
            ProjectionEffect::None => {}
        }
        Ok(())
    }
}

/// Queryable, privacy-filtered view of activity history plus the group
/// projections both sync paths write to.
pub struct ActivityProjectionStore {
    inner: RwLock<StoreInner>,
}

impl ActivityProjectionStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(StoreInner::default()),
        }
    }

    // ------------------------------------------------------------------
    // Writes (ingester / reconciler / direct API)
    // ------------------------------------------------------------------

    /// Insert a ledger-derived activity and apply its projection effect
    /// in one atomic step. A duplicate id is a no-op upsert: no score
    /// bump, no effect, `Ok(false)`.
    pub async fn ingest_ledger_activity(
        &self,
        record: ActivityRecord,
        effect: ProjectionEffect,
        block_number: u64,
    ) -> MirrorResult<bool> {
        let mut inner = self.inner.write().await;
        let id = record.id.clone();
        let group_address = record.group_address.clone();
        if !inner.insert_activity(record, Some(block_number)) {
            debug!("[Store] Duplicate activity {} skipped", id);
            return Ok(false);
        }
        // The effect validates amounts; a bad amount must not leave the
        // activity behind with half-applied aggregates.
        if let Err(e) = inner.apply_effect(&group_address, effect) {
            inner.activities.remove(&id);
            let group = inner.group_entry(&group_address);
            group.activity_score = group.activity_score.saturating_sub(1);
            return Err(e);
        }
        Ok(true)
    }

    /// Insert a single activity supplied through the direct API.
    pub async fn insert_activity(&self, record: ActivityRecord) -> MirrorResult<()> {
        let mut inner = self.inner.write().await;
        let id = record.id.clone();
        if inner.insert_activity(record, None) {
            Ok(())
        } else {
            Err(MirrorError::DuplicateRecord(id))
        }
    }

    /// Bulk ingest tolerating partial unique-constraint violations: the
    /// non-duplicate subset commits, and each group's activity score
    /// increases by its count of accepted records only.
    pub async fn bulk_ingest(&self, records: Vec<ActivityRecord>) -> IngestReport {
        let mut inner = self.inner.write().await;
        let mut report = IngestReport::default();
        let total = records.len();
        for record in records {
            if inner.insert_activity(record, None) {
                report.accepted += 1;
            } else {
                report.skipped += 1;
            }
        }
        info!(
            "[Store] Bulk ingest: {}/{} accepted, {} duplicates skipped",
            report.accepted, total, report.skipped
        );
        report
    }

    /// Record an interaction without touching the immutable core fields.
    pub async fn record_interaction(
        &self,
        activity_id: &str,
        interaction: Interaction,
    ) -> MirrorResult<()> {
        let mut inner = self.inner.write().await;
        let record = inner
            .activities
            .get_mut(activity_id)
            .ok_or_else(|| MirrorError::ActivityNotFound(activity_id.to_string()))?;
        match interaction {
            Interaction::View => {
                record.view_count += 1;
            }
            Interaction::Reaction { actor, emoji } => {
                record.reactions.insert(normalize_address(&actor), emoji);
            }
            Interaction::Comment {
                author,
                body,
                timestamp_ms,
            } => {
                record.comments.push(crate::types::Comment {
                    author: normalize_address(&author),
                    body,
                    timestamp_ms,
                });
            }
        }
        Ok(())
    }

    /// Overwrite a projection's aggregate fields with canonical chain
    /// state, creating the projection if absent. Event-derived fields
    /// (activity score, last activity) are preserved.
    pub async fn apply_canonical_state(
        &self,
        state: &CanonicalGroupState,
    ) -> GroupProjection {
        let mut inner = self.inner.write().await;
        let address = normalize_address(&state.address);
        let group = inner.group_entry(&address);
        group.name = state.name.clone();
        group.creator = normalize_address(&state.creator);
        group.status = state.status;
        group.total_balance = state.total_balance.clone();
        group.total_contributions = state.total_contributions.clone();
        group.total_expenses = state.total_expenses.clone();
        group.member_count = state.member_count;
        group.last_synced_block = group.last_synced_block.max(state.block_number);
        let projection = group.clone();
        debug!(
            "[Store] Canonical state applied for {} at block {}",
            address, state.block_number
        );
        projection
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Activities for one group, filtered by the caller's privacy ceiling
    /// and sorted by timestamp descending. Records above the ceiling are
    /// silently filtered, never surfaced as errors.
    pub async fn query_by_group(
        &self,
        address: &str,
        viewer_ceiling: PrivacyTier,
        query: &ActivityQuery,
    ) -> Page<ActivityRecord> {
        let address = normalize_address(address);
        let inner = self.inner.read().await;
        let matches: Vec<&ActivityRecord> = inner
            .activities
            .values()
            .filter(|a| a.group_address == address)
            .filter(|a| a.privacy <= viewer_ceiling)
            .filter(|a| {
                query
                    .activity_type
                    .map(|t| a.activity_type == t)
                    .unwrap_or(true)
            })
            .filter(|a| query.since_ms.map(|s| a.timestamp_ms >= s).unwrap_or(true))
            .collect();
        paginate(matches, query)
    }

    /// Union query over actor and target identity fields.
    pub async fn query_by_actor_or_target(
        &self,
        identity: &str,
        query: &ActivityQuery,
    ) -> Page<ActivityRecord> {
        let identity = normalize_address(identity);
        let inner = self.inner.read().await;
        let matches: Vec<&ActivityRecord> = inner
            .activities
            .values()
            .filter(|a| a.actor == identity || a.target.as_deref() == Some(&identity))
            .filter(|a| {
                query
                    .activity_type
                    .map(|t| a.activity_type == t)
                    .unwrap_or(true)
            })
            .filter(|a| query.since_ms.map(|s| a.timestamp_ms >= s).unwrap_or(true))
            .collect();
        paginate(matches, query)
    }

    /// Per-type counts, total count, and most recent timestamp over a
    /// window.
    pub async fn aggregate_stats(
        &self,
        address: &str,
        since_ms: Option<u64>,
    ) -> ActivityStats {
        let address = normalize_address(address);
        let inner = self.inner.read().await;
        let mut stats = ActivityStats::default();
        for activity in inner.activities.values() {
            if activity.group_address != address {
                continue;
            }
            if let Some(since) = since_ms {
                if activity.timestamp_ms < since {
                    continue;
                }
            }
            stats.total += 1;
            *stats
                .by_type
                .entry(activity.activity_type.as_str())
                .or_insert(0) += 1;
            stats.latest_ms = Some(
                stats
                    .latest_ms
                    .map_or(activity.timestamp_ms, |l| l.max(activity.timestamp_ms)),
            );
        }
        stats
    }

    pub async fn get_activity(&self, id: &str) -> Option<ActivityRecord> {
        let inner = self.inner.read().await;
        inner.activities.get(id).cloned()
    }

    pub async fn get_group(&self, address: &str) -> Option<GroupProjection> {
        let inner = self.inner.read().await;
        inner.groups.get(&normalize_address(address)).cloned()
    }

    pub async fn list_groups(&self) -> Vec<GroupProjection> {
        let inner = self.inner.read().await;
        let mut groups: Vec<GroupProjection> = inner.groups.values().cloned().collect();
        groups.sort_by(|a, b| a.address.cmp(&b.address));
        groups
    }

    pub async fn group_count(&self) -> usize {
        self.inner.read().await.groups.len()
    }

    pub async fn activity_count(&self) -> usize {
        self.inner.read().await.activities.len()
    }
}

impl Default for ActivityProjectionStore {
    fn default() -> Self {
        Self::new()
    }
}

fn paginate(mut matches: Vec<&ActivityRecord>, query: &ActivityQuery) -> Page<ActivityRecord> {
    // Timestamp descending, id as tiebreak for a stable order
    matches.sort_by(|a, b| {
        b.timestamp_ms
            .cmp(&a.timestamp_ms)
            .then_with(|| a.id.cmp(&b.id))
    });

    if query.limit == 0 {
        warn!("[Store] Query with limit=0 coerced to 1");
    }
    let limit = query.limit.max(1);
    let page = query.page.max(1);
    let total = matches.len();
    let total_pages = (total + limit - 1) / limit;

    let items = matches
        .into_iter()
        .skip((page - 1) * limit)
        .take(limit)
        .cloned()
        .collect();

    Page {
        items,
        total,
        total_pages,
        page,
        limit,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ActivityStatus, ActivityType};

    fn record(id: &str, group: &str, ts: u64) -> ActivityRecord {
        ActivityRecord::new(id, ActivityType::ExpenseRecorded, group, "0xactor", ts)
    }

    #[tokio::test]
    async fn test_insert_activity_rejects_duplicate_id() {
        let store = ActivityProjectionStore::new();
        store.insert_activity(record("a1", "0xg", 1)).await.unwrap();
        let err = store
            .insert_activity(record("a1", "0xg", 2))
            .await
            .unwrap_err();
        assert!(matches!(err, MirrorError::DuplicateRecord(_)));
        assert_eq!(store.activity_count().await, 1);
    }

    #[tokio::test]
    async fn test_bulk_ingest_skips_duplicates_and_scores_accepted_only() {
        let store = ActivityProjectionStore::new();
        // Batch [a1, a2, a1] against an empty store: 2 stored, score +2
        let report = store
            .bulk_ingest(vec![
                record("a1", "0xg", 1),
                record("a2", "0xg", 2),
                record("a1", "0xg", 3),
            ])
            .await;
        assert_eq!(
            report,
            IngestReport {
                accepted: 2,
                skipped: 1
            }
        );
        assert_eq!(store.activity_count().await, 2);
        let group = store.get_group("0xg").await.unwrap();
        assert_eq!(group.activity_score, 2);
    }

    #[tokio::test]
    async fn test_bulk_ingest_against_existing_records() {
        let store = ActivityProjectionStore::new();
        store.insert_activity(record("a1", "0xg", 1)).await.unwrap();
        store.insert_activity(record("a2", "0xg", 2)).await.unwrap();

        // N=4 submitted, M=2 collide: exactly N-M new records, score +2
        let report = store
            .bulk_ingest(vec![
                record("a1", "0xg", 1),
                record("a2", "0xg", 2),
                record("a3", "0xg", 3),
                record("a4", "0xg", 4),
            ])
            .await;
        assert_eq!(report.accepted, 2);
        assert_eq!(report.skipped, 2);
        assert_eq!(store.activity_count().await, 4);
        assert_eq!(store.get_group("0xg").await.unwrap().activity_score, 4);
    }

    #[tokio::test]
    async fn test_privacy_ceiling_filters_by_role() {
        let store = ActivityProjectionStore::new();
        store
            .insert_activity(record("pub", "0xg", 1).with_privacy(PrivacyTier::Public))
            .await
            .unwrap();
        store
            .insert_activity(record("mem", "0xg", 2).with_privacy(PrivacyTier::MembersOnly))
            .await
            .unwrap();
        store
            .insert_activity(record("prv", "0xg", 3).with_privacy(PrivacyTier::Private))
            .await
            .unwrap();

        let query = ActivityQuery::default();
        let non_member = store
            .query_by_group("0xg", PrivacyTier::non_member(), &query)
            .await;
        let member = store
            .query_by_group("0xg", PrivacyTier::member(), &query)
            .await;
        let admin = store
            .query_by_group("0xg", PrivacyTier::admin(), &query)
            .await;

        assert_eq!(non_member.total, 1);
        assert_eq!(member.total, 2);
        assert_eq!(admin.total, 3);
    }

    #[tokio::test]
    async fn test_query_sorts_descending_and_paginates() {
        let store = ActivityProjectionStore::new();
        for i in 1..=5u64 {
            store
                .insert_activity(
                    record(&format!("a{}", i), "0xg", i * 10)
                        .with_privacy(PrivacyTier::Public),
                )
                .await
                .unwrap();
        }

        let page1 = store
            .query_by_group(
                "0xg",
                PrivacyTier::admin(),
                &ActivityQuery {
                    page: 1,
                    limit: 2,
                    ..Default::default()
                },
            )
            .await;
        assert_eq!(page1.total, 5);
        assert_eq!(page1.total_pages, 3);
        let ids: Vec<&str> = page1.items.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["a5", "a4"]);

        let page3 = store
            .query_by_group(
                "0xg",
                PrivacyTier::admin(),
                &ActivityQuery {
                    page: 3,
                    limit: 2,
                    ..Default::default()
                },
            )
            .await;
        assert_eq!(page3.items.len(), 1);
        assert_eq!(page3.items[0].id, "a1");
    }

    #[tokio::test]
    async fn test_query_filters_type_and_since() {
        let store = ActivityProjectionStore::new();
        store
            .insert_activity(record("exp", "0xg", 10))
            .await
            .unwrap();
        store
            .insert_activity(ActivityRecord::new(
                "join",
                ActivityType::MemberJoined,
                "0xg",
                "0xactor",
                20,
            ))
            .await
            .unwrap();

        let typed = store
            .query_by_group(
                "0xg",
                PrivacyTier::admin(),
                &ActivityQuery {
                    activity_type: Some(ActivityType::MemberJoined),
                    ..Default::default()
                },
            )
            .await;
        assert_eq!(typed.total, 1);
        assert_eq!(typed.items[0].id, "join");

        let recent = store
            .query_by_group(
                "0xg",
                PrivacyTier::admin(),
                &ActivityQuery {
                    since_ms: Some(15),
                    ..Default::default()
                },
            )
            .await;
        assert_eq!(recent.total, 1);
        assert_eq!(recent.items[0].id, "join");
    }

    #[tokio::test]
    async fn test_query_by_actor_or_target_union() {
        let store = ActivityProjectionStore::new();
        store
            .insert_activity(ActivityRecord::new(
                "as-actor",
                ActivityType::ExpenseRecorded,
                "0xg",
                "0xalice",
                10,
            ))
            .await
            .unwrap();
        store
            .insert_activity(
                ActivityRecord::new("as-target", ActivityType::MemberJoined, "0xg", "0xbob", 20)
                    .with_target("0xALICE"),
            )
            .await
            .unwrap();
        store
            .insert_activity(ActivityRecord::new(
                "other",
                ActivityType::DebtSettled,
                "0xg",
                "0xcarol",
                30,
            ))
            .await
            .unwrap();

        let page = store
            .query_by_actor_or_target("0xAlice", &ActivityQuery::default())
            .await;
        assert_eq!(page.total, 2);
        let ids: Vec<&str> = page.items.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["as-target", "as-actor"]);
    }

    #[tokio::test]
    async fn test_record_interaction_reaction_last_write_wins() {
        let store = ActivityProjectionStore::new();
        store.insert_activity(record("a1", "0xg", 1)).await.unwrap();

        store
            .record_interaction(
                "a1",
                Interaction::Reaction {
                    actor: "0xAlice".to_string(),
                    emoji: "👍".to_string(),
                },
            )
            .await
            .unwrap();
        store
            .record_interaction(
                "a1",
                Interaction::Reaction {
                    actor: "0xalice".to_string(),
                    emoji: "🎉".to_string(),
                },
            )
            .await
            .unwrap();

        let activity = store.get_activity("a1").await.unwrap();
        assert_eq!(activity.reactions.len(), 1);
        assert_eq!(activity.reactions.get("0xalice").map(String::as_str), Some("🎉"));
    }

    #[tokio::test]
    async fn test_record_interaction_views_and_comments() {
        let store = ActivityProjectionStore::new();
        store.insert_activity(record("a1", "0xg", 1)).await.unwrap();

        store.record_interaction("a1", Interaction::View).await.unwrap();
        store.record_interaction("a1", Interaction::View).await.unwrap();
        store
            .record_interaction(
                "a1",
                Interaction::Comment {
                    author: "0xbob".to_string(),
                    body: "nice".to_string(),
                    timestamp_ms: 99,
                },
            )
            .await
            .unwrap();

        let activity = store.get_activity("a1").await.unwrap();
        assert_eq!(activity.view_count, 2);
        assert_eq!(activity.comments.len(), 1);
        assert_eq!(activity.comments[0].author, "0xbob");

        // Core fields untouched
        assert_eq!(activity.status, ActivityStatus::Completed);
        assert_eq!(activity.timestamp_ms, 1);
    }

    #[tokio::test]
    async fn test_record_interaction_unknown_activity() {
        let store = ActivityProjectionStore::new();
        let err = store
            .record_interaction("missing", Interaction::View)
            .await
            .unwrap_err();
        assert!(matches!(err, MirrorError::ActivityNotFound(_)));
    }

    #[tokio::test]
    async fn test_aggregate_stats_windowed() {
        let store = ActivityProjectionStore::new();
        store.insert_activity(record("a1", "0xg", 10)).await.unwrap();
        store.insert_activity(record("a2", "0xg", 20)).await.unwrap();
        store
            .insert_activity(ActivityRecord::new(
                "a3",
                ActivityType::MemberJoined,
                "0xg",
                "0xactor",
                30,
            ))
            .await
            .unwrap();

        let all = store.aggregate_stats("0xg", None).await;
        assert_eq!(all.total, 3);
        assert_eq!(all.by_type.get("expense_recorded"), Some(&2));
        assert_eq!(all.by_type.get("member_joined"), Some(&1));
        assert_eq!(all.latest_ms, Some(30));

        let windowed = store.aggregate_stats("0xg", Some(15)).await;
        assert_eq!(windowed.total, 2);
        assert_eq!(windowed.by_type.get("expense_recorded"), Some(&1));
    }

    #[tokio::test]
    async fn test_ingest_ledger_activity_is_idempotent() {
        let store = ActivityProjectionStore::new();
        let inserted = store
            .ingest_ledger_activity(
                record("0xtx:0", "0xg", 5),
                ProjectionEffect::Expense {
                    amount: "10.00".to_string(),
                },
                7,
            )
            .await
            .unwrap();
        assert!(inserted);

        // Redelivery of the same event is a no-op upsert
        let inserted = store
            .ingest_ledger_activity(
                record("0xtx:0", "0xg", 5),
                ProjectionEffect::Expense {
                    amount: "10.00".to_string(),
                },
                7,
            )
            .await
            .unwrap();
        assert!(!inserted);

        let group = store.get_group("0xg").await.unwrap();
        assert_eq!(group.activity_score, 1);
        assert_eq!(group.total_expenses, "10.00");
        assert_eq!(group.total_balance, "-10.00");
        assert_eq!(group.last_synced_block, 7);
        assert_eq!(group.last_activity_ms, 5);
    }

    #[tokio::test]
    async fn test_ingest_ledger_activity_effects() {
        let store = ActivityProjectionStore::new();
        store
            .ingest_ledger_activity(
                record("c:0", "0xg", 1),
                ProjectionEffect::CreateGroup {
                    name: "trip".to_string(),
                    creator: "0xAL".to_string(),
                },
                1,
            )
            .await
            .unwrap();
        store
            .ingest_ledger_activity(
                record("m:0", "0xg", 2),
                ProjectionEffect::MemberDelta(1),
                2,
            )
            .await
            .unwrap();
        store
            .ingest_ledger_activity(
                record("s:0", "0xg", 3),
                ProjectionEffect::Settlement {
                    amount: "4.50".to_string(),
                },
                3,
            )
            .await
            .unwrap();

        let group = store.get_group("0xg").await.unwrap();
        assert_eq!(group.name, "trip");
        assert_eq!(group.creator, "0xal");
        assert_eq!(group.member_count, 1);
        assert_eq!(group.total_contributions, "4.50");
        assert_eq!(group.total_balance, "4.50");
        assert_eq!(group.activity_score, 3);

        store
            .ingest_ledger_activity(record("x:0", "0xg", 4), ProjectionEffect::CloseGroup, 4)
            .await
            .unwrap();
        assert_eq!(
            store.get_group("0xg").await.unwrap().status,
            GroupStatus::Closed
        );
    }

    #[tokio::test]
    async fn test_ingest_ledger_activity_bad_amount_rolls_back() {
        let store = ActivityProjectionStore::new();
        let err = store
            .ingest_ledger_activity(
                record("bad:0", "0xg", 1),
                ProjectionEffect::Expense {
                    amount: "not-a-number".to_string(),
                },
                1,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, MirrorError::InvalidAmount(_)));
        assert_eq!(store.activity_count().await, 0);
        assert_eq!(store.get_group("0xg").await.unwrap().activity_score, 0);
    }

    #[tokio::test]
    async fn test_apply_canonical_state_overwrites_aggregates() {
        let store = ActivityProjectionStore::new();
        // Event path first: some score accumulated
        store
            .ingest_ledger_activity(
                record("e:0", "0xg", 10),
                ProjectionEffect::Expense {
                    amount: "1".to_string(),
                },
                2,
            )
            .await
            .unwrap();

        let canonical = CanonicalGroupState {
            address: "0xG".to_string(),
            name: "trip".to_string(),
            creator: "0xowner".to_string(),
            status: GroupStatus::Active,
            total_balance: "100.00".to_string(),
            total_contributions: "150.00".to_string(),
            total_expenses: "50.00".to_string(),
            member_count: 4,
            block_number: 9,
        };
        let projection = store.apply_canonical_state(&canonical).await;
        assert_eq!(projection.total_balance, "100.00");
        assert_eq!(projection.member_count, 4);
        assert_eq!(projection.last_synced_block, 9);
        // Event-derived fields preserved
        assert_eq!(projection.activity_score, 1);
        assert_eq!(projection.last_activity_ms, 10);
    }
}
