// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! In-process store.
//!
//! Every operation takes the table lock once, which gives the same
//! all-or-nothing behavior as a SQLite transaction. Fault injection makes
//! it the store of choice for outage tests.

use super::{BoxFuture, CommitReceipt, CommitSet, LocalStore};
use crate::error::{ReplicationError, Result};
use crate::kind::{EntityKind, NestedKind};
use crate::record::{NestedRecord, SyncRecord, SyncStatus};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Debug, Clone)]
struct Row {
    parent_id: Option<String>,
    created_at: DateTime<Utc>,
    payload: Value,
    status: SyncStatus,
}

type Table = HashMap<String, Row>;

/// Store backed by in-memory tables.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<HashMap<String, Table>>,
    unavailable: AtomicBool,
    fail_commits: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a pending record, as business logic would.
    pub async fn insert_record(
        &self,
        table: &str,
        id: &str,
        created_at: DateTime<Utc>,
        payload: Value,
    ) -> Result<()> {
        self.insert(table, id, None, created_at, payload).await
    }

    /// Insert a pending nested sub-record owned by `parent_id`.
    pub async fn insert_nested(
        &self,
        table: &str,
        id: &str,
        parent_id: &str,
        created_at: DateTime<Utc>,
        payload: Value,
    ) -> Result<()> {
        self.insert(table, id, Some(parent_id.to_string()), created_at, payload).await
    }

    async fn insert(
        &self,
        table: &str,
        id: &str,
        parent_id: Option<String>,
        created_at: DateTime<Utc>,
        payload: Value,
    ) -> Result<()> {
        self.check_available()?;
        let mut tables = self.tables.write().await;
        let rows = tables.entry(table.to_string()).or_default();
        if rows.contains_key(id) {
            return Err(ReplicationError::Internal(format!("duplicate id '{}' in {}", id, table)));
        }
        rows.insert(
            id.to_string(),
            Row {
                parent_id,
                created_at,
                payload,
                status: SyncStatus::Pending,
            },
        );
        Ok(())
    }

    /// Current status of a row, if it exists.
    pub async fn status_of(&self, table: &str, id: &str) -> Option<SyncStatus> {
        self.tables.read().await.get(table)?.get(id).map(|r| r.status)
    }

    /// Every `(id, status)` in a table, sorted by id.
    pub async fn statuses(&self, table: &str) -> Vec<(String, SyncStatus)> {
        let tables = self.tables.read().await;
        let mut out: Vec<_> = tables
            .get(table)
            .map(|rows| rows.iter().map(|(id, r)| (id.clone(), r.status)).collect())
            .unwrap_or_default();
        out.sort();
        out
    }

    /// Make every operation fail until cleared.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Make only `mark_sent` fail until cleared.
    pub fn set_fail_commits(&self, fail: bool) {
        self.fail_commits.store(fail, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(ReplicationError::StoreUnavailable("memory store offline".into()));
        }
        Ok(())
    }
}

fn has_pending_nested(tables: &HashMap<String, Table>, kind: &EntityKind, id: &str) -> bool {
    kind.nested.iter().any(|nested| {
        tables.get(&nested.table).is_some_and(|rows| {
            rows.values()
                .any(|r| r.status == SyncStatus::Pending && r.parent_id.as_deref() == Some(id))
        })
    })
}

fn sorted_rows<'t>(rows: impl Iterator<Item = (&'t String, &'t Row)>) -> Vec<(&'t String, &'t Row)> {
    let mut rows: Vec<_> = rows.collect();
    rows.sort_by(|a, b| a.1.created_at.cmp(&b.1.created_at).then_with(|| a.0.cmp(b.0)));
    rows
}

impl LocalStore for MemoryStore {
    fn find_pending<'a>(&'a self, kind: &'a EntityKind, limit: usize) -> BoxFuture<'a, Vec<SyncRecord>> {
        Box::pin(async move {
            self.check_available()?;
            let tables = self.tables.read().await;
            let Some(rows) = tables.get(&kind.table) else {
                return Ok(Vec::new());
            };

            let candidates = rows.iter().filter(|(id, row)| {
                row.status == SyncStatus::Pending || has_pending_nested(&tables, kind, id)
            });

            let mut batch = Vec::new();
            for (id, row) in sorted_rows(candidates).into_iter().take(limit) {
                let mut record = SyncRecord {
                    id: id.clone(),
                    kind: kind.name.clone(),
                    status: row.status,
                    created_at: row.created_at,
                    payload: row.payload.clone(),
                    nested: BTreeMap::new(),
                };
                for nested in &kind.nested {
                    let Some(nested_rows) = tables.get(&nested.table) else {
                        continue;
                    };
                    let owned = nested_rows.iter().filter(|(_, r)| {
                        r.status == SyncStatus::Pending && r.parent_id.as_deref() == Some(id.as_str())
                    });
                    let items: Vec<NestedRecord> = sorted_rows(owned)
                        .into_iter()
                        .map(|(nid, r)| NestedRecord {
                            id: nid.clone(),
                            parent_id: id.clone(),
                            created_at: r.created_at,
                            payload: r.payload.clone(),
                        })
                        .collect();
                    if !items.is_empty() {
                        record.nested.insert(nested.name.clone(), items);
                    }
                }
                batch.push(record);
            }
            Ok(batch)
        })
    }

    fn mark_sent<'a>(&'a self, kind: &'a EntityKind, commit: &'a CommitSet) -> BoxFuture<'a, CommitReceipt> {
        Box::pin(async move {
            self.check_available()?;
            if self.fail_commits.load(Ordering::SeqCst) {
                return Err(ReplicationError::StoreUnavailable("commit rejected".into()));
            }

            let mut tables = self.tables.write().await;
            let mut receipt = CommitReceipt::default();

            if let Some(rows) = tables.get_mut(&kind.table) {
                for id in &commit.ids {
                    if let Some(row) = rows.get_mut(id) {
                        if row.status == SyncStatus::Pending {
                            row.status = SyncStatus::Sent;
                            receipt.records += 1;
                        }
                    }
                }
            }

            let parents: HashSet<&str> = commit.ids.iter().map(String::as_str).collect();
            for nested in &kind.nested {
                let (Some(ids), Some(rows)) = (commit.nested.get(&nested.name), tables.get_mut(&nested.table))
                else {
                    continue;
                };
                for id in ids {
                    if let Some(row) = rows.get_mut(id) {
                        let owned = row.parent_id.as_deref().is_some_and(|p| parents.contains(p));
                        if owned && row.status == SyncStatus::Pending {
                            row.status = SyncStatus::Sent;
                            receipt.nested += 1;
                        }
                    }
                }
            }

            debug!(kind = %kind.name, records = receipt.records, nested = receipt.nested, "Memory store commit");
            Ok(receipt)
        })
    }

    fn count_by_status<'a>(&'a self, kind: &'a EntityKind, status: SyncStatus) -> BoxFuture<'a, u64> {
        Box::pin(async move {
            self.check_available()?;
            let tables = self.tables.read().await;
            Ok(count_in(&tables, &kind.table, status))
        })
    }

    fn count_nested_by_status<'a>(&'a self, nested: &'a NestedKind, status: SyncStatus) -> BoxFuture<'a, u64> {
        Box::pin(async move {
            self.check_available()?;
            let tables = self.tables.read().await;
            Ok(count_in(&tables, &nested.table, status))
        })
    }
}

fn count_in(tables: &HashMap<String, Table>, table: &str, status: SyncStatus) -> u64 {
    tables
        .get(table)
        .map(|rows| rows.values().filter(|r| r.status == status).count() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use serde_json::json;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(1_700_000_000 + secs, 0).unwrap()
    }

    #[tokio::test]
    async fn test_find_pending_oldest_first() {
        let store = MemoryStore::new();
        store.insert_record("sales", "late", at(30), json!({})).await.unwrap();
        store.insert_record("sales", "early", at(10), json!({})).await.unwrap();
        store.insert_record("sales", "middle", at(20), json!({})).await.unwrap();

        let batch = store.find_pending(&EntityKind::sales(), 2).await.unwrap();
        let ids: Vec<_> = batch.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["early", "middle"]);
    }

    #[tokio::test]
    async fn test_ties_broken_by_id() {
        let store = MemoryStore::new();
        store.insert_record("sales", "b", at(0), json!({})).await.unwrap();
        store.insert_record("sales", "a", at(0), json!({})).await.unwrap();

        let batch = store.find_pending(&EntityKind::sales(), 10).await.unwrap();
        assert_eq!(batch[0].id, "a");
        assert_eq!(batch[1].id, "b");
    }

    #[tokio::test]
    async fn test_statuses_sorted_by_id() {
        let store = MemoryStore::new();
        store.insert_record("sales", "s-2", at(0), json!({})).await.unwrap();
        store.insert_record("sales", "s-3", at(1), json!({})).await.unwrap();
        store.insert_record("sales", "s-1", at(2), json!({})).await.unwrap();
        store
            .mark_sent(&EntityKind::sales(), &CommitSet { ids: vec!["s-3".into()], ..Default::default() })
            .await
            .unwrap();

        assert_eq!(
            store.statuses("sales").await,
            vec![
                ("s-1".to_string(), SyncStatus::Pending),
                ("s-2".to_string(), SyncStatus::Pending),
                ("s-3".to_string(), SyncStatus::Sent),
            ]
        );
        assert!(store.statuses("missing").await.is_empty());
    }

    #[tokio::test]
    async fn test_find_pending_is_read_only() {
        let store = MemoryStore::new();
        store.insert_record("sales", "s-1", at(0), json!({})).await.unwrap();
        store.find_pending(&EntityKind::sales(), 10).await.unwrap();
        assert_eq!(store.status_of("sales", "s-1").await, Some(SyncStatus::Pending));
    }

    #[tokio::test]
    async fn test_sent_product_with_pending_nested_rides_along() {
        let store = MemoryStore::new();
        let catalog = EntityKind::catalog();
        store.insert_record("products", "p-1", at(0), json!({})).await.unwrap();
        store
            .mark_sent(&catalog, &CommitSet { ids: vec!["p-1".into()], ..Default::default() })
            .await
            .unwrap();
        store.insert_nested("inventory", "inv-1", "p-1", at(5), json!({"qty": 1})).await.unwrap();

        let batch = store.find_pending(&catalog, 10).await.unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].status, SyncStatus::Sent);
        assert_eq!(batch[0].nested["inventory"][0].id, "inv-1");
    }

    #[tokio::test]
    async fn test_mark_sent_is_idempotent() {
        let store = MemoryStore::new();
        store.insert_record("sales", "s-1", at(0), json!({})).await.unwrap();
        let commit = CommitSet { ids: vec!["s-1".into()], ..Default::default() };

        let first = store.mark_sent(&EntityKind::sales(), &commit).await.unwrap();
        let second = store.mark_sent(&EntityKind::sales(), &commit).await.unwrap();
        assert_eq!(first.records, 1);
        assert_eq!(second.records, 0);
        assert_eq!(store.status_of("sales", "s-1").await, Some(SyncStatus::Sent));
    }

    #[tokio::test]
    async fn test_mark_sent_only_touches_listed_ids() {
        let store = MemoryStore::new();
        let catalog = EntityKind::catalog();
        store.insert_record("products", "p-1", at(0), json!({})).await.unwrap();
        store.insert_record("products", "p-2", at(1), json!({})).await.unwrap();
        store.insert_nested("inventory", "inv-1", "p-1", at(2), json!({})).await.unwrap();
        store.insert_nested("inventory", "inv-late", "p-1", at(3), json!({})).await.unwrap();
        store.insert_nested("inventory", "inv-2", "p-2", at(4), json!({})).await.unwrap();

        let mut commit = CommitSet { ids: vec!["p-1".into()], ..Default::default() };
        commit.nested.insert("inventory".into(), vec!["inv-1".into(), "inv-2".into()]);

        let receipt = store.mark_sent(&catalog, &commit).await.unwrap();
        assert_eq!(receipt, CommitReceipt { records: 1, nested: 1 });
        assert_eq!(store.status_of("products", "p-2").await, Some(SyncStatus::Pending));
        assert_eq!(store.status_of("inventory", "inv-late").await, Some(SyncStatus::Pending));
        // inv-2 belongs to p-2, which was not in the batch
        assert_eq!(store.status_of("inventory", "inv-2").await, Some(SyncStatus::Pending));
    }

    #[tokio::test]
    async fn test_counts() {
        let store = MemoryStore::new();
        let sales = EntityKind::sales();
        for i in 0..3 {
            store
                .insert_record("sales", &format!("s-{}", i), at(0) + ChronoDuration::seconds(i), json!({}))
                .await
                .unwrap();
        }
        store
            .mark_sent(&sales, &CommitSet { ids: vec!["s-0".into()], ..Default::default() })
            .await
            .unwrap();
        assert_eq!(store.count_by_status(&sales, SyncStatus::Pending).await.unwrap(), 2);
        assert_eq!(store.count_by_status(&sales, SyncStatus::Sent).await.unwrap(), 1);

        let inventory = NestedKind::new("inventory", "inventory", "product_id");
        assert_eq!(store.count_nested_by_status(&inventory, SyncStatus::Pending).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_unavailable_store_errors() {
        let store = MemoryStore::new();
        store.set_unavailable(true);
        let err = store.find_pending(&EntityKind::sales(), 10).await.unwrap_err();
        assert!(matches!(err, ReplicationError::StoreUnavailable(_)));
        store.set_unavailable(false);
        assert!(store.find_pending(&EntityKind::sales(), 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_fail_commits_leaves_rows_pending() {
        let store = MemoryStore::new();
        store.insert_record("sales", "s-1", at(0), json!({})).await.unwrap();
        store.set_fail_commits(true);
        let commit = CommitSet { ids: vec!["s-1".into()], ..Default::default() };
        assert!(store.mark_sent(&EntityKind::sales(), &commit).await.is_err());
        assert_eq!(store.status_of("sales", "s-1").await, Some(SyncStatus::Pending));
    }

    #[tokio::test]
    async fn test_duplicate_insert_rejected() {
        let store = MemoryStore::new();
        store.insert_record("sales", "s-1", at(0), json!({})).await.unwrap();
        assert!(store.insert_record("sales", "s-1", at(1), json!({})).await.is_err());
    }
}
