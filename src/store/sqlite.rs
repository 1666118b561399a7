// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! SQLite-backed local store.
//!
//! The station database is shared with the rest of the POS application,
//! which inserts pending records while cycles run. Each table managed here
//! has the same shape:
//!
//! ```text
//! {table}:        id TEXT PK | payload TEXT (JSON) | sync_status TEXT | created_at INTEGER (ms)
//! {nested table}: id TEXT PK | {parent_column} TEXT | payload | sync_status | created_at
//! ```
//!
//! # SQLite Busy Handling
//!
//! Business writes and engine commits contend for the write lock. Commits
//! retry on SQLITE_BUSY/SQLITE_LOCKED with capped exponential backoff and
//! re-run the whole transaction on each attempt.

use super::{BoxFuture, CommitReceipt, CommitSet, LocalStore};
use crate::config::StoreConfig;
use crate::error::{ReplicationError, Result};
use crate::kind::{check_identifier, EntityKind, NestedKind};
use crate::record::{from_millis, NestedRecord, SyncRecord, SyncStatus};
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{QueryBuilder, Sqlite};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Configuration for SQLite busy retry behavior
const SQLITE_RETRY_MAX_ATTEMPTS: u32 = 5;
const SQLITE_RETRY_BASE_DELAY_MS: u64 = 10;
const SQLITE_RETRY_MAX_DELAY_MS: u64 = 500;

/// Most ids bound into one `IN (...)` list. Two lists share a statement,
/// which stays under SQLite's 999-variable floor.
const ID_CHUNK: usize = 400;

/// Check if an error is a retryable SQLite busy/locked error
fn is_sqlite_busy_error(e: &sqlx::Error) -> bool {
    match e {
        sqlx::Error::Database(db_err) => {
            // SQLite error codes: SQLITE_BUSY = 5, SQLITE_LOCKED = 6
            if let Some(code) = db_err.code() {
                return code == "5" || code == "6";
            }
            let msg = db_err.message().to_lowercase();
            msg.contains("database is locked") || msg.contains("database is busy")
        }
        _ => false,
    }
}

/// Execute a database operation with retry on SQLITE_BUSY/SQLITE_LOCKED
async fn execute_with_retry<F, Fut, T>(operation_name: &str, mut f: F) -> std::result::Result<T, sqlx::Error>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = std::result::Result<T, sqlx::Error>>,
{
    let mut attempts = 0;
    let mut delay_ms = SQLITE_RETRY_BASE_DELAY_MS;

    loop {
        attempts += 1;
        match f().await {
            Ok(result) => {
                if attempts > 1 {
                    debug!(operation = operation_name, attempts, "SQLite operation succeeded after retry");
                }
                return Ok(result);
            }
            Err(e) if is_sqlite_busy_error(&e) && attempts < SQLITE_RETRY_MAX_ATTEMPTS => {
                warn!(
                    operation = operation_name,
                    attempts,
                    max_attempts = SQLITE_RETRY_MAX_ATTEMPTS,
                    delay_ms,
                    "SQLite busy, retrying"
                );
                crate::metrics::record_store_retry(operation_name);
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                delay_ms = (delay_ms * 2).min(SQLITE_RETRY_MAX_DELAY_MS);
            }
            Err(e) => {
                if is_sqlite_busy_error(&e) {
                    warn!(operation = operation_name, attempts, "SQLite busy, max retries exceeded");
                }
                return Err(e);
            }
        }
    }
}

/// Station database accessed through a sqlx pool.
pub struct SqliteStore {
    pool: SqlitePool,
    path: String,
}

impl SqliteStore {
    /// Open (or create) the database at `path` in WAL mode.
    pub async fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path_str = path.as_ref().to_string_lossy().to_string();
        Self::open(&path_str, true).await
    }

    /// Open the database described by a [`StoreConfig`].
    pub async fn from_config(config: &StoreConfig) -> Result<Self> {
        Self::open(&config.sqlite_path, config.wal_mode).await
    }

    async fn open(path: &str, wal_mode: bool) -> Result<Self> {
        info!(path = %path, "Opening local store");
        let in_memory = path == ":memory:";

        let url = if in_memory {
            "sqlite::memory:".to_string()
        } else {
            format!("sqlite://{}?mode=rwc", path)
        };
        let journal = if wal_mode && !in_memory {
            SqliteJournalMode::Wal
        } else {
            SqliteJournalMode::Memory
        };
        let options = SqliteConnectOptions::from_str(&url)
            .map_err(|e| ReplicationError::Config(format!("Invalid SQLite path: {}", e)))?
            .journal_mode(journal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(5))
            .create_if_missing(true);

        // Every connection to ":memory:" is a separate database.
        let max_connections = if in_memory { 1 } else { 4 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        Ok(Self {
            pool,
            path: path.to_string(),
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Create tables and indexes for every kind in the dependency chain.
    pub async fn ensure_schema(&self, kind: &EntityKind) -> Result<()> {
        kind.validate()?;
        for phase in kind.phases() {
            sqlx::query(&format!(
                "CREATE TABLE IF NOT EXISTS {t} (
                    id TEXT PRIMARY KEY,
                    payload TEXT NOT NULL,
                    sync_status TEXT NOT NULL DEFAULT 'pending',
                    created_at INTEGER NOT NULL
                )",
                t = phase.table
            ))
            .execute(&self.pool)
            .await?;
            sqlx::query(&format!(
                "CREATE INDEX IF NOT EXISTS idx_{t}_sync ON {t} (sync_status, created_at)",
                t = phase.table
            ))
            .execute(&self.pool)
            .await?;

            for nested in &phase.nested {
                sqlx::query(&format!(
                    "CREATE TABLE IF NOT EXISTS {t} (
                        id TEXT PRIMARY KEY,
                        {p} TEXT NOT NULL,
                        payload TEXT NOT NULL,
                        sync_status TEXT NOT NULL DEFAULT 'pending',
                        created_at INTEGER NOT NULL
                    )",
                    t = nested.table,
                    p = nested.parent_column
                ))
                .execute(&self.pool)
                .await?;
                sqlx::query(&format!(
                    "CREATE INDEX IF NOT EXISTS idx_{t}_parent ON {t} ({p}, sync_status)",
                    t = nested.table,
                    p = nested.parent_column
                ))
                .execute(&self.pool)
                .await?;
            }
        }
        debug!(kind = %kind.name, "Schema ready");
        Ok(())
    }

    /// Insert a pending record, as business logic would.
    pub async fn insert_record(
        &self,
        kind: &EntityKind,
        id: &str,
        created_at: DateTime<Utc>,
        payload: &Value,
    ) -> Result<()> {
        let payload = serde_json::to_string(payload)?;
        let sql = format!(
            "INSERT INTO {} (id, payload, sync_status, created_at) VALUES (?, ?, 'pending', ?)",
            kind.table
        );
        let pool = &self.pool;
        let (sql, payload) = (sql.as_str(), payload.as_str());
        execute_with_retry("insert_record", || async move {
            sqlx::query(sql)
                .bind(id)
                .bind(payload)
                .bind(created_at.timestamp_millis())
                .execute(pool)
                .await
        })
        .await?;
        Ok(())
    }

    /// Insert a pending nested sub-record owned by `parent_id`.
    pub async fn insert_nested(
        &self,
        nested: &NestedKind,
        id: &str,
        parent_id: &str,
        created_at: DateTime<Utc>,
        payload: &Value,
    ) -> Result<()> {
        let payload = serde_json::to_string(payload)?;
        let sql = format!(
            "INSERT INTO {} (id, {}, payload, sync_status, created_at) VALUES (?, ?, ?, 'pending', ?)",
            nested.table, nested.parent_column
        );
        let pool = &self.pool;
        let (sql, payload) = (sql.as_str(), payload.as_str());
        execute_with_retry("insert_nested", || async move {
            sqlx::query(sql)
                .bind(id)
                .bind(parent_id)
                .bind(payload)
                .bind(created_at.timestamp_millis())
                .execute(pool)
                .await
        })
        .await?;
        Ok(())
    }

    /// Current status of a row in any managed table.
    pub async fn status_of(&self, table: &str, id: &str) -> Result<Option<SyncStatus>> {
        check_identifier("table", table)?;
        let row: Option<(String,)> = sqlx::query_as(&format!("SELECT sync_status FROM {} WHERE id = ?", table))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|(s,)| s.parse()).transpose()
    }

    /// Force a WAL checkpoint.
    pub async fn checkpoint(&self) -> Result<()> {
        sqlx::query("PRAGMA wal_checkpoint(TRUNCATE)").execute(&self.pool).await?;
        debug!(path = %self.path, "WAL checkpoint complete");
        Ok(())
    }

    /// Close the pool.
    pub async fn close(&self) {
        if let Err(e) = self.checkpoint().await {
            warn!(error = %e, "Checkpoint on close failed");
        }
        self.pool.close().await;
        info!(path = %self.path, "Local store closed");
    }

    async fn select_pending(&self, kind: &EntityKind, limit: usize) -> std::result::Result<PendingRows, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let mut sql = format!(
            "SELECT id, payload, sync_status, created_at FROM {t} WHERE sync_status = 'pending'",
            t = kind.table
        );
        for nested in &kind.nested {
            sql.push_str(&format!(
                " OR EXISTS (SELECT 1 FROM {n} WHERE {n}.{p} = {t}.id AND {n}.sync_status = 'pending')",
                n = nested.table,
                p = nested.parent_column,
                t = kind.table
            ));
        }
        sql.push_str(" ORDER BY created_at ASC, id ASC LIMIT ?");

        let rows: Vec<(String, String, String, i64)> = sqlx::query_as(&sql)
            .bind(limit as i64)
            .fetch_all(&mut *tx)
            .await?;

        let mut nested_rows: Vec<(String, Vec<(String, String, String, i64)>)> = Vec::new();
        if !rows.is_empty() {
            for nested in &kind.nested {
                let mut found = Vec::new();
                for parents in rows.chunks(ID_CHUNK) {
                    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
                        "SELECT id, {p}, payload, created_at FROM {n} WHERE sync_status = 'pending' AND {p} IN (",
                        n = nested.table,
                        p = nested.parent_column
                    ));
                    let mut ids = qb.separated(", ");
                    for (id, ..) in parents {
                        ids.push_bind(id.clone());
                    }
                    ids.push_unseparated(")");
                    found.extend(
                        qb.build_query_as::<(String, String, String, i64)>()
                            .fetch_all(&mut *tx)
                            .await?,
                    );
                }
                found.sort_by(|a, b| (a.3, &a.0).cmp(&(b.3, &b.0)));
                nested_rows.push((nested.name.clone(), found));
            }
        }

        tx.commit().await?;
        Ok(PendingRows { rows, nested_rows })
    }

    async fn commit_batch(&self, kind: &EntityKind, commit: &CommitSet) -> std::result::Result<CommitReceipt, sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        let mut receipt = CommitReceipt::default();

        for chunk in commit.ids.chunks(ID_CHUNK) {
            let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
                "UPDATE {} SET sync_status = 'sent' WHERE sync_status = 'pending' AND id IN (",
                kind.table
            ));
            let mut ids = qb.separated(", ");
            for id in chunk {
                ids.push_bind(id.clone());
            }
            ids.push_unseparated(")");
            receipt.records += qb.build().execute(&mut *tx).await?.rows_affected();
        }

        // A nested row matches when its id is listed and its parent is in
        // any parent chunk. Rows leave `pending` on first match, so the
        // affected counts never double up.
        for nested in &kind.nested {
            let Some(nested_ids) = commit.nested.get(&nested.name).filter(|ids| !ids.is_empty()) else {
                continue;
            };
            for chunk in nested_ids.chunks(ID_CHUNK) {
                for parent_chunk in commit.ids.chunks(ID_CHUNK) {
                    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
                        "UPDATE {} SET sync_status = 'sent' WHERE sync_status = 'pending' AND id IN (",
                        nested.table
                    ));
                    let mut ids = qb.separated(", ");
                    for id in chunk {
                        ids.push_bind(id.clone());
                    }
                    ids.push_unseparated(format!(") AND {} IN (", nested.parent_column));
                    let mut parents = qb.separated(", ");
                    for id in parent_chunk {
                        parents.push_bind(id.clone());
                    }
                    parents.push_unseparated(")");
                    receipt.nested += qb.build().execute(&mut *tx).await?.rows_affected();
                }
            }
        }

        tx.commit().await?;
        Ok(receipt)
    }
}

struct PendingRows {
    rows: Vec<(String, String, String, i64)>,
    nested_rows: Vec<(String, Vec<(String, String, String, i64)>)>,
}

fn assemble(kind: &EntityKind, selected: PendingRows) -> Result<Vec<SyncRecord>> {
    let mut by_parent: HashMap<String, BTreeMap<String, Vec<NestedRecord>>> = HashMap::new();
    for (name, rows) in selected.nested_rows {
        for (id, parent_id, payload, created_at) in rows {
            let item = NestedRecord {
                id,
                parent_id: parent_id.clone(),
                created_at: from_millis(created_at)?,
                payload: serde_json::from_str(&payload)?,
            };
            by_parent.entry(parent_id).or_default().entry(name.clone()).or_default().push(item);
        }
    }

    selected
        .rows
        .into_iter()
        .map(|(id, payload, status, created_at)| {
            Ok(SyncRecord {
                nested: by_parent.remove(&id).unwrap_or_default(),
                kind: kind.name.clone(),
                status: status.parse()?,
                created_at: from_millis(created_at)?,
                payload: serde_json::from_str(&payload)?,
                id,
            })
        })
        .collect()
}

impl LocalStore for SqliteStore {
    fn find_pending<'a>(&'a self, kind: &'a EntityKind, limit: usize) -> BoxFuture<'a, Vec<SyncRecord>> {
        Box::pin(async move {
            let selected = execute_with_retry("find_pending", || self.select_pending(kind, limit)).await?;
            assemble(kind, selected)
        })
    }

    fn mark_sent<'a>(&'a self, kind: &'a EntityKind, commit: &'a CommitSet) -> BoxFuture<'a, CommitReceipt> {
        Box::pin(async move {
            if commit.is_empty() {
                return Ok(CommitReceipt::default());
            }
            let receipt = execute_with_retry("mark_sent", || self.commit_batch(kind, commit)).await?;
            Ok(receipt)
        })
    }

    fn count_by_status<'a>(&'a self, kind: &'a EntityKind, status: SyncStatus) -> BoxFuture<'a, u64> {
        Box::pin(async move {
            let (count,): (i64,) =
                sqlx::query_as(&format!("SELECT COUNT(*) FROM {} WHERE sync_status = ?", kind.table))
                    .bind(status.as_str())
                    .fetch_one(&self.pool)
                    .await?;
            Ok(count as u64)
        })
    }

    fn count_nested_by_status<'a>(&'a self, nested: &'a NestedKind, status: SyncStatus) -> BoxFuture<'a, u64> {
        Box::pin(async move {
            let (count,): (i64,) =
                sqlx::query_as(&format!("SELECT COUNT(*) FROM {} WHERE sync_status = ?", nested.table))
                    .bind(status.as_str())
                    .fetch_one(&self.pool)
                    .await?;
            Ok(count as u64)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(1_700_000_000 + secs, 0).unwrap()
    }

    async fn catalog_store() -> (SqliteStore, EntityKind, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let store = SqliteStore::new(dir.path().join("station.db")).await.unwrap();
        let catalog = EntityKind::catalog();
        store.ensure_schema(&catalog).await.unwrap();
        (store, catalog, dir)
    }

    #[tokio::test]
    async fn test_ensure_schema_is_repeatable() {
        let (store, catalog, _dir) = catalog_store().await;
        store.ensure_schema(&catalog).await.unwrap();
        assert_eq!(store.count_by_status(&catalog, SyncStatus::Pending).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_ensure_schema_rejects_bad_identifier() {
        let dir = tempdir().unwrap();
        let store = SqliteStore::new(dir.path().join("station.db")).await.unwrap();
        let kind = EntityKind::independent("x", "x;--", "/x");
        assert!(matches!(store.ensure_schema(&kind).await, Err(ReplicationError::Config(_))));
    }

    #[tokio::test]
    async fn test_find_pending_orders_and_limits() {
        let dir = tempdir().unwrap();
        let store = SqliteStore::new(dir.path().join("station.db")).await.unwrap();
        let sales = EntityKind::sales();
        store.ensure_schema(&sales).await.unwrap();

        store.insert_record(&sales, "s-3", at(3), &json!({"total": 3})).await.unwrap();
        store.insert_record(&sales, "s-1", at(1), &json!({"total": 1})).await.unwrap();
        store.insert_record(&sales, "s-2", at(2), &json!({"total": 2})).await.unwrap();

        let batch = store.find_pending(&sales, 2).await.unwrap();
        let ids: Vec<_> = batch.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["s-1", "s-2"]);
        assert_eq!(batch[0].payload, json!({"total": 1}));
        assert_eq!(batch[0].created_at, at(1));
        assert_eq!(store.status_of("sales", "s-1").await.unwrap(), Some(SyncStatus::Pending));
    }

    #[tokio::test]
    async fn test_nested_records_attached() {
        let (store, catalog, _dir) = catalog_store().await;
        let inventory = catalog.nested_kind("inventory").unwrap().clone();
        let presentations = catalog.nested_kind("presentations").unwrap().clone();

        store.insert_record(&catalog, "p-1", at(0), &json!({"name": "Cola"})).await.unwrap();
        store.insert_nested(&inventory, "inv-1", "p-1", at(1), &json!({"qty": 3})).await.unwrap();
        store.insert_nested(&presentations, "pr-1", "p-1", at(2), &json!({"size": "2L"})).await.unwrap();

        let batch = store.find_pending(&catalog, 10).await.unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].nested["inventory"][0].id, "inv-1");
        assert_eq!(batch[0].nested["presentations"][0].payload, json!({"size": "2L"}));
        assert_eq!(batch[0].nested_count(), 2);
    }

    #[tokio::test]
    async fn test_sent_product_with_new_nested_is_selected() {
        let (store, catalog, _dir) = catalog_store().await;
        let inventory = catalog.nested_kind("inventory").unwrap().clone();

        store.insert_record(&catalog, "p-1", at(0), &json!({})).await.unwrap();
        let receipt = store
            .mark_sent(&catalog, &CommitSet { ids: vec!["p-1".into()], ..Default::default() })
            .await
            .unwrap();
        assert_eq!(receipt.records, 1);
        assert!(store.find_pending(&catalog, 10).await.unwrap().is_empty());

        store.insert_nested(&inventory, "inv-9", "p-1", at(10), &json!({"qty": 9})).await.unwrap();
        let batch = store.find_pending(&catalog, 10).await.unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].status, SyncStatus::Sent);
        assert_eq!(batch[0].nested["inventory"].len(), 1);
    }

    #[tokio::test]
    async fn test_mark_sent_scoped_and_idempotent() {
        let (store, catalog, _dir) = catalog_store().await;
        let inventory = catalog.nested_kind("inventory").unwrap().clone();

        store.insert_record(&catalog, "p-1", at(0), &json!({})).await.unwrap();
        store.insert_record(&catalog, "p-2", at(1), &json!({})).await.unwrap();
        store.insert_nested(&inventory, "inv-1", "p-1", at(2), &json!({})).await.unwrap();
        store.insert_nested(&inventory, "inv-2", "p-2", at(3), &json!({})).await.unwrap();

        let mut commit = CommitSet { ids: vec!["p-1".into()], ..Default::default() };
        commit.nested.insert("inventory".into(), vec!["inv-1".into(), "inv-2".into()]);

        let first = store.mark_sent(&catalog, &commit).await.unwrap();
        assert_eq!(first, CommitReceipt { records: 1, nested: 1 });
        let second = store.mark_sent(&catalog, &commit).await.unwrap();
        assert_eq!(second, CommitReceipt::default());

        assert_eq!(store.status_of("products", "p-2").await.unwrap(), Some(SyncStatus::Pending));
        assert_eq!(store.status_of("inventory", "inv-2").await.unwrap(), Some(SyncStatus::Pending));
        assert_eq!(store.count_nested_by_status(&inventory, SyncStatus::Sent).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_large_batch_commits_in_chunks() {
        let (store, catalog, _dir) = catalog_store().await;
        let inventory = catalog.nested_kind("inventory").unwrap().clone();
        let presentations = catalog.nested_kind("presentations").unwrap().clone();

        let n = ID_CHUNK * 2 + 37;
        for i in 0..n {
            let id = format!("p-{:05}", i);
            store.insert_record(&catalog, &id, at(i as i64), &json!({})).await.unwrap();
            store.insert_nested(&inventory, &format!("inv-{:05}", i), &id, at(i as i64), &json!({})).await.unwrap();
            store.insert_nested(&presentations, &format!("pr-{:05}", i), &id, at(i as i64), &json!({})).await.unwrap();
        }
        // Not part of the batch: must stay pending.
        store.insert_record(&catalog, "p-late", at(n as i64 + 1), &json!({})).await.unwrap();

        let batch = store.find_pending(&catalog, n).await.unwrap();
        assert_eq!(batch.len(), n);
        assert!(batch.iter().all(|r| r.nested_count() == 2));
        assert_eq!(batch.last().unwrap().nested["inventory"][0].id, format!("inv-{:05}", n - 1));

        let receipt = store.mark_sent(&catalog, &CommitSet::from_batch(&batch)).await.unwrap();
        assert_eq!(receipt, CommitReceipt { records: n as u64, nested: 2 * n as u64 });
        assert_eq!(store.count_by_status(&catalog, SyncStatus::Pending).await.unwrap(), 1);
        assert_eq!(store.count_nested_by_status(&inventory, SyncStatus::Pending).await.unwrap(), 0);
        assert_eq!(store.count_nested_by_status(&presentations, SyncStatus::Pending).await.unwrap(), 0);
        assert_eq!(store.status_of("products", "p-late").await.unwrap(), Some(SyncStatus::Pending));
    }

    #[tokio::test]
    async fn test_counts_by_status() {
        let (store, catalog, _dir) = catalog_store().await;
        for i in 0..4 {
            store.insert_record(&catalog, &format!("p-{}", i), at(i), &json!({})).await.unwrap();
        }
        store
            .mark_sent(&catalog, &CommitSet { ids: vec!["p-0".into(), "p-1".into()], ..Default::default() })
            .await
            .unwrap();
        assert_eq!(store.count_by_status(&catalog, SyncStatus::Pending).await.unwrap(), 2);
        assert_eq!(store.count_by_status(&catalog, SyncStatus::Sent).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_in_memory_store() {
        let store = SqliteStore::from_config(&StoreConfig::in_memory()).await.unwrap();
        let sales = EntityKind::sales();
        store.ensure_schema(&sales).await.unwrap();
        store.insert_record(&sales, "s-1", at(0), &json!({})).await.unwrap();
        assert_eq!(store.find_pending(&sales, 5).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_reopen_preserves_status() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("station.db");
        let sales = EntityKind::sales();
        {
            let store = SqliteStore::new(&path).await.unwrap();
            store.ensure_schema(&sales).await.unwrap();
            store.insert_record(&sales, "s-1", at(0), &json!({})).await.unwrap();
            store
                .mark_sent(&sales, &CommitSet { ids: vec!["s-1".into()], ..Default::default() })
                .await
                .unwrap();
            store.close().await;
        }
        let store = SqliteStore::new(&path).await.unwrap();
        assert_eq!(store.status_of("sales", "s-1").await.unwrap(), Some(SyncStatus::Sent));
    }
}
