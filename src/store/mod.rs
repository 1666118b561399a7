// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Local store abstraction.
//!
//! The engine never owns the station database. Business logic writes
//! records with `sync_status = 'pending'`; the engine reads pending records
//! and flips confirmed ones to `'sent'` through [`LocalStore`].
//!
//! # Implementations
//!
//! - [`SqliteStore`]: the station's SQLite database (sqlx, WAL mode)
//! - [`MemoryStore`]: in-process tables with fault injection
//!
//! # Transactional Scope
//!
//! Both implementations read a batch (records plus their nested
//! sub-records) in one transaction and commit a batch in one transaction,
//! so a record written by business logic mid-cycle is either fully part
//! of the batch or left for the next cycle.

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::error::Result;
use crate::kind::{EntityKind, NestedKind};
use crate::record::{SyncRecord, SyncStatus};
use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;

/// Boxed future returned by store operations.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Exact identifiers confirmed by one accepted transmission.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitSet {
    /// Record ids of the batch.
    pub ids: Vec<String>,
    /// Nested sub-record ids that rode along, keyed by nested kind name.
    pub nested: BTreeMap<String, Vec<String>>,
}

impl CommitSet {
    /// Everything that was in the transmitted batch, and nothing else.
    pub fn from_batch(batch: &[SyncRecord]) -> Self {
        let mut set = CommitSet::default();
        for record in batch {
            set.ids.push(record.id.clone());
            for (name, items) in &record.nested {
                set.nested
                    .entry(name.clone())
                    .or_default()
                    .extend(items.iter().map(|n| n.id.clone()));
            }
        }
        set
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn nested_len(&self) -> usize {
        self.nested.values().map(Vec::len).sum()
    }
}

/// Rows actually moved from `pending` to `sent` by one commit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommitReceipt {
    pub records: u64,
    pub nested: u64,
}

/// Operations the engine needs from the station database.
pub trait LocalStore: Send + Sync + 'static {
    /// Records awaiting transmission, oldest first (`created_at`, then `id`).
    ///
    /// A record qualifies when it is `pending`, or when it owns at least one
    /// `pending` nested sub-record. Only pending sub-records are attached.
    /// Never mutates status.
    fn find_pending<'a>(&'a self, kind: &'a EntityKind, limit: usize) -> BoxFuture<'a, Vec<SyncRecord>>;

    /// Move the listed records and nested sub-records from `pending` to `sent`.
    ///
    /// Applies atomically. Ids already `sent` are skipped, not errors. Nested
    /// ids are only touched when their parent is in `commit.ids`.
    fn mark_sent<'a>(&'a self, kind: &'a EntityKind, commit: &'a CommitSet) -> BoxFuture<'a, CommitReceipt>;

    /// Number of `kind` records in `status`.
    fn count_by_status<'a>(&'a self, kind: &'a EntityKind, status: SyncStatus) -> BoxFuture<'a, u64>;

    /// Number of nested sub-records in `status`.
    fn count_nested_by_status<'a>(&'a self, nested: &'a NestedKind, status: SyncStatus) -> BoxFuture<'a, u64>;
}
