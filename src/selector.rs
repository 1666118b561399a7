// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Batch selection.
//!
//! Picks the oldest pending records of one kind, bounded by a validated
//! [`BatchLimit`]. Selection never changes a record's status.

use crate::error::{ReplicationError, Result};
use crate::kind::EntityKind;
use crate::record::SyncRecord;
use crate::store::LocalStore;
use tracing::debug;

/// A batch size known to lie in `[1, ceiling]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchLimit(usize);

impl BatchLimit {
    /// Validate a limit against the ceiling.
    pub fn new(limit: usize, ceiling: usize) -> Result<Self> {
        if limit == 0 || limit > ceiling {
            return Err(ReplicationError::InvalidLimit {
                limit: i64::try_from(limit).unwrap_or(i64::MAX),
                ceiling,
            });
        }
        Ok(Self(limit))
    }

    /// Validate an optional caller-supplied limit, falling back to `default`.
    pub fn from_request(requested: Option<i64>, default: usize, ceiling: usize) -> Result<Self> {
        match requested {
            None => Self::new(default, ceiling),
            Some(limit) if limit < 1 => Err(ReplicationError::InvalidLimit { limit, ceiling }),
            Some(limit) => {
                let limit_usize = usize::try_from(limit)
                    .map_err(|_| ReplicationError::InvalidLimit { limit, ceiling })?;
                Self::new(limit_usize, ceiling)
            }
        }
    }

    pub fn get(&self) -> usize {
        self.0
    }
}

/// Reads pending batches from the local store.
#[derive(Debug, Clone, Default)]
pub struct BatchSelector;

impl BatchSelector {
    pub fn new() -> Self {
        Self
    }

    /// Oldest-first pending records of `kind`, with pending nested
    /// sub-records attached, at most `limit` of them.
    pub async fn select_pending<S: LocalStore + ?Sized>(
        &self,
        store: &S,
        kind: &EntityKind,
        limit: BatchLimit,
    ) -> Result<Vec<SyncRecord>> {
        let mut batch = store.find_pending(kind, limit.get()).await?;
        batch.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        batch.truncate(limit.get());

        debug!(
            kind = %kind.name,
            selected = batch.len(),
            nested = batch.iter().map(SyncRecord::nested_count).sum::<usize>(),
            limit = limit.get(),
            "Selected pending batch"
        );
        Ok(batch)
    }
}
