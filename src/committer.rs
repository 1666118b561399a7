// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! State commit after an accepted transmission.
//!
//! Only called with the [`CommitSet`] built from the exact batch the remote
//! accepted. The store applies it in one transaction; re-running it is a
//! no-op.

use crate::error::Result;
use crate::kind::EntityKind;
use crate::metrics;
use crate::store::{CommitReceipt, CommitSet, LocalStore};
use tracing::{debug, error};

/// Marks accepted records as sent.
#[derive(Debug, Clone)]
pub struct StateCommitter {
    engine: String,
}

impl StateCommitter {
    pub fn new(engine: &str) -> Self {
        Self {
            engine: engine.to_string(),
        }
    }

    /// Transition every id in `commit` (and its listed nested sub-records)
    /// from `pending` to `sent`.
    pub async fn mark_sent<S: LocalStore + ?Sized>(
        &self,
        store: &S,
        kind: &EntityKind,
        commit: &CommitSet,
    ) -> Result<CommitReceipt> {
        if commit.is_empty() {
            return Ok(CommitReceipt::default());
        }

        match store.mark_sent(kind, commit).await {
            Ok(receipt) => {
                metrics::record_committed(&self.engine, &kind.name, receipt.records, receipt.nested);
                debug!(
                    engine = %self.engine,
                    kind = %kind.name,
                    requested = commit.ids.len(),
                    records = receipt.records,
                    nested = receipt.nested,
                    "Marked batch sent"
                );
                Ok(receipt)
            }
            Err(e) => {
                metrics::record_commit_failure(&self.engine, &kind.name);
                error!(
                    engine = %self.engine,
                    kind = %kind.name,
                    records = commit.ids.len(),
                    error = %e,
                    "Commit failed after remote accepted batch; records stay pending"
                );
                Err(e)
            }
        }
    }
}
