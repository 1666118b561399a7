// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Control surface for the host application.
//!
//! Every call returns a structured, serializable response with a
//! human-readable message. Nothing here returns an error: failures are
//! reported as `success: false`.
//!
//! # Example
//!
//! ```rust,ignore
//! let controller = SyncController::new(Arc::new(engine));
//! controller.start_loop().await;
//!
//! let forced = controller.force_sync(Some(100)).await;
//! println!("{}", serde_json::to_string(&forced)?);
//! // {"success":true,"count":12,"remaining":0,"message":"Synced 12 records, 0 remaining"}
//! ```

use crate::coordinator::{CycleOutcome, ReplicationEngine};
use crate::remote::RemoteAuthority;
use crate::scheduler::Scheduler;
use crate::store::LocalStore;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Answer to `get_stats()`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsView {
    /// Pending records across every kind.
    pub pending: u64,
    /// Sent records across every kind.
    pub synced: u64,
    pub pending_by_kind: BTreeMap<String, u64>,
    pub synced_by_kind: BTreeMap<String, u64>,
    pub online: bool,
    pub last_sync: Option<DateTime<Utc>>,
    pub is_syncing: bool,
    pub consecutive_failures: u32,
    pub failure_warning: bool,
    /// Set when counts could not be read.
    pub error: Option<String>,
}

/// Answer to `force_sync()`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ForceSyncResponse {
    pub success: bool,
    /// Records accepted by the remote during this call.
    pub count: usize,
    /// Pending records left, when known.
    pub remaining: Option<u64>,
    pub message: String,
}

/// Answer to `start_loop()` / `stop_loop()`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlResponse {
    pub success: bool,
    pub message: String,
}

impl ControlResponse {
    fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

/// Entry point the rest of the application uses to observe and drive one
/// engine.
pub struct SyncController<S: LocalStore, R: RemoteAuthority> {
    scheduler: Scheduler<S, R>,
}

impl<S: LocalStore, R: RemoteAuthority> SyncController<S, R> {
    pub fn new(engine: Arc<ReplicationEngine<S, R>>) -> Self {
        Self {
            scheduler: Scheduler::new(engine),
        }
    }

    pub fn engine(&self) -> &Arc<ReplicationEngine<S, R>> {
        self.scheduler.engine()
    }

    pub fn scheduler(&self) -> &Scheduler<S, R> {
        &self.scheduler
    }

    pub async fn get_stats(&self) -> StatsView {
        let engine = self.engine();
        match self.scheduler.stats().await {
            Ok(stats) => StatsView {
                pending: stats.total_pending(),
                synced: stats.total_synced(),
                pending_by_kind: stats.pending,
                synced_by_kind: stats.synced,
                online: stats.online,
                last_sync: stats.last_sync_time,
                is_syncing: stats.is_syncing,
                consecutive_failures: stats.consecutive_failures,
                failure_warning: stats.failure_warning,
                error: None,
            },
            Err(e) => {
                warn!(engine = %engine.name(), error = %e, "Could not read sync stats");
                let consecutive_failures = engine.consecutive_failures().await;
                StatsView {
                    last_sync: engine.last_sync_time().await,
                    is_syncing: engine.is_syncing(),
                    consecutive_failures,
                    failure_warning: engine.config().health.is_failure_warning(consecutive_failures),
                    error: Some(e.to_string()),
                    ..Default::default()
                }
            }
        }
    }

    /// Run one cycle now.
    ///
    /// A limit outside `[1, max_force_limit]` is rejected before any I/O.
    pub async fn force_sync(&self, limit: Option<i64>) -> ForceSyncResponse {
        let limit = match self.engine().batch_limit(limit) {
            Ok(limit) => limit,
            Err(e) => {
                return ForceSyncResponse {
                    message: e.to_string(),
                    ..Default::default()
                };
            }
        };

        match self.scheduler.force_now(Some(limit)).await {
            CycleOutcome::Completed(report) => {
                let remaining = report
                    .remaining
                    .map_or_else(|| "unknown".to_string(), |r| r.to_string());
                let message = if report.is_partial() {
                    format!(
                        "Synced {} records, {} remaining; some kinds failed: {}",
                        report.transmitted,
                        remaining,
                        report.errors()
                    )
                } else {
                    format!("Synced {} records, {} remaining", report.transmitted, remaining)
                };
                ForceSyncResponse {
                    success: true,
                    count: report.transmitted,
                    remaining: report.remaining,
                    message,
                }
            }
            CycleOutcome::Failed { report, error } => ForceSyncResponse {
                success: false,
                count: report.transmitted,
                remaining: report.remaining,
                message: format!("Sync failed: {}", error),
            },
            CycleOutcome::Offline { consecutive_failures } => ForceSyncResponse {
                message: format!(
                    "Remote unreachable, records kept pending ({} consecutive failures)",
                    consecutive_failures
                ),
                ..Default::default()
            },
            CycleOutcome::AlreadyRunning => ForceSyncResponse {
                message: "Sync already in progress".to_string(),
                ..Default::default()
            },
        }
    }

    pub async fn start_loop(&self) -> ControlResponse {
        match self.scheduler.start().await {
            Ok(()) => {
                info!(engine = %self.engine().name(), "Sync loop started via control");
                ControlResponse::ok("Sync loop started")
            }
            Err(e) => ControlResponse::failed(format!("Could not start sync loop: {}", e)),
        }
    }

    pub async fn stop_loop(&self) -> ControlResponse {
        match self.scheduler.stop().await {
            Ok(()) => ControlResponse::ok("Sync loop stopped"),
            Err(e) => ControlResponse::failed(format!("Could not stop sync loop: {}", e)),
        }
    }
}
