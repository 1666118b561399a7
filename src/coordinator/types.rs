// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Cycle state types.
//!
//! Defines the state machine of a single replication cycle and the
//! reports a cycle produces.
//!
//! # State Transitions
//!
//! ```text
//!            run_cycle()
//!   Idle ─────────────────→ Probing ──(unreachable)──→ Idle  [Offline]
//!    │                         │
//!    │ (already syncing)       │ (reachable)
//!    ↓                         ↓
//! [AlreadyRunning]         Selecting ←──────────────┐
//!                              │                    │ (next phase)
//!                              ↓                    │
//!                         Transmitting              │
//!                              │                    │
//!                              ↓                    │
//!                          Committing ──────────────┘
//!                              │
//!                              ↓ (last phase done)
//!                             Idle  [Completed / Failed]
//! ```
//!
//! A rejected entry never changes the published phase: the running cycle
//! keeps reporting its own progress.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;

/// Current step of the engine's cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CyclePhase {
    /// No cycle running.
    Idle,

    /// Checking remote reachability.
    Probing,

    /// Reading a pending batch from the local store.
    Selecting,

    /// Sending a batch (including backoff between attempts).
    Transmitting,

    /// Marking an accepted batch as sent.
    Committing,
}

impl std::fmt::Display for CyclePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CyclePhase::Idle => write!(f, "Idle"),
            CyclePhase::Probing => write!(f, "Probing"),
            CyclePhase::Selecting => write!(f, "Selecting"),
            CyclePhase::Transmitting => write!(f, "Transmitting"),
            CyclePhase::Committing => write!(f, "Committing"),
        }
    }
}

/// What happened to one kind within a cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseReport {
    pub kind: String,
    pub selected: usize,
    pub transmitted: usize,
    pub nested_transmitted: usize,
    pub committed: u64,
    pub nested_committed: u64,
    pub attempts: u32,
    pub error: Option<String>,
}

impl PhaseReport {
    pub fn new(kind: &str) -> Self {
        Self {
            kind: kind.to_string(),
            ..Default::default()
        }
    }

    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Summary of a cycle that got past the probe.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// One entry per kind, in processing order.
    pub phases: Vec<PhaseReport>,
    /// Records accepted by the remote this cycle.
    pub transmitted: usize,
    /// Pending records left across the cycle's kinds, if they could be counted.
    pub remaining: Option<u64>,
    pub elapsed: Duration,
}

impl CycleReport {
    /// Some phases failed while others succeeded.
    pub fn is_partial(&self) -> bool {
        let failed = self.phases.iter().filter(|p| !p.succeeded()).count();
        failed > 0 && failed < self.phases.len()
    }

    pub fn all_failed(&self) -> bool {
        !self.phases.is_empty() && self.phases.iter().all(|p| !p.succeeded())
    }

    /// Errors of the failed phases, joined for display.
    pub fn errors(&self) -> String {
        self.phases
            .iter()
            .filter_map(|p| p.error.as_ref().map(|e| format!("{}: {}", p.kind, e)))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// How a call to `run_cycle` ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// At least one phase succeeded (possibly with nothing to send).
    Completed(CycleReport),

    /// Every phase failed. Records stay pending.
    Failed { report: CycleReport, error: String },

    /// Remote unreachable; nothing was read or written.
    Offline { consecutive_failures: u32 },

    /// Another cycle of this engine was in progress.
    AlreadyRunning,
}

impl CycleOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            CycleOutcome::Completed(report) if report.is_partial() => "partial",
            CycleOutcome::Completed(_) => "completed",
            CycleOutcome::Failed { .. } => "failed",
            CycleOutcome::Offline { .. } => "offline",
            CycleOutcome::AlreadyRunning => "skipped",
        }
    }

    pub fn report(&self) -> Option<&CycleReport> {
        match self {
            CycleOutcome::Completed(report) | CycleOutcome::Failed { report, .. } => Some(report),
            _ => None,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, CycleOutcome::Completed(_))
    }
}

/// Point-in-time statistics for one engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStats {
    pub engine: String,
    /// Pending rows per kind (nested kinds included).
    pub pending: BTreeMap<String, u64>,
    /// Sent rows per kind (nested kinds included).
    pub synced: BTreeMap<String, u64>,
    pub online: bool,
    pub last_sync_time: Option<DateTime<Utc>>,
    pub is_syncing: bool,
    pub consecutive_failures: u32,
    /// Failure streak reached the warning threshold.
    pub failure_warning: bool,
}

impl SyncStats {
    pub fn total_pending(&self) -> u64 {
        self.pending.values().sum()
    }

    pub fn total_synced(&self) -> u64 {
        self.synced.values().sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn phase(kind: &str, error: Option<&str>) -> PhaseReport {
        PhaseReport {
            error: error.map(String::from),
            ..PhaseReport::new(kind)
        }
    }

    #[test]
    fn test_cycle_phase_display() {
        assert_eq!(CyclePhase::Idle.to_string(), "Idle");
        assert_eq!(CyclePhase::Probing.to_string(), "Probing");
        assert_eq!(CyclePhase::Selecting.to_string(), "Selecting");
        assert_eq!(CyclePhase::Transmitting.to_string(), "Transmitting");
        assert_eq!(CyclePhase::Committing.to_string(), "Committing");
    }

    #[test]
    fn test_cycle_phase_equality() {
        assert_eq!(CyclePhase::Idle, CyclePhase::Idle);
        assert_ne!(CyclePhase::Idle, CyclePhase::Probing);
    }

    #[test]
    fn test_partial_report() {
        let report = CycleReport {
            phases: vec![phase("categories", Some("503")), phase("products", None)],
            ..Default::default()
        };
        assert!(report.is_partial());
        assert!(!report.all_failed());
        assert_eq!(report.errors(), "categories: 503");
        assert_eq!(CycleOutcome::Completed(report).label(), "partial");
    }

    #[test]
    fn test_all_failed_report() {
        let report = CycleReport {
            phases: vec![phase("categories", Some("a")), phase("products", Some("b"))],
            ..Default::default()
        };
        assert!(report.all_failed());
        assert!(!report.is_partial());
        assert_eq!(report.errors(), "categories: a; products: b");
    }

    #[test]
    fn test_empty_report_is_not_failed() {
        let report = CycleReport::default();
        assert!(!report.all_failed());
        assert!(!report.is_partial());
    }

    #[test]
    fn test_outcome_labels() {
        assert_eq!(CycleOutcome::AlreadyRunning.label(), "skipped");
        assert_eq!(CycleOutcome::Offline { consecutive_failures: 1 }.label(), "offline");
        assert_eq!(CycleOutcome::Completed(CycleReport::default()).label(), "completed");
        assert!(CycleOutcome::AlreadyRunning.report().is_none());
        assert!(!CycleOutcome::Offline { consecutive_failures: 0 }.is_success());
    }

    #[test]
    fn test_stats_totals() {
        let stats = SyncStats {
            engine: "catalog".into(),
            pending: BTreeMap::from([("categories".to_string(), 2), ("products".to_string(), 3)]),
            synced: BTreeMap::from([("products".to_string(), 7)]),
            online: true,
            last_sync_time: None,
            is_syncing: false,
            consecutive_failures: 0,
            failure_warning: false,
        };
        assert_eq!(stats.total_pending(), 5);
        assert_eq!(stats.total_synced(), 7);
    }

    #[test]
    fn test_stats_serialize_camel_case() {
        let stats = SyncStats {
            engine: "sales".into(),
            pending: BTreeMap::new(),
            synced: BTreeMap::new(),
            online: false,
            last_sync_time: None,
            is_syncing: true,
            consecutive_failures: 5,
            failure_warning: true,
        };
        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["isSyncing"], true);
        assert_eq!(json["consecutiveFailures"], 5);
        assert_eq!(json["failureWarning"], true);
    }
}
