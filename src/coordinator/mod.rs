// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Replication cycle coordinator.
//!
//! The orchestrator that ties together:
//! - Reachability checks via [`crate::probe::ConnectivityProbe`]
//! - Batch selection via [`crate::selector::BatchSelector`]
//! - Transmission with retry via [`crate::transmit::Transmitter`]
//! - Status commits via [`crate::committer::StateCommitter`]
//!
//! # Architecture
//!
//! One [`ReplicationEngine`] exists per engine instance ("sales",
//! "catalog"). It owns the cycle state (in-progress flag, last sync time,
//! failure streak); nothing about a cycle lives in process globals.
//!
//! A cycle:
//! 1. Claims the single-flight flag, or returns `AlreadyRunning`
//! 2. Probes the remote; unreachable ends the cycle as `Offline`
//! 3. Runs Select → Transmit → Commit for each kind, predecessor first
//! 4. Updates statistics and reports what was sent and what remains
//!
//! Phases fail independently. A predecessor that could not be sent stays
//! pending and is retried next cycle; its dependents are still attempted.

mod types;

pub use types::{CycleOutcome, CyclePhase, CycleReport, PhaseReport, SyncStats};

use crate::committer::StateCommitter;
use crate::config::ReplicationConfig;
use crate::error::{ReplicationError, Result};
use crate::kind::EntityKind;
use crate::metrics;
use crate::probe::ConnectivityProbe;
use crate::record::SyncStatus;
use crate::remote::{HttpRemote, RemoteAuthority};
use crate::selector::{BatchLimit, BatchSelector};
use crate::store::{CommitSet, LocalStore, SqliteStore};
use crate::transmit::Transmitter;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, RwLock};
use tokio::time::Instant;
use tracing::{debug, error, info, info_span, warn, Instrument};

/// Run statistics owned by the engine. Never persisted.
#[derive(Debug, Clone, Default)]
struct CycleHealth {
    last_sync_time: Option<DateTime<Utc>>,
    consecutive_failures: u32,
}

/// Holds the single-flight flag for the duration of one cycle.
///
/// Dropping it (normal return, early return, or the cycle future being
/// dropped) releases the flag and publishes `Idle`.
struct SyncingGuard<'a> {
    flag: &'a AtomicBool,
    phase_tx: &'a watch::Sender<CyclePhase>,
    engine: &'a str,
}

impl<'a> SyncingGuard<'a> {
    fn acquire(flag: &'a AtomicBool, phase_tx: &'a watch::Sender<CyclePhase>, engine: &'a str) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag, phase_tx, engine })
    }
}

impl Drop for SyncingGuard<'_> {
    fn drop(&mut self) {
        self.phase_tx.send_replace(CyclePhase::Idle);
        metrics::set_cycle_phase(self.engine, "Idle");
        self.flag.store(false, Ordering::Release);
    }
}

/// The replication engine for one entity kind (and its predecessors).
///
/// Generic over the local store and the remote authority so hosts can
/// plug in their own database access and tests can script both sides.
pub struct ReplicationEngine<S: LocalStore, R: RemoteAuthority> {
    config: ReplicationConfig,
    kind: EntityKind,
    store: Arc<S>,
    remote: Arc<R>,

    probe: ConnectivityProbe,
    selector: BatchSelector,
    transmitter: Transmitter,
    committer: StateCommitter,

    /// Limit for the final phase when the caller gives none.
    default_limit: BatchLimit,
    /// Fixed limit for predecessor phases.
    parent_limit: BatchLimit,

    /// Single-flight flag.
    syncing: AtomicBool,
    health: RwLock<CycleHealth>,

    phase_tx: watch::Sender<CyclePhase>,
    phase_rx: watch::Receiver<CyclePhase>,
}

impl ReplicationEngine<SqliteStore, HttpRemote> {
    /// Open the station database from `config.store` and connect over HTTP.
    ///
    /// Creates missing tables for every kind in the chain.
    pub async fn open(config: ReplicationConfig, kind: EntityKind) -> Result<Self> {
        config.validate()?;
        let store = SqliteStore::from_config(&config.store).await?;
        store.ensure_schema(&kind).await?;
        let remote = HttpRemote::new(&config.remote)?;
        Self::new(config, kind, Arc::new(store), Arc::new(remote))
    }
}

impl<S: LocalStore, R: RemoteAuthority> ReplicationEngine<S, R> {
    /// Create an engine. Validates the config and the kind chain.
    pub fn new(config: ReplicationConfig, kind: EntityKind, store: Arc<S>, remote: Arc<R>) -> Result<Self> {
        config.validate()?;
        kind.validate()?;

        let ceiling = config.batch.max_force_limit;
        let default_limit = BatchLimit::new(config.batch.batch_size, ceiling)?;
        let parent_limit = BatchLimit::new(config.batch.parent_batch_size, ceiling)?;
        let engine = config.engine_name.as_str();
        let (phase_tx, phase_rx) = watch::channel(CyclePhase::Idle);

        Ok(Self {
            probe: ConnectivityProbe::new(engine, config.remote.probe_timeout()),
            selector: BatchSelector::new(),
            transmitter: Transmitter::new(engine, config.retry.retry_config()),
            committer: StateCommitter::new(engine),
            default_limit,
            parent_limit,
            syncing: AtomicBool::new(false),
            health: RwLock::new(CycleHealth::default()),
            phase_tx,
            phase_rx,
            config,
            kind,
            store,
            remote,
        })
    }

    pub fn name(&self) -> &str {
        &self.config.engine_name
    }

    pub fn config(&self) -> &ReplicationConfig {
        &self.config
    }

    pub fn kind(&self) -> &EntityKind {
        &self.kind
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn remote(&self) -> &Arc<R> {
        &self.remote
    }

    /// Whether a cycle is in progress right now.
    pub fn is_syncing(&self) -> bool {
        self.syncing.load(Ordering::Acquire)
    }

    /// Current cycle phase.
    pub fn phase(&self) -> CyclePhase {
        *self.phase_rx.borrow()
    }

    /// Get a receiver to watch phase changes.
    pub fn phase_receiver(&self) -> watch::Receiver<CyclePhase> {
        self.phase_rx.clone()
    }

    /// Validate a caller-supplied limit against this engine's ceiling.
    ///
    /// `None` resolves to the configured batch size.
    pub fn batch_limit(&self, requested: Option<i64>) -> Result<BatchLimit> {
        BatchLimit::from_request(requested, self.config.batch.batch_size, self.config.batch.max_force_limit)
    }

    /// Run one replication cycle.
    ///
    /// `limit` bounds the final phase; predecessor phases always use the
    /// configured parent batch size. Never returns an error: every failure
    /// mode is reported through [`CycleOutcome`] and leaves records pending.
    pub async fn run_cycle(&self, limit: Option<BatchLimit>) -> CycleOutcome {
        let engine = self.config.engine_name.as_str();
        let Some(_guard) = SyncingGuard::acquire(&self.syncing, &self.phase_tx, engine) else {
            debug!(engine = %engine, "Cycle already in progress, skipping");
            metrics::record_cycle_outcome(engine, "skipped");
            return CycleOutcome::AlreadyRunning;
        };

        let span = info_span!("sync_cycle", engine = %engine, kind = %self.kind.name);
        let outcome = self.execute(limit.unwrap_or(self.default_limit)).instrument(span).await;
        metrics::record_cycle_outcome(engine, outcome.label());
        outcome
    }

    async fn execute(&self, final_limit: BatchLimit) -> CycleOutcome {
        let started = Instant::now();

        self.set_phase(CyclePhase::Probing);
        if !self.probe.is_reachable(self.remote.as_ref()).await {
            let consecutive_failures = self.record_failure().await;
            warn!(consecutive_failures, "Remote unreachable, staying offline this cycle");
            return CycleOutcome::Offline { consecutive_failures };
        }

        let phases = self.kind.phases();
        let last = phases.len().saturating_sub(1);
        let mut report = CycleReport::default();

        for (index, kind) in phases.iter().enumerate() {
            let limit = if index == last { final_limit } else { self.parent_limit };
            let phase = self.run_phase(kind, limit).await;
            report.transmitted += phase.transmitted;
            report.phases.push(phase);
        }

        report.remaining = self.count_remaining().await;
        report.elapsed = started.elapsed();
        let elapsed_ms = report.elapsed.as_millis() as u64;

        metrics::record_cycle_duration(self.name(), report.elapsed);
        if self.config.health.is_slow_cycle(report.elapsed) {
            metrics::record_slow_cycle(self.name());
            warn!(
                elapsed_ms,
                threshold_ms = self.config.health.slow_cycle_threshold().as_millis() as u64,
                "Slow sync cycle"
            );
        }

        if report.all_failed() {
            let consecutive_failures = self.record_failure().await;
            let error = report.errors();
            error!(consecutive_failures, elapsed_ms, error = %error, "Sync cycle failed");
            return CycleOutcome::Failed { report, error };
        }

        self.record_success().await;
        if report.is_partial() {
            warn!(
                transmitted = report.transmitted,
                remaining = ?report.remaining,
                elapsed_ms,
                errors = %report.errors(),
                "Sync cycle partially completed"
            );
        } else {
            info!(
                transmitted = report.transmitted,
                remaining = ?report.remaining,
                elapsed_ms,
                "Sync cycle completed"
            );
        }
        CycleOutcome::Completed(report)
    }

    /// Select → Transmit → Commit for one kind. Errors are captured in the
    /// report so later phases still run.
    async fn run_phase(&self, kind: &EntityKind, limit: BatchLimit) -> PhaseReport {
        let mut report = PhaseReport::new(&kind.name);
        if let Err(e) = self.drive_phase(kind, limit, &mut report).await {
            debug!(kind = %kind.name, error = %e, "Phase failed");
            report.error = Some(e.to_string());
        }
        report
    }

    async fn drive_phase(&self, kind: &EntityKind, limit: BatchLimit, report: &mut PhaseReport) -> Result<()> {
        self.set_phase(CyclePhase::Selecting);
        let batch = self.selector.select_pending(self.store.as_ref(), kind, limit).await?;
        report.selected = batch.len();
        if batch.is_empty() {
            debug!(kind = %kind.name, "Nothing pending");
            return Ok(());
        }

        self.set_phase(CyclePhase::Transmitting);
        let receipt = match self.transmitter.send(self.remote.as_ref(), kind, &batch).await {
            Ok(receipt) => receipt,
            Err(e) => {
                report.attempts = match &e {
                    ReplicationError::RetriesExhausted { attempts, .. } => *attempts,
                    ReplicationError::Serialization(_) => 0,
                    _ => 1,
                };
                return Err(e);
            }
        };
        report.attempts = receipt.attempts;
        report.transmitted = receipt.transmitted;
        report.nested_transmitted = receipt.nested_transmitted;

        // Only what the remote just accepted.
        self.set_phase(CyclePhase::Committing);
        let commit = CommitSet::from_batch(&batch);
        let committed = self.committer.mark_sent(self.store.as_ref(), kind, &commit).await?;
        report.committed = committed.records;
        report.nested_committed = committed.nested;
        Ok(())
    }

    /// Pending records left across the cycle's kinds.
    async fn count_remaining(&self) -> Option<u64> {
        let mut total = 0u64;
        for kind in self.kind.phases() {
            match self.store.count_by_status(kind, SyncStatus::Pending).await {
                Ok(count) => {
                    metrics::set_pending(self.name(), &kind.name, count);
                    total += count;
                }
                Err(e) => {
                    debug!(kind = %kind.name, error = %e, "Could not count remaining records");
                    return None;
                }
            }
        }
        Some(total)
    }

    fn set_phase(&self, phase: CyclePhase) {
        self.phase_tx.send_replace(phase);
        metrics::set_cycle_phase(self.name(), &phase.to_string());
    }

    async fn record_failure(&self) -> u32 {
        let mut health = self.health.write().await;
        health.consecutive_failures = health.consecutive_failures.saturating_add(1);
        let failures = health.consecutive_failures;
        drop(health);

        metrics::set_consecutive_failures(self.name(), failures);
        if self.config.health.is_failure_warning(failures) {
            warn!(
                engine = %self.name(),
                consecutive_failures = failures,
                threshold = self.config.health.failure_warning_threshold,
                "Consecutive sync failures at warning threshold, continuing offline"
            );
        }
        failures
    }

    async fn record_success(&self) {
        let mut health = self.health.write().await;
        health.last_sync_time = Some(Utc::now());
        health.consecutive_failures = 0;
        metrics::set_consecutive_failures(self.name(), 0);
    }

    pub async fn last_sync_time(&self) -> Option<DateTime<Utc>> {
        self.health.read().await.last_sync_time
    }

    pub async fn consecutive_failures(&self) -> u32 {
        self.health.read().await.consecutive_failures
    }

    /// Snapshot of pending/sent counts, reachability and cycle state.
    ///
    /// Probes the remote once; store errors are returned.
    pub async fn stats(&self) -> Result<SyncStats> {
        let mut pending = BTreeMap::new();
        let mut synced = BTreeMap::new();

        for kind in self.kind.phases() {
            pending.insert(kind.name.clone(), self.store.count_by_status(kind, SyncStatus::Pending).await?);
            synced.insert(kind.name.clone(), self.store.count_by_status(kind, SyncStatus::Sent).await?);
            for nested in &kind.nested {
                pending.insert(
                    nested.name.clone(),
                    self.store.count_nested_by_status(nested, SyncStatus::Pending).await?,
                );
                synced.insert(
                    nested.name.clone(),
                    self.store.count_nested_by_status(nested, SyncStatus::Sent).await?,
                );
            }
        }

        let online = self.probe.is_reachable(self.remote.as_ref()).await;
        let health = self.health.read().await.clone();

        Ok(SyncStats {
            engine: self.config.engine_name.clone(),
            pending,
            synced,
            online,
            last_sync_time: health.last_sync_time,
            is_syncing: self.is_syncing(),
            consecutive_failures: health.consecutive_failures,
            failure_warning: self.config.health.is_failure_warning(health.consecutive_failures),
        })
    }
}
