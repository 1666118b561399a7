// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Periodic cycle scheduling.
//!
//! After a short grace delay the loop runs one cycle, then one per fixed
//! interval. Ticks missed while a cycle is running are skipped, never
//! queued. Forced cycles go straight to the engine and share its
//! single-flight guard with the loop.
//!
//! ```text
//! start() ──▶ grace delay ──▶ cycle ──▶ interval ──▶ cycle ──▶ ... ──▶ stop()
//!                                 ▲
//!                 force_now() ────┘ (AlreadyRunning if a cycle is in flight)
//! ```

use crate::coordinator::{CycleOutcome, ReplicationEngine, SyncStats};
use crate::error::{ReplicationError, Result};
use crate::metrics;
use crate::remote::RemoteAuthority;
use crate::selector::BatchLimit;
use crate::store::LocalStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, info_span, warn, Instrument};

/// How long `stop()` waits for an in-flight cycle before aborting it.
const LOOP_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

struct LoopHandle {
    handle: JoinHandle<()>,
    shutdown_tx: watch::Sender<bool>,
}

/// Drives an engine on a timer.
///
/// Dropping the scheduler closes the shutdown channel, which also ends
/// the loop after its current cycle.
pub struct Scheduler<S: LocalStore, R: RemoteAuthority> {
    engine: Arc<ReplicationEngine<S, R>>,
    task: Mutex<Option<LoopHandle>>,
}

impl<S: LocalStore, R: RemoteAuthority> Scheduler<S, R> {
    pub fn new(engine: Arc<ReplicationEngine<S, R>>) -> Self {
        Self {
            engine,
            task: Mutex::new(None),
        }
    }

    pub fn engine(&self) -> &Arc<ReplicationEngine<S, R>> {
        &self.engine
    }

    /// Whether the periodic loop is active.
    pub async fn is_running(&self) -> bool {
        self.task
            .lock()
            .await
            .as_ref()
            .is_some_and(|task| !task.handle.is_finished())
    }

    /// Spawn the periodic loop.
    ///
    /// Fails with `InvalidState` if the loop is already running and with
    /// `Config` if scheduling is disabled.
    pub async fn start(&self) -> Result<()> {
        let schedule = &self.engine.config().schedule;
        if !schedule.enabled {
            return Err(ReplicationError::Config(format!(
                "scheduling is disabled for engine '{}'",
                self.engine.name()
            )));
        }

        let mut task = self.task.lock().await;
        if task.as_ref().is_some_and(|t| !t.handle.is_finished()) {
            return Err(ReplicationError::InvalidState {
                expected: "Stopped".to_string(),
                actual: "Running".to_string(),
            });
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let engine = Arc::clone(&self.engine);
        let interval = schedule.interval();
        let startup_delay = schedule.startup_delay();
        let span = info_span!("sync_loop", engine = %self.engine.name());

        let handle = tokio::spawn(
            async move {
                run_loop(engine, interval, startup_delay, shutdown_rx).await;
            }
            .instrument(span),
        );

        *task = Some(LoopHandle { handle, shutdown_tx });
        metrics::set_loop_running(self.engine.name(), true);
        info!(
            engine = %self.engine.name(),
            interval_ms = interval.as_millis() as u64,
            startup_delay_ms = startup_delay.as_millis() as u64,
            "Sync loop scheduled"
        );
        Ok(())
    }

    /// Stop the periodic loop.
    ///
    /// No new cycle starts once this returns. An in-flight cycle gets
    /// [`LOOP_DRAIN_TIMEOUT`] to finish before it is aborted; its records
    /// stay pending in that case.
    pub async fn stop(&self) -> Result<()> {
        let Some(LoopHandle { mut handle, shutdown_tx }) = self.task.lock().await.take() else {
            return Err(ReplicationError::InvalidState {
                expected: "Running".to_string(),
                actual: "Stopped".to_string(),
            });
        };

        info!(engine = %self.engine.name(), "Stopping sync loop");
        let _ = shutdown_tx.send(true);

        match tokio::time::timeout(LOOP_DRAIN_TIMEOUT, &mut handle).await {
            Ok(Ok(())) => debug!(engine = %self.engine.name(), "Sync loop drained"),
            Ok(Err(e)) => warn!(engine = %self.engine.name(), error = %e, "Sync loop task failed"),
            Err(_) => {
                warn!(
                    engine = %self.engine.name(),
                    timeout_ms = LOOP_DRAIN_TIMEOUT.as_millis() as u64,
                    "Cycle did not finish in time, aborting"
                );
                handle.abort();
                let _ = handle.await;
            }
        }

        metrics::set_loop_running(self.engine.name(), false);
        info!(engine = %self.engine.name(), "Sync loop stopped");
        Ok(())
    }

    /// Run a cycle now, outside the timer.
    ///
    /// Returns `AlreadyRunning` instead of queuing when a cycle is active.
    pub async fn force_now(&self, limit: Option<BatchLimit>) -> CycleOutcome {
        info!(engine = %self.engine.name(), limit = ?limit.map(|l| l.get()), "Forced sync requested");
        self.engine.run_cycle(limit).await
    }

    pub async fn stats(&self) -> Result<SyncStats> {
        self.engine.stats().await
    }
}

async fn run_loop<S: LocalStore, R: RemoteAuthority>(
    engine: Arc<ReplicationEngine<S, R>>,
    interval: Duration,
    startup_delay: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    info!("Sync loop started");

    tokio::select! {
        biased;
        _ = shutdown_rx.changed() => {
            info!("Sync loop stopped before first cycle");
            return;
        }
        _ = tokio::time::sleep(startup_delay) => {}
    }

    // First tick fires immediately: the post-grace cycle.
    let mut timer = tokio::time::interval(interval);
    timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    debug!("Sync loop received shutdown");
                    break;
                }
            }
            _ = timer.tick() => {
                let outcome = engine.run_cycle(None).await;
                debug!(outcome = outcome.label(), "Scheduled cycle finished");
            }
        }
    }

    info!("Sync loop exited");
}
