// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Metrics for observability.
//!
//! Emits through the `metrics` facade; the host application installs the
//! exporter. Covers:
//! - Cycle outcomes and duration
//! - Connectivity probes
//! - Transmission attempts and retries
//! - Commits and pending backlog
//!
//! # Metric Naming Convention
//!
//! All metrics are prefixed with `pos_sync_` and follow Prometheus conventions:
//! - Counters end in `_total`
//! - Gauges represent current state
//! - Histograms track distributions (duration, size)
//!
//! Every metric carries an `engine` label ("sales", "catalog").
//!
//! # Usage
//!
//! ```rust,no_run
//! use pos_replication::metrics;
//! use std::time::Duration;
//!
//! metrics::record_probe("sales", true, false);
//! metrics::record_cycle_duration("sales", Duration::from_millis(420));
//! ```

use metrics::{counter, gauge, histogram};
use std::time::Duration;

/// Record how a cycle ended ("completed", "partial", "failed", "offline", "skipped").
pub fn record_cycle_outcome(engine: &str, outcome: &'static str) {
    counter!("pos_sync_cycles_total", "engine" => engine.to_string(), "outcome" => outcome).increment(1);
}

/// Record end-to-end cycle duration.
pub fn record_cycle_duration(engine: &str, elapsed: Duration) {
    histogram!("pos_sync_cycle_duration_seconds", "engine" => engine.to_string()).record(elapsed.as_secs_f64());
}

/// Record a cycle that exceeded the slow-cycle threshold.
pub fn record_slow_cycle(engine: &str) {
    counter!("pos_sync_slow_cycles_total", "engine" => engine.to_string()).increment(1);
}

/// Record a connectivity probe result.
pub fn record_probe(engine: &str, reachable: bool, via_fallback: bool) {
    let status = if reachable { "reachable" } else { "unreachable" };
    let target = if via_fallback { "fallback" } else { "primary" };
    counter!(
        "pos_sync_probes_total",
        "engine" => engine.to_string(),
        "status" => status,
        "target" => target
    )
    .increment(1);
}

/// Record one transmission attempt ("accepted", "retryable", "fatal").
pub fn record_transmit_attempt(engine: &str, kind: &str, outcome: &'static str) {
    counter!(
        "pos_sync_transmit_attempts_total",
        "engine" => engine.to_string(),
        "kind" => kind.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

/// Record a backoff before retrying a transmission.
pub fn record_transmit_retry(engine: &str, kind: &str, delay: Duration) {
    counter!("pos_sync_transmit_retries_total", "engine" => engine.to_string(), "kind" => kind.to_string())
        .increment(1);
    histogram!("pos_sync_transmit_backoff_seconds", "engine" => engine.to_string()).record(delay.as_secs_f64());
}

/// Record batch size and serialized payload size of an accepted batch.
pub fn record_batch_transmitted(engine: &str, kind: &str, records: usize, bytes: usize) {
    histogram!("pos_sync_batch_size", "engine" => engine.to_string(), "kind" => kind.to_string())
        .record(records as f64);
    histogram!("pos_sync_batch_bytes", "engine" => engine.to_string(), "kind" => kind.to_string())
        .record(bytes as f64);
}

/// Record rows moved to `sent`.
pub fn record_committed(engine: &str, kind: &str, records: u64, nested: u64) {
    counter!("pos_sync_records_sent_total", "engine" => engine.to_string(), "kind" => kind.to_string())
        .increment(records);
    counter!("pos_sync_nested_sent_total", "engine" => engine.to_string(), "kind" => kind.to_string())
        .increment(nested);
}

/// Record a commit that failed after the remote accepted the batch.
pub fn record_commit_failure(engine: &str, kind: &str) {
    counter!("pos_sync_commit_failures_total", "engine" => engine.to_string(), "kind" => kind.to_string())
        .increment(1);
}

/// Set the pending backlog for a kind.
pub fn set_pending(engine: &str, kind: &str, count: u64) {
    gauge!("pos_sync_pending_records", "engine" => engine.to_string(), "kind" => kind.to_string())
        .set(count as f64);
}

/// Set the consecutive failure streak.
pub fn set_consecutive_failures(engine: &str, failures: u32) {
    gauge!("pos_sync_consecutive_failures", "engine" => engine.to_string()).set(failures as f64);
}

/// Set the current cycle phase (1 for the active phase label).
pub fn set_cycle_phase(engine: &str, phase: &str) {
    gauge!("pos_sync_cycle_phase", "engine" => engine.to_string(), "phase" => phase.to_string()).set(1.0);
}

/// Set whether the scheduler loop is running.
pub fn set_loop_running(engine: &str, running: bool) {
    gauge!("pos_sync_loop_running", "engine" => engine.to_string()).set(if running { 1.0 } else { 0.0 });
}

/// Record SQLite busy retries.
pub fn record_store_retry(operation: &str) {
    counter!("pos_sync_store_retries_total", "operation" => operation.to_string()).increment(1);
}
