// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Batch transmission with bounded retry.
//!
//! One POST per kind per phase. Retryable failures are retried with
//! exponential backoff; anything else ends the phase at once. The
//! transmitter never touches local state.
//!
//! ```text
//! attempt 1 ──✗──▶ wait 1s ──▶ attempt 2 ──✗──▶ wait 2s ──▶ attempt 3 ──✓──▶ accepted
//!                                                    (max_retries = 3: at most 4 attempts)
//! ```

use crate::error::{ReplicationError, Result};
use crate::kind::EntityKind;
use crate::metrics;
use crate::record::{encode_batch, SyncRecord};
use crate::remote::RemoteAuthority;
use crate::resilience::RetryConfig;
use tracing::{debug, error, info, warn};

/// Outcome of an accepted transmission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransmitReceipt {
    pub accepted: bool,
    /// Records in the accepted batch.
    pub transmitted: usize,
    /// Nested sub-records that rode along.
    pub nested_transmitted: usize,
    /// Attempts used, including the successful one.
    pub attempts: u32,
}

/// Sends batches to the remote authority.
#[derive(Debug, Clone)]
pub struct Transmitter {
    engine: String,
    retry: RetryConfig,
}

impl Transmitter {
    pub fn new(engine: &str, retry: RetryConfig) -> Self {
        Self {
            engine: engine.to_string(),
            retry,
        }
    }

    pub fn retry_config(&self) -> &RetryConfig {
        &self.retry
    }

    /// Serialize `batch` and POST it to `kind.endpoint`.
    ///
    /// Returns a receipt only when the authority answered 2xx. Exhausting the
    /// retry budget yields [`ReplicationError::RetriesExhausted`]; a
    /// non-retryable failure is returned as-is after a single attempt.
    pub async fn send<R: RemoteAuthority + ?Sized>(
        &self,
        remote: &R,
        kind: &EntityKind,
        batch: &[SyncRecord],
    ) -> Result<TransmitReceipt> {
        let nested_transmitted = batch.iter().map(SyncRecord::nested_count).sum();
        if batch.is_empty() {
            return Ok(TransmitReceipt {
                accepted: true,
                transmitted: 0,
                nested_transmitted,
                attempts: 0,
            });
        }

        let body = encode_batch(batch)?;
        let bytes = body.len();
        let max_attempts = self.retry.max_attempts();
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            match remote.post_batch(&kind.endpoint, body.clone()).await {
                Ok(()) => {
                    metrics::record_transmit_attempt(&self.engine, &kind.name, "accepted");
                    metrics::record_batch_transmitted(&self.engine, &kind.name, batch.len(), bytes);
                    info!(
                        engine = %self.engine,
                        kind = %kind.name,
                        records = batch.len(),
                        nested = nested_transmitted,
                        bytes,
                        attempt,
                        "Batch accepted by remote"
                    );
                    return Ok(TransmitReceipt {
                        accepted: true,
                        transmitted: batch.len(),
                        nested_transmitted,
                        attempts: attempt,
                    });
                }
                Err(e) if !e.is_retryable() => {
                    metrics::record_transmit_attempt(&self.engine, &kind.name, "fatal");
                    error!(
                        engine = %self.engine,
                        kind = %kind.name,
                        attempt,
                        error = %e,
                        "Batch rejected, not retrying"
                    );
                    return Err(e);
                }
                Err(e) if attempt >= max_attempts => {
                    metrics::record_transmit_attempt(&self.engine, &kind.name, "retryable");
                    error!(
                        engine = %self.engine,
                        kind = %kind.name,
                        attempts = attempt,
                        error = %e,
                        "Transmission failed, retries exhausted"
                    );
                    return Err(ReplicationError::RetriesExhausted {
                        attempts: attempt,
                        last: Box::new(e),
                    });
                }
                Err(e) => {
                    metrics::record_transmit_attempt(&self.engine, &kind.name, "retryable");
                    let delay = self.retry.delay_for_attempt(attempt);
                    warn!(
                        engine = %self.engine,
                        kind = %kind.name,
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Transmission failed, backing off"
                    );
                    metrics::record_transmit_retry(&self.engine, &kind.name, delay);
                    tokio::time::sleep(delay).await;
                    debug!(engine = %self.engine, kind = %kind.name, attempt = attempt + 1, "Retrying transmission");
                }
            }
        }
    }
}
