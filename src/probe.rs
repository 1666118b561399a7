// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Connectivity probe.
//!
//! A bounded-time reachability check run at the start of every cycle. All
//! failures collapse to `false`: an unreachable authority is the normal
//! offline state of a station, not an error.

use crate::metrics;
use crate::remote::{ProbeTarget, RemoteAuthority};
use std::time::Duration;
use tokio::time::timeout;
use tracing::debug;

/// Checks whether the remote authority answers.
#[derive(Debug, Clone)]
pub struct ConnectivityProbe {
    engine: String,
    timeout: Duration,
}

impl ConnectivityProbe {
    pub fn new(engine: &str, timeout: Duration) -> Self {
        Self {
            engine: engine.to_string(),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// `true` if the primary health endpoint (or, failing that, the fallback)
    /// answered within the probe timeout.
    pub async fn is_reachable<R: RemoteAuthority + ?Sized>(&self, remote: &R) -> bool {
        if self.check(remote, ProbeTarget::Primary).await {
            metrics::record_probe(&self.engine, true, false);
            return true;
        }
        if !remote.has_fallback() {
            metrics::record_probe(&self.engine, false, false);
            return false;
        }

        let reachable = self.check(remote, ProbeTarget::Fallback).await;
        metrics::record_probe(&self.engine, reachable, true);
        reachable
    }

    async fn check<R: RemoteAuthority + ?Sized>(&self, remote: &R, target: ProbeTarget) -> bool {
        match timeout(self.timeout, remote.check_health(target)).await {
            Ok(Ok(())) => {
                debug!(engine = %self.engine, ?target, "Remote reachable");
                true
            }
            Ok(Err(e)) => {
                debug!(engine = %self.engine, ?target, error = %e, "Probe failed");
                false
            }
            Err(_) => {
                debug!(
                    engine = %self.engine,
                    ?target,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Probe timed out"
                );
                false
            }
        }
    }
}
