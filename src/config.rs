// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Configuration for the replication engine.
//!
//! Configuration is passed to [`ReplicationEngine::new()`](crate::ReplicationEngine::new)
//! and can be constructed programmatically or deserialized from JSON.
//! Durations are humantime strings (`"3s"`, `"5m"`, `"250ms"`).
//!
//! # Quick Start
//!
//! ```rust
//! use pos_replication::config::ReplicationConfig;
//!
//! let sales = ReplicationConfig::sales("https://pos.example.com");
//! let catalog = ReplicationConfig::catalog("https://pos.example.com");
//! assert!(sales.validate().is_ok());
//! assert!(catalog.schedule.interval() > sales.schedule.interval());
//! ```
//!
//! # Configuration Structure
//!
//! ```text
//! ReplicationConfig
//! ├── engine_name: String         # "sales", "catalog", used in logs and metrics
//! ├── remote: RemoteConfig        # base URL, probe/transmit timeouts
//! ├── schedule: ScheduleConfig    # grace delay + fixed interval
//! ├── batch: BatchConfig          # batch sizes and force ceiling
//! ├── retry: RetrySettings        # max retries, initial delay
//! ├── health: HealthConfig        # failure warning, slow cycle threshold
//! └── store: StoreConfig          # SQLite location
//! ```
//!
//! # JSON Example
//!
//! ```json
//! {
//!   "engine_name": "catalog",
//!   "remote": {
//!     "base_url": "https://pos.example.com",
//!     "probe_timeout": "3s",
//!     "transmit_timeout": "60s"
//!   },
//!   "schedule": { "interval": "10m", "startup_delay": "10s" },
//!   "batch": { "batch_size": 50 },
//!   "store": { "sqlite_path": "/var/lib/pos/station.db" }
//! }
//! ```

use crate::error::{ReplicationError, Result};
use crate::resilience::RetryConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

fn parse_duration(field: &str, value: &str) -> Result<Duration> {
    humantime::parse_duration(value)
        .map_err(|e| ReplicationError::Config(format!("{}: invalid duration '{}': {}", field, value, e)))
}

// ═══════════════════════════════════════════════════════════════════════════════
// Top-level config
// ═══════════════════════════════════════════════════════════════════════════════

/// The top-level config object passed to `ReplicationEngine::new()`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplicationConfig {
    /// Name of this engine instance ("sales", "catalog").
    #[serde(default = "default_engine_name")]
    pub engine_name: String,

    /// Remote authority location and timeouts.
    pub remote: RemoteConfig,

    #[serde(default)]
    pub schedule: ScheduleConfig,

    #[serde(default)]
    pub batch: BatchConfig,

    #[serde(default)]
    pub retry: RetrySettings,

    #[serde(default)]
    pub health: HealthConfig,

    #[serde(default)]
    pub store: StoreConfig,
}

fn default_engine_name() -> String {
    "sales".to_string()
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            engine_name: default_engine_name(),
            remote: RemoteConfig::default(),
            schedule: ScheduleConfig::default(),
            batch: BatchConfig::default(),
            retry: RetrySettings::default(),
            health: HealthConfig::default(),
            store: StoreConfig::default(),
        }
    }
}

impl ReplicationConfig {
    /// Transactional records: every 5 minutes, client default transmit timeout.
    pub fn sales(base_url: &str) -> Self {
        Self {
            engine_name: "sales".to_string(),
            remote: RemoteConfig::new(base_url),
            schedule: ScheduleConfig {
                interval: "5m".to_string(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Catalog records: every 10 minutes, 60s transmit timeout for larger payloads.
    pub fn catalog(base_url: &str) -> Self {
        Self {
            engine_name: "catalog".to_string(),
            remote: RemoteConfig {
                transmit_timeout: Some("60s".to_string()),
                ..RemoteConfig::new(base_url)
            },
            schedule: ScheduleConfig {
                interval: "10m".to_string(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Create a minimal config for testing.
    ///
    /// Millisecond delays everywhere and an in-memory store.
    pub fn for_testing(base_url: &str) -> Self {
        Self {
            engine_name: "test".to_string(),
            remote: RemoteConfig {
                probe_timeout: "500ms".to_string(),
                transmit_timeout: Some("2s".to_string()),
                ..RemoteConfig::new(base_url)
            },
            schedule: ScheduleConfig {
                enabled: true,
                interval: "200ms".to_string(),
                startup_delay: "10ms".to_string(),
            },
            batch: BatchConfig::default(),
            retry: RetrySettings {
                max_retries: 3,
                initial_retry_delay: "10ms".to_string(),
            },
            health: HealthConfig::default(),
            store: StoreConfig::in_memory(),
        }
    }

    /// Check the whole config, reporting the first problem found.
    pub fn validate(&self) -> Result<()> {
        if self.engine_name.trim().is_empty() {
            return Err(ReplicationError::Config("engine_name must not be empty".into()));
        }
        self.remote.validate()?;
        self.schedule.validate()?;
        self.batch.validate()?;
        self.retry.validate()?;
        self.health.validate()?;
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// RemoteConfig: where the authority lives and how long we wait for it
// ═══════════════════════════════════════════════════════════════════════════════

/// Remote authority endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Base URL, e.g. `https://pos.example.com`. Endpoint paths are appended.
    pub base_url: String,

    /// Lightweight endpoint used by the connectivity probe.
    #[serde(default = "default_health_path")]
    pub health_path: String,

    /// Secondary endpoint tried once when the primary probe fails.
    #[serde(default)]
    pub fallback_probe_url: Option<String>,

    /// Bearer token sent with every request.
    #[serde(default)]
    pub api_token: Option<String>,

    /// Deadline for each probe request.
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout: String,

    /// Deadline for each batch POST. `None` uses the client default (30s).
    #[serde(default)]
    pub transmit_timeout: Option<String>,
}

fn default_health_path() -> String {
    "/health".to_string()
}

fn default_probe_timeout() -> String {
    "3s".to_string()
}

/// Client default when no transmit timeout is configured.
pub const DEFAULT_TRANSMIT_TIMEOUT: Duration = Duration::from_secs(30);

impl Default for RemoteConfig {
    fn default() -> Self {
        Self::new("http://localhost:3000")
    }
}

impl RemoteConfig {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            health_path: default_health_path(),
            fallback_probe_url: None,
            api_token: None,
            probe_timeout: default_probe_timeout(),
            transmit_timeout: None,
        }
    }

    pub fn probe_timeout(&self) -> Duration {
        humantime::parse_duration(&self.probe_timeout).unwrap_or(Duration::from_secs(3))
    }

    pub fn transmit_timeout(&self) -> Duration {
        self.transmit_timeout
            .as_deref()
            .and_then(|t| humantime::parse_duration(t).ok())
            .unwrap_or(DEFAULT_TRANSMIT_TIMEOUT)
    }

    /// Join the base URL with an endpoint path.
    pub fn url_for(&self, path: &str) -> String {
        let base = self.base_url.trim_end_matches('/');
        if path.starts_with('/') {
            format!("{}{}", base, path)
        } else {
            format!("{}/{}", base, path)
        }
    }

    fn validate(&self) -> Result<()> {
        let url = self.base_url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ReplicationError::Config(format!(
                "remote.base_url must be an http(s) URL, got '{}'",
                self.base_url
            )));
        }
        if let Some(fallback) = &self.fallback_probe_url {
            if !(fallback.starts_with("http://") || fallback.starts_with("https://")) {
                return Err(ReplicationError::Config(format!(
                    "remote.fallback_probe_url must be an http(s) URL, got '{}'",
                    fallback
                )));
            }
        }
        let probe = parse_duration("remote.probe_timeout", &self.probe_timeout)?;
        if probe.is_zero() {
            return Err(ReplicationError::Config("remote.probe_timeout must be > 0".into()));
        }
        if let Some(t) = &self.transmit_timeout {
            if parse_duration("remote.transmit_timeout", t)?.is_zero() {
                return Err(ReplicationError::Config("remote.transmit_timeout must be > 0".into()));
            }
        }
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// ScheduleConfig: when cycles run
// ═══════════════════════════════════════════════════════════════════════════════

/// Periodic loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Whether `start_loop()` should run the periodic timer at all.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Time between periodic cycles.
    #[serde(default = "default_interval")]
    pub interval: String,

    /// Grace delay before the first cycle after start.
    #[serde(default = "default_startup_delay")]
    pub startup_delay: String,
}

fn default_true() -> bool {
    true
}

fn default_interval() -> String {
    "5m".to_string()
}

fn default_startup_delay() -> String {
    "10s".to_string()
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: default_interval(),
            startup_delay: default_startup_delay(),
        }
    }
}

impl ScheduleConfig {
    pub fn interval(&self) -> Duration {
        humantime::parse_duration(&self.interval).unwrap_or(Duration::from_secs(300))
    }

    pub fn startup_delay(&self) -> Duration {
        humantime::parse_duration(&self.startup_delay).unwrap_or(Duration::from_secs(10))
    }

    fn validate(&self) -> Result<()> {
        if parse_duration("schedule.interval", &self.interval)?.is_zero() {
            return Err(ReplicationError::Config("schedule.interval must be > 0".into()));
        }
        parse_duration("schedule.startup_delay", &self.startup_delay)?;
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// BatchConfig
// ═══════════════════════════════════════════════════════════════════════════════

/// Batch sizing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Default limit for the final phase of a cycle.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Fixed limit for predecessor phases (e.g. categories before products).
    #[serde(default = "default_parent_batch_size")]
    pub parent_batch_size: usize,

    /// Hard ceiling for caller-supplied limits.
    #[serde(default = "default_max_force_limit")]
    pub max_force_limit: usize,
}

fn default_batch_size() -> usize {
    50
}

fn default_parent_batch_size() -> usize {
    100
}

fn default_max_force_limit() -> usize {
    1000
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            parent_batch_size: default_parent_batch_size(),
            max_force_limit: default_max_force_limit(),
        }
    }
}

impl BatchConfig {
    fn validate(&self) -> Result<()> {
        if self.max_force_limit == 0 {
            return Err(ReplicationError::Config("batch.max_force_limit must be > 0".into()));
        }
        for (name, value) in [
            ("batch.batch_size", self.batch_size),
            ("batch.parent_batch_size", self.parent_batch_size),
        ] {
            if value == 0 || value > self.max_force_limit {
                return Err(ReplicationError::Config(format!(
                    "{} must be between 1 and {}, got {}",
                    name, self.max_force_limit, value
                )));
            }
        }
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// RetrySettings
// ═══════════════════════════════════════════════════════════════════════════════

/// Serializable retry knobs. Converted to a [`RetryConfig`] by the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_initial_retry_delay")]
    pub initial_retry_delay: String,
}

fn default_max_retries() -> u32 {
    3
}

fn default_initial_retry_delay() -> String {
    "1s".to_string()
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_retry_delay: default_initial_retry_delay(),
        }
    }
}

impl RetrySettings {
    /// Doubling backoff from `initial_retry_delay`.
    ///
    /// The ceiling is the last configured wait, `initial * 2^(max_retries - 1)`,
    /// so no configured retry is ever clamped.
    pub fn retry_config(&self) -> RetryConfig {
        let initial_delay = humantime::parse_duration(&self.initial_retry_delay).unwrap_or(Duration::from_secs(1));
        let doublings = self.max_retries.saturating_sub(1).min(31);
        RetryConfig {
            max_retries: self.max_retries,
            initial_delay,
            max_delay: initial_delay.saturating_mul(1u32 << doublings),
            backoff_factor: 2.0,
        }
    }

    fn validate(&self) -> Result<()> {
        parse_duration("retry.initial_retry_delay", &self.initial_retry_delay)?;
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// HealthConfig: warning thresholds
// ═══════════════════════════════════════════════════════════════════════════════

/// Thresholds that trigger warnings. Never stop the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthConfig {
    /// Consecutive failed cycles before stats report a warning.
    #[serde(default = "default_failure_warning_threshold")]
    pub failure_warning_threshold: u32,

    /// Cycles slower than this are logged.
    #[serde(default = "default_slow_cycle_threshold")]
    pub slow_cycle_threshold: String,
}

fn default_failure_warning_threshold() -> u32 {
    5
}

fn default_slow_cycle_threshold() -> String {
    "10s".to_string()
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            failure_warning_threshold: default_failure_warning_threshold(),
            slow_cycle_threshold: default_slow_cycle_threshold(),
        }
    }
}

impl HealthConfig {
    pub fn slow_cycle_threshold(&self) -> Duration {
        humantime::parse_duration(&self.slow_cycle_threshold).unwrap_or(Duration::from_secs(10))
    }

    /// Check if a cycle duration counts as slow.
    pub fn is_slow_cycle(&self, elapsed: Duration) -> bool {
        elapsed > self.slow_cycle_threshold()
    }

    /// Check if a failure streak should raise the warning flag.
    pub fn is_failure_warning(&self, consecutive_failures: u32) -> bool {
        consecutive_failures >= self.failure_warning_threshold
    }

    fn validate(&self) -> Result<()> {
        parse_duration("health.slow_cycle_threshold", &self.slow_cycle_threshold)?;
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// StoreConfig
// ═══════════════════════════════════════════════════════════════════════════════

/// Local SQLite store location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Path to the station database.
    #[serde(default = "default_sqlite_path")]
    pub sqlite_path: String,

    /// Use WAL journal mode.
    #[serde(default = "default_true")]
    pub wal_mode: bool,
}

fn default_sqlite_path() -> String {
    "pos_station.db".to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            sqlite_path: default_sqlite_path(),
            wal_mode: true,
        }
    }
}

impl StoreConfig {
    /// Create an in-memory config (for testing).
    pub fn in_memory() -> Self {
        Self {
            sqlite_path: ":memory:".to_string(),
            wal_mode: false,
        }
    }

    pub fn is_in_memory(&self) -> bool {
        self.sqlite_path == ":memory:"
    }
}
