// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Error types for the replication engine.
//!
//! Errors are categorized by where they happen (remote authority, local
//! store, caller input) and carry enough context to debug a failed cycle
//! from logs alone.
//!
//! # Error Categories
//!
//! | Error Type | Retryable | Description |
//! |------------|-----------|-------------|
//! | `Transport` | Yes | Connection refused, reset, DNS failure |
//! | `Timeout` | Yes | Probe or transmission exceeded its deadline |
//! | `RemoteStatus` | 408/425/429/5xx | Remote answered with a non-2xx status |
//! | `MalformedResponse` | Yes | 2xx with a body we could not read |
//! | `RetriesExhausted` | No | Retry budget spent (already retried) |
//! | `Store` | No | Local SQLite errors |
//! | `StoreUnavailable` | No | Local store cannot serve requests |
//! | `Serialization` | No | Payload is not valid JSON |
//! | `InvalidLimit` | No | Caller supplied a batch limit outside `[1, ceiling]` |
//! | `Config` | No | Configuration invalid |
//! | `InvalidState` | No | Scheduler/engine state violation |
//! | `Internal` | No | Unexpected internal error |
//!
//! # Retry Behavior
//!
//! The [`Transmitter`](crate::transmit::Transmitter) consults
//! [`ReplicationError::is_retryable()`] after every failed attempt.
//! Non-retryable errors end the phase immediately; nothing in this crate
//! is fatal to the host process.

use thiserror::Error;

/// Result type alias for replication operations.
pub type Result<T> = std::result::Result<T, ReplicationError>;

/// Errors that can occur during replication.
#[derive(Error, Debug)]
pub enum ReplicationError {
    /// Network-level failure talking to the remote authority.
    #[error("Transport error ({endpoint}): {message}")]
    Transport {
        endpoint: String,
        message: String,
        #[source]
        source: Option<reqwest::Error>,
    },

    /// A probe or transmission did not complete within its deadline.
    #[error("Timed out after {timeout_ms}ms ({operation})")]
    Timeout { operation: String, timeout_ms: u64 },

    /// The remote authority answered with a non-success status.
    #[error("Remote returned HTTP {status} ({endpoint}): {body}")]
    RemoteStatus {
        endpoint: String,
        status: u16,
        body: String,
    },

    /// The remote answered 2xx but the body was not understood.
    #[error("Malformed response ({endpoint}): {message}")]
    MalformedResponse { endpoint: String, message: String },

    /// Every attempt in the retry budget failed.
    ///
    /// Not retryable: the transmitter has already retried. Records stay
    /// pending and are picked up by the next cycle.
    #[error("Gave up after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        last: Box<ReplicationError>,
    },

    /// SQLite error in the local store.
    #[error("Local store error: {0}")]
    Store(#[from] sqlx::Error),

    /// The local store cannot serve requests right now.
    #[error("Local store unavailable: {0}")]
    StoreUnavailable(String),

    /// A payload could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Caller supplied a batch limit outside the allowed range.
    #[error("Invalid batch limit {limit}: must be between 1 and {ceiling}")]
    InvalidLimit { limit: i64, ceiling: usize },

    /// Invalid or missing configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Operation attempted in the wrong state
    /// (e.g. starting a scheduler loop that is already running).
    #[error("Invalid state: expected {expected}, got {actual}")]
    InvalidState { expected: String, actual: String },

    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ReplicationError {
    /// Create a transport error from a reqwest error.
    pub fn transport(endpoint: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Transport {
            endpoint: endpoint.into(),
            message: source.to_string(),
            source: Some(source),
        }
    }

    /// Create a transport error without source.
    pub fn transport_msg(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transport {
            endpoint: endpoint.into(),
            message: message.into(),
            source: None,
        }
    }

    /// Create a timeout error.
    pub fn timeout(operation: impl Into<String>, timeout: std::time::Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_ms: timeout.as_millis() as u64,
        }
    }

    /// Create a non-2xx status error.
    pub fn remote_status(endpoint: impl Into<String>, status: u16, body: impl Into<String>) -> Self {
        Self::RemoteStatus {
            endpoint: endpoint.into(),
            status,
            body: body.into(),
        }
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport { .. } => true,
            Self::Timeout { .. } => true,
            Self::RemoteStatus { status, .. } => is_retryable_status(*status),
            Self::MalformedResponse { .. } => true,
            Self::RetriesExhausted { .. } => false, // Budget already spent
            Self::Store(_) => false,                // Local DB issues need attention
            Self::StoreUnavailable(_) => false,
            Self::Serialization(_) => false,
            Self::InvalidLimit { .. } => false,
            Self::Config(_) => false,
            Self::InvalidState { .. } => false,
            Self::Internal(_) => false,
        }
    }

    /// Short label for metrics and structured logs.
    pub fn kind_label(&self) -> &'static str {
        match self {
            Self::Transport { .. } => "transport",
            Self::Timeout { .. } => "timeout",
            Self::RemoteStatus { .. } => "status",
            Self::MalformedResponse { .. } => "malformed",
            Self::RetriesExhausted { .. } => "exhausted",
            Self::Store(_) | Self::StoreUnavailable(_) => "store",
            Self::Serialization(_) => "serialization",
            Self::InvalidLimit { .. } => "invalid_limit",
            Self::Config(_) => "config",
            Self::InvalidState { .. } => "invalid_state",
            Self::Internal(_) => "internal",
        }
    }
}

/// Statuses worth another attempt: request timeout, too early,
/// rate limiting and every server-side error.
pub fn is_retryable_status(status: u16) -> bool {
    matches!(status, 408 | 425 | 429 | 500..=599)
}
