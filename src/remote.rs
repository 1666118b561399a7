// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Remote authority abstraction.
//!
//! The engine talks to the authority through [`RemoteAuthority`], which
//! exposes exactly the two calls a cycle needs: a cheap health check and a
//! bulk POST of one serialized batch. [`HttpRemote`] is the production
//! implementation over reqwest; tests substitute scripted mocks.
//!
//! # Response Classification
//!
//! | Response | Result |
//! |----------|--------|
//! | 2xx, empty or JSON body | `Ok(())` |
//! | 2xx, other body | `MalformedResponse` (retryable) |
//! | 408, 425, 429, 5xx | `RemoteStatus` (retryable) |
//! | other 4xx | `RemoteStatus` (fatal) |
//! | request timed out | `Timeout` (retryable) |
//! | connect/DNS/IO failure | `Transport` (retryable) |

use crate::config::RemoteConfig;
use crate::error::{ReplicationError, Result};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tracing::debug;

/// Boxed future returned by remote operations.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

const MAX_LOG_BODY_CHARS: usize = 512;

/// Which health endpoint to check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeTarget {
    Primary,
    Fallback,
}

/// Calls the engine makes against the remote authority.
pub trait RemoteAuthority: Send + Sync + 'static {
    /// One health request. `Ok(())` means the target answered 2xx.
    fn check_health(&self, target: ProbeTarget) -> BoxFuture<'_, ()>;

    /// Whether a fallback probe target is configured.
    fn has_fallback(&self) -> bool {
        false
    }

    /// POST one JSON array body to `endpoint` and classify the response.
    fn post_batch<'a>(&'a self, endpoint: &'a str, body: Vec<u8>) -> BoxFuture<'a, ()>;
}

/// Remote authority over HTTP.
pub struct HttpRemote {
    client: reqwest::Client,
    config: RemoteConfig,
    headers: HeaderMap,
}

impl HttpRemote {
    pub fn new(config: &RemoteConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.transmit_timeout())
            .build()
            .map_err(|e| ReplicationError::Config(format!("Failed to build HTTP client: {}", e)))?;

        let mut headers = HeaderMap::new();
        if let Some(token) = &config.api_token {
            let value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|_| ReplicationError::Config("Invalid api_token format".into()))?;
            headers.insert(AUTHORIZATION, value);
        }

        Ok(Self {
            client,
            config: config.clone(),
            headers,
        })
    }

    pub fn config(&self) -> &RemoteConfig {
        &self.config
    }

    fn probe_url(&self, target: ProbeTarget) -> Option<String> {
        match target {
            ProbeTarget::Primary => Some(self.config.url_for(&self.config.health_path)),
            ProbeTarget::Fallback => self.config.fallback_probe_url.clone(),
        }
    }

    async fn get_ok(&self, url: &str, timeout: Duration) -> Result<()> {
        let response = self
            .client
            .get(url)
            .headers(self.headers.clone())
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| map_send_error(url, "probe", timeout, e))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(ReplicationError::remote_status(url, status.as_u16(), String::new()))
        }
    }

    async fn post(&self, endpoint: &str, body: Vec<u8>) -> Result<()> {
        let url = self.config.url_for(endpoint);
        let timeout = self.config.transmit_timeout();
        let response = self
            .client
            .post(&url)
            .headers(self.headers.clone())
            .header(CONTENT_TYPE, "application/json")
            .timeout(timeout)
            .body(body)
            .send()
            .await
            .map_err(|e| map_send_error(endpoint, "transmit", timeout, e))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| map_send_error(endpoint, "transmit", timeout, e))?;

        if !status.is_success() {
            return Err(ReplicationError::remote_status(endpoint, status.as_u16(), truncate_body(&text)));
        }
        if !text.trim().is_empty() {
            serde_json::from_str::<serde_json::Value>(&text).map_err(|e| {
                ReplicationError::MalformedResponse {
                    endpoint: endpoint.to_string(),
                    message: format!("{}: {}", e, truncate_body(&text)),
                }
            })?;
        }
        debug!(endpoint = %endpoint, status = status.as_u16(), "Batch accepted");
        Ok(())
    }
}

fn map_send_error(endpoint: &str, operation: &str, timeout: Duration, e: reqwest::Error) -> ReplicationError {
    if e.is_timeout() {
        ReplicationError::timeout(format!("{} {}", operation, endpoint), timeout)
    } else {
        ReplicationError::transport(endpoint, e)
    }
}

fn truncate_body(body: &str) -> String {
    if body.chars().count() <= MAX_LOG_BODY_CHARS {
        return body.to_string();
    }
    let mut out: String = body.chars().take(MAX_LOG_BODY_CHARS).collect();
    out.push_str("...");
    out
}

impl RemoteAuthority for HttpRemote {
    fn check_health(&self, target: ProbeTarget) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            let url = self
                .probe_url(target)
                .ok_or_else(|| ReplicationError::Config("no fallback probe URL configured".into()))?;
            self.get_ok(&url, self.config.probe_timeout()).await
        })
    }

    fn has_fallback(&self) -> bool {
        self.config.fallback_probe_url.is_some()
    }

    fn post_batch<'a>(&'a self, endpoint: &'a str, body: Vec<u8>) -> BoxFuture<'a, ()> {
        Box::pin(self.post(endpoint, body))
    }
}
