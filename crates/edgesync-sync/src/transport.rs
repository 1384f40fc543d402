//! # Remote Transport
//!
//! HTTP client for the master's sync API.
//!
//! ## Wire Protocol
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Edge ◄──► Master                                  │
//! │                                                                         │
//! │  PULL                                                                   │
//! │  GET  {base}/pull/{entity}?since=2025-07-07%2000:00:00                 │
//! │       ◄── 200 [ {"id": 1, ...}, {"id": 2, ...} ]                       │
//! │                                                                         │
//! │  PUSH                                                                   │
//! │  POST {base}/push/{entity}                                             │
//! │       body: [ {"id": 1, ...} ]                                         │
//! │       ◄── 2xx (body ignored)                                           │
//! │                                                                         │
//! │  Non-2xx      → RemoteStatus { status }   (entity fails)               │
//! │  Not an array → InvalidResponse            (entity fails)               │
//! │  Timeout      → Timeout(secs)              (entity fails)               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::debug;
use url::Url;

use edgesync_core::record::json_kind;
use edgesync_core::{Record, Timestamp};

use crate::error::{SyncError, SyncResult};

/// Calls against the master, one entity at a time.
#[async_trait]
pub trait RemoteTransport: Send + Sync {
    /// Fetches records changed on the master. `since` is sent when given.
    async fn pull(&self, entity: &str, since: Option<Timestamp>) -> SyncResult<Vec<Value>>;

    /// Sends a batch of local changes. Success is judged by status only.
    async fn push(&self, entity: &str, records: &[Record]) -> SyncResult<()>;
}

/// reqwest-backed transport.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    base_url: Url,
    timeout: Duration,
}

impl HttpTransport {
    /// Creates a transport whose every request is bounded by `timeout`.
    pub fn new(base_url: Url, timeout: Duration) -> SyncResult<Self> {
        if base_url.cannot_be_a_base() {
            return Err(SyncError::InvalidUrl(base_url.to_string()));
        }

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SyncError::Internal(format!("Failed to create HTTP client: {e}")))?;

        Ok(HttpTransport {
            client,
            base_url,
            timeout,
        })
    }

    /// `{base}/{operation}/{entity}`, with the entity as one escaped segment.
    fn entity_url(&self, operation: &str, entity: &str) -> SyncResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| SyncError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .push(operation)
            .push(entity);
        Ok(url)
    }

    fn map_send_error(&self, err: reqwest::Error) -> SyncError {
        if err.is_timeout() {
            SyncError::Timeout(self.timeout.as_secs())
        } else {
            SyncError::ConnectionFailed(err.to_string())
        }
    }
}

#[async_trait]
impl RemoteTransport for HttpTransport {
    async fn pull(&self, entity: &str, since: Option<Timestamp>) -> SyncResult<Vec<Value>> {
        let mut url = self.entity_url("pull", entity)?;
        if let Some(since) = since {
            url.query_pairs_mut()
                .append_pair("since", &since.to_canonical());
        }

        debug!(entity = %entity, url = %url, "Pulling from master");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::RemoteStatus {
                status: status.as_u16(),
            });
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| SyncError::InvalidResponse(format!("body is not JSON: {e}")))?;

        match body {
            Value::Array(records) => Ok(records),
            other => Err(SyncError::InvalidResponse(format!(
                "expected a JSON array, got {}",
                json_kind(&other)
            ))),
        }
    }

    async fn push(&self, entity: &str, records: &[Record]) -> SyncResult<()> {
        let url = self.entity_url("push", entity)?;

        debug!(entity = %entity, count = records.len(), "Pushing to master");

        let response = self
            .client
            .post(url)
            .json(records)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::RemoteStatus {
                status: status.as_u16(),
            });
        }

        Ok(())
    }
}
