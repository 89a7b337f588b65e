use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use tracing::debug;

use crate::credential::Credential;
use crate::error::{Result, SyncError};
use crate::models::{BatchAck, BatchItem, Reachability};

const BATCH_PATH: &str = "/api/v1/sync/batch";
const HEALTH_PATH: &str = "/health";

/// Backend service of record. Applying the same id twice must not double-apply
/// the mutation; that guarantee belongs to the implementor.
#[async_trait]
pub trait RemoteAuthority: Send + Sync {
    /// Returns the ids that were durably committed, a subset of `items`.
    async fn submit_batch(&self, credential: &Credential, items: &[BatchItem]) -> Result<BatchAck>;
}

#[derive(Debug, Serialize)]
struct BatchRequest<'a> {
    items: &'a [BatchItem],
}

#[derive(Clone)]
pub struct HttpRemoteAuthority {
    base_url: String,
    http: Client,
}

impl std::fmt::Debug for HttpRemoteAuthority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpRemoteAuthority")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl HttpRemoteAuthority {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: normalize_base_url(base_url),
            http,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Reachability for hosts without native online/offline events. Any answer
    /// from the server, even an error status, means the network path is up.
    pub async fn probe(&self) -> Reachability {
        let url = format!("{}{HEALTH_PATH}", self.base_url);
        match self.http.get(url).send().await {
            Ok(resp) => {
                debug!(status = %resp.status(), "reachability probe answered");
                Reachability::Online
            }
            Err(err) => {
                debug!(error = %err, "reachability probe failed");
                Reachability::Offline
            }
        }
    }
}

#[async_trait]
impl RemoteAuthority for HttpRemoteAuthority {
    async fn submit_batch(&self, credential: &Credential, items: &[BatchItem]) -> Result<BatchAck> {
        let url = format!("{}{BATCH_PATH}", self.base_url);
        let resp = self
            .http
            .post(url)
            .bearer_auth(credential.token())
            .json(&BatchRequest { items })
            .send()
            .await?;

        let status = resp.status();
        if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
            return Err(SyncError::Auth(format!(
                "remote authority rejected credential with status {status}"
            )));
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(SyncError::Transport(format!(
                "batch submission failed with status {status}: {}",
                truncate(&body, 200)
            )));
        }

        let ack = resp
            .json::<BatchAck>()
            .await
            .map_err(|err| SyncError::Transport(format!("malformed batch response: {err}")))?;
        Ok(ack)
    }
}

fn normalize_base_url(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}

fn truncate(raw: &str, max_chars: usize) -> &str {
    match raw.char_indices().nth(max_chars) {
        Some((idx, _)) => &raw[..idx],
        None => raw,
    }
}
