//! Remote storage API connector
//!
//! Implements [`RemoteStorage`] against the list/upload HTTP API.

use async_trait::async_trait;
use bridge_traits::error::{BridgeError, Result};
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy};
use bridge_traits::storage::{FileEntry, RemoteStorage};
use chrono::{DateTime, Utc};
use core_runtime::config::RemoteConfig;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, UNIX_EPOCH};
use tracing::{debug, info, instrument, warn};

use crate::remote_path;
use crate::types::{ApiResponse, ListData, ListEntry, ListRequest};

const LIST_ENDPOINT: &str = "/api/fs/list";
const PUT_ENDPOINT: &str = "/api/fs/put";

/// Remote storage API connector
///
/// # Example
///
/// ```ignore
/// use provider_alist::AlistClient;
/// use bridge_traits::storage::RemoteStorage;
///
/// let client = AlistClient::new(http_client, &remote_config);
/// let entries = client.list_directory("/media").await?;
/// ```
pub struct AlistClient {
    http_client: Arc<dyn HttpClient>,
    base_url: String,
    /// Sent verbatim as the `Authorization` header.
    token: String,
    request_timeout: Duration,
    retry_policy: RetryPolicy,
}

impl AlistClient {
    pub fn new(http_client: Arc<dyn HttpClient>, config: &RemoteConfig) -> Self {
        Self {
            http_client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
            request_timeout: config.request_timeout,
            retry_policy: RetryPolicy::default(),
        }
    }

    /// Retry policy applied to uploads.
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Unwraps the response envelope, turning HTTP and business failures
    /// into `BridgeError::Rejected`.
    fn parse_envelope<T: DeserializeOwned>(response: &HttpResponse) -> Result<ApiResponse<T>> {
        if !response.is_success() {
            let message = response
                .text()
                .unwrap_or_else(|_| format!("HTTP {}", response.status));
            return Err(BridgeError::Rejected {
                code: i64::from(response.status),
                message,
            });
        }

        let envelope: ApiResponse<T> = response.json()?;
        if !envelope.is_ok() {
            return Err(BridgeError::Rejected {
                code: envelope.code,
                message: envelope.message,
            });
        }

        Ok(envelope)
    }

    fn convert_entry(dir: &str, entry: ListEntry) -> FileEntry {
        let path = remote_path::join(dir, &entry.name);
        let mut file = if entry.is_dir {
            FileEntry::directory(path)
        } else {
            FileEntry::file(path, entry.size)
        };

        if let Some(modified) = entry.modified.as_deref().and_then(parse_timestamp) {
            file = file.with_modified(modified);
        }
        if let Some(sign) = entry.sign.filter(|s| !s.is_empty()) {
            file = file.with_access_token(sign);
        }
        if let Some(thumb) = entry.thumb.filter(|t| !t.is_empty()) {
            file = file.with_thumb(thumb);
        }
        file
    }
}

fn parse_timestamp(rfc3339: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(rfc3339)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[async_trait]
impl RemoteStorage for AlistClient {
    #[instrument(skip(self), fields(path = %path))]
    async fn list_directory(&self, path: &str) -> Result<Vec<FileEntry>> {
        let dir = remote_path::normalize_dir(path);

        let request = HttpRequest::new(HttpMethod::Post, self.endpoint(LIST_ENDPOINT))
            .authorization(self.token.clone())
            .timeout(self.request_timeout)
            .json(&ListRequest::all(&dir))?;

        // Listings are never retried; a failed directory is reported to the caller.
        let response = self
            .http_client
            .execute_with_retry(request, RetryPolicy::none())
            .await?;

        let envelope = Self::parse_envelope::<ListData>(&response).map_err(|e| {
            warn!(error = %e, "Directory listing rejected");
            e
        })?;

        let entries: Vec<FileEntry> = envelope
            .data
            .and_then(|data| data.content)
            .unwrap_or_default()
            .into_iter()
            .map(|entry| Self::convert_entry(&dir, entry))
            .collect();

        debug!(count = entries.len(), "Listed remote directory");
        Ok(entries)
    }

    #[instrument(skip(self, local_path), fields(local = %local_path.display(), remote = %remote_path))]
    async fn upload_file(&self, local_path: &Path, remote_path: &str) -> Result<()> {
        let metadata = core_async::fs::metadata(local_path).await?;
        let length = metadata.len();
        let last_modified = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_millis() as i64)
            .unwrap_or_else(|| Utc::now().timestamp_millis());

        let request = HttpRequest::new(HttpMethod::Put, self.endpoint(PUT_ENDPOINT))
            .authorization(self.token.clone())
            .header("file-path", urlencoding::encode(remote_path).into_owned())
            .header("Last-Modified", last_modified.to_string())
            .file_body(local_path, length)
            .timeout(self.request_timeout);

        let response = self
            .http_client
            .execute_with_retry(request, self.retry_policy.clone())
            .await?;

        Self::parse_envelope::<serde_json::Value>(&response)?;

        info!(bytes = length, "Uploaded file");
        Ok(())
    }
}
