//! Storage Abstractions
//!
//! [`FileEntry`] is the shape every discovered file takes, whether it came
//! from walking a local tree or from listing a remote directory.
//! [`RemoteStorage`] is the list/upload contract of the remote object store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::Result;

/// One discovered file or directory.
///
/// `path` is absolute (local filesystem path or remote path) and always uses
/// forward slashes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileEntry {
    pub path: String,
    pub name: String,
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
    pub is_directory: bool,
    pub is_symlink: bool,
    /// Remote access token (`sign`) attached to the listing entry.
    pub access_token: Option<String>,
    /// Provider generated preview URL.
    pub thumb: Option<String>,
}

impl FileEntry {
    pub fn file(path: impl Into<String>, size: u64) -> Self {
        let path = path.into().replace('\\', "/");
        let name = path.rsplit('/').next().unwrap_or_default().to_string();
        Self {
            path,
            name,
            size,
            modified: None,
            is_directory: false,
            is_symlink: false,
            access_token: None,
            thumb: None,
        }
    }

    pub fn directory(path: impl Into<String>) -> Self {
        Self {
            is_directory: true,
            ..Self::file(path, 0)
        }
    }

    pub fn with_modified(mut self, modified: DateTime<Utc>) -> Self {
        self.modified = Some(modified);
        self
    }

    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    pub fn with_thumb(mut self, thumb: impl Into<String>) -> Self {
        self.thumb = Some(thumb.into());
        self
    }

    /// Lower-cased extension without the dot.
    pub fn extension(&self) -> Option<String> {
        let (stem, ext) = self.name.rsplit_once('.')?;
        if stem.is_empty() || ext.is_empty() {
            return None;
        }
        Some(ext.to_ascii_lowercase())
    }

    /// File name without its final extension.
    pub fn stem(&self) -> &str {
        match self.name.rsplit_once('.') {
            Some((stem, _)) if !stem.is_empty() => stem,
            _ => &self.name,
        }
    }

    /// Path of the containing directory (`/` for top-level entries).
    pub fn parent_path(&self) -> &str {
        match self.path.rsplit_once('/') {
            Some(("", _)) | None => "/",
            Some((parent, _)) => parent,
        }
    }
}

/// Remote object store reachable through a list/upload API.
///
/// # Errors
///
/// - `BridgeError::Network` / `BridgeError::Timeout` for transport failures
/// - `BridgeError::Rejected` when the service answers with a failure code
/// - `BridgeError::OperationFailed` for malformed responses
#[async_trait]
pub trait RemoteStorage: Send + Sync {
    /// Lists the direct children of `path`.
    async fn list_directory(&self, path: &str) -> Result<Vec<FileEntry>>;

    /// Uploads the local file at `local_path` to `remote_path`.
    async fn upload_file(&self, local_path: &Path, remote_path: &str) -> Result<()>;
}
