//! Idempotent uploads
//!
//! A file already present at the destination with the same name and size is
//! skipped. Size equality is not content equality: a same-sized replacement
//! is treated as already uploaded.

use bridge_traits::storage::RemoteStorage;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::error::{ProviderError, Result};
use crate::listing_cache::RemoteListingCache;
use crate::remote_path;

/// What [`RemoteUploader::upload`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UploadOutcome {
    pub uploaded: bool,
    pub skipped: bool,
}

impl UploadOutcome {
    pub fn uploaded() -> Self {
        Self {
            uploaded: true,
            skipped: false,
        }
    }

    pub fn skipped() -> Self {
        Self {
            uploaded: false,
            skipped: true,
        }
    }
}

pub struct RemoteUploader {
    storage: Arc<dyn RemoteStorage>,
    listings: Arc<RemoteListingCache>,
}

impl RemoteUploader {
    pub fn new(listings: Arc<RemoteListingCache>) -> Self {
        Self {
            storage: Arc::clone(listings.storage()),
            listings,
        }
    }

    /// Uploads `local_path` to the remote path `dest_path`.
    ///
    /// # Errors
    ///
    /// - `ProviderError::File` when the local file cannot be read
    /// - `ProviderError::Api` when the service rejects the upload
    /// - `ProviderError::Network` on transport failure
    #[instrument(skip(self, local_path), fields(local = %local_path.display()))]
    pub async fn upload(&self, local_path: &Path, dest_path: &str) -> Result<UploadOutcome> {
        let metadata = core_async::fs::metadata(local_path)
            .await
            .map_err(|e| ProviderError::File(format!("{}: {}", local_path.display(), e)))?;
        if !metadata.is_file() {
            return Err(ProviderError::File(format!(
                "{} is not a regular file",
                local_path.display()
            )));
        }
        let size = metadata.len();

        let dest = remote_path::normalize_dir(dest_path);
        let (parent, name) = remote_path::split(&dest);

        match self.listings.list(&parent).await {
            Ok(listing) => {
                let present = listing
                    .iter()
                    .any(|entry| !entry.is_directory && entry.name == name && entry.size == size);
                if present {
                    debug!(dest = %dest, size, "Already present remotely, skipping upload");
                    return Ok(UploadOutcome::skipped());
                }
            }
            Err(e) => {
                warn!(dir = %parent, error = %e, "Destination listing failed, uploading anyway");
            }
        }

        self.storage
            .upload_file(local_path, &dest)
            .await
            .map_err(ProviderError::from)?;

        self.listings.invalidate(None);
        info!(dest = %dest, size, "Upload complete");

        Ok(UploadOutcome::uploaded())
    }
}
