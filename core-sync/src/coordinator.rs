//! # Sync Coordinator
//!
//! The scan surface exposed to hosts.
//!
//! The coordinator owns the process-wide services (listing cache, signed URL
//! broker, collection registry) and hands scans to the [`ReconcilerEngine`].
//! Scans of the same kind are not serialised here; hosts that need mutual
//! exclusion layer it on top.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use core_sync::{SyncCoordinator, SyncDependencies};
//!
//! let coordinator = SyncCoordinator::new(config, dependencies);
//!
//! let result = coordinator.scan_local().await;
//! println!("added {} updated {}", result.added_count, result.updated_count);
//!
//! let mounts = coordinator
//!     .scan_mounts(vec!["/mnt/media".to_string()])
//!     .await?;
//! ```

use bridge_traits::{Clock, ProcessRunner, RemoteStorage};
use core_library::Catalog;
use core_metadata::MetadataExtractor;
use core_runtime::config::SyncEngineConfig;
use core_runtime::events::EventBus;
use provider_alist::{
    RemoteListingCache, RemoteUploader, SignedUrlBroker, SignedUrlKind, UploadOutcome,
};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, instrument};

use crate::collections::CollectionAutoCreator;
use crate::error::{Result, SyncError};
use crate::path_resolver::validate_mount_directories;
use crate::processor::{FileProcessor, RemoteServices};
use crate::reconciler::ReconcilerEngine;
use crate::result::{MountScanResult, ProgressCallback, ScanResult};

/// Collaborators the coordinator is built from.
pub struct SyncDependencies {
    pub catalog: Arc<dyn Catalog>,
    pub process_runner: Arc<dyn ProcessRunner>,
    /// Required for cloud scans, signed URLs and uploads.
    pub remote_storage: Option<Arc<dyn RemoteStorage>>,
    pub clock: Arc<dyn Clock>,
    pub event_bus: EventBus,
}

pub struct SyncCoordinator {
    config: Arc<SyncEngineConfig>,
    engine: ReconcilerEngine,
    collections: Arc<CollectionAutoCreator>,
    remote: Option<RemoteServices>,
    event_bus: EventBus,
}

impl SyncCoordinator {
    pub fn new(config: SyncEngineConfig, dependencies: SyncDependencies) -> Self {
        let SyncDependencies {
            catalog,
            process_runner,
            remote_storage,
            clock,
            event_bus,
        } = dependencies;
        let config = Arc::new(config);

        let remote = match (&config.remote, remote_storage) {
            (Some(remote_config), Some(storage)) => {
                let listings = Arc::new(RemoteListingCache::new(
                    storage,
                    config.cache.listing_ttl,
                    Arc::clone(&clock),
                ));
                Some(RemoteServices {
                    config: remote_config.clone(),
                    signed_urls: Arc::new(SignedUrlBroker::new(
                        Arc::clone(&listings),
                        remote_config,
                        config.cache.signed_url_ttl,
                        clock,
                    )),
                    uploader: Arc::new(RemoteUploader::new(Arc::clone(&listings))),
                    listings,
                })
            }
            _ => None,
        };

        let collections = Arc::new(CollectionAutoCreator::new(
            Arc::clone(&catalog),
            event_bus.clone(),
        ));
        let processor = Arc::new(FileProcessor::new(
            Arc::clone(&config),
            MetadataExtractor::new(process_runner, config.tools.clone()),
            Arc::clone(&catalog),
            Arc::clone(&collections),
            remote.clone(),
            event_bus.clone(),
        ));
        let engine = ReconcilerEngine::new(
            Arc::clone(&config),
            catalog,
            processor,
            remote.clone(),
            event_bus.clone(),
        );

        info!(
            videos_dir = %config.videos_dir.display(),
            remote = remote.is_some(),
            lanes = config.concurrency,
            "Sync coordinator ready"
        );

        Self {
            config,
            engine,
            collections,
            remote,
            event_bus,
        }
    }

    pub fn config(&self) -> &SyncEngineConfig {
        &self.config
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    pub fn collections(&self) -> &CollectionAutoCreator {
        &self.collections
    }

    pub fn has_remote(&self) -> bool {
        self.remote.is_some()
    }

    /// Reconciles the local videos directory.
    pub async fn scan_local(&self) -> ScanResult {
        self.engine.reconcile_local(None).await
    }

    /// Reconciles user-supplied mount directories.
    ///
    /// # Errors
    ///
    /// `SyncError::InvalidMountDirectories` when any entry is blank, relative,
    /// or contains `..` or a null byte. Nothing is scanned in that case.
    #[instrument(skip(self))]
    pub async fn scan_mounts(&self, directories: Vec<String>) -> Result<MountScanResult> {
        let roots = validate_mount_directories(&directories)?;
        Ok(self.engine.reconcile_mounts(&roots, None).await)
    }

    /// Reconciles every remote root.
    pub async fn scan_cloud(&self, on_progress: Option<ProgressCallback>) -> ScanResult {
        self.engine.reconcile_cloud(on_progress).await
    }

    /// Signed URL for a cloud identifier; `None` when it cannot be resolved
    /// or no remote is configured.
    pub async fn signed_url(&self, identifier: &str, kind: SignedUrlKind) -> Option<String> {
        let remote = self.remote.as_ref()?;
        remote.signed_urls.get_signed_url(identifier, kind).await
    }

    /// Uploads a local file to `dest` on the remote.
    pub async fn upload(&self, local: &Path, dest: &str) -> Result<UploadOutcome> {
        let remote = self
            .remote
            .as_ref()
            .ok_or_else(|| SyncError::NotConfigured("remote storage".to_string()))?;
        Ok(remote.uploader.upload(local, dest).await?)
    }

    /// Drops cached listings and signed URLs.
    pub fn invalidate_remote_caches(&self) {
        if let Some(remote) = &self.remote {
            remote.listings.invalidate(None);
            remote.signed_urls.invalidate(None);
        }
    }
}
