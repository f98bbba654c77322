//! Per-file processing
//!
//! Turns one [`WorkItem`] into a catalog record: resolve a safe source,
//! probe the duration, produce a thumbnail, upsert, and link new files to
//! their folder collection. A thumbnail that cannot be produced is logged
//! and the video is cataloged without one.
//!
//! ## Thumbnails
//!
//! - Local: `<images>/<relative dir>/<stem>.jpg`, cataloged as `/images/...`;
//!   `<stem>-<ext>.jpg` when a sibling with the same stem is also a video
//! - Mount: `<images>/mounts/<stem>-<8 hex of sha256(path)>.jpg`
//! - Cloud: `<stem>.jpg` next to the video, generated into the temp dir and
//!   uploaded unless the remote directory already holds one

use bridge_traits::storage::FileEntry;
use core_library::{new_record_id, Catalog, CatalogEntry, VideoRecord, VideoSource};
use core_metadata::MetadataExtractor;
use core_runtime::config::{RemoteConfig, SyncEngineConfig};
use core_runtime::events::{CoreEvent, EventBus, LibraryEvent};
use core_runtime::logging::redact_signed_url;
use provider_alist::remote_path;
use provider_alist::{RemoteListingCache, RemoteUploader, SignedUrlBroker, SignedUrlKind};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

use crate::collections::CollectionAutoCreator;
use crate::error::{Result, SyncError};
use crate::path_resolver::{resolve_safe_path, to_forward_slash};

/// Where a discovered file lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemLocation {
    /// Relative to the videos directory, forward slashes.
    Local { relative: String },
    Mount { path: PathBuf, root: PathBuf },
    Cloud { remote_path: String, identifier: String },
}

/// One new or changed file.
#[derive(Debug, Clone)]
pub struct WorkItem {
    pub entry: FileEntry,
    pub storage_key: String,
    pub source: VideoSource,
    pub location: ItemLocation,
    /// Catalog entry with the same storage key; its id is reused.
    pub existing: Option<CatalogEntry>,
    /// Folder collection for files in a sub-folder of the scan root.
    pub collection: Option<String>,
}

impl WorkItem {
    pub fn is_new(&self) -> bool {
        self.existing.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemOutcome {
    pub video_id: String,
    pub is_new: bool,
    /// Linking to the folder collection failed; the video is still cataloged.
    pub collection_error: Option<String>,
}

/// Remote services shared by cloud scans, uploads and signed URLs.
#[derive(Clone)]
pub struct RemoteServices {
    pub config: RemoteConfig,
    pub listings: Arc<RemoteListingCache>,
    pub signed_urls: Arc<SignedUrlBroker>,
    pub uploader: Arc<RemoteUploader>,
}

impl RemoteServices {
    /// Catalog identifier of a remote path.
    pub fn identifier(&self, path: &str) -> String {
        cloud_identifier(&self.config.upload_path, path)
    }
}

/// Path relative to the upload root, or the absolute path when outside it.
pub fn cloud_identifier(upload_root: &str, path: &str) -> String {
    let root = remote_path::normalize_dir(upload_root);
    match remote_path::strip_root(&root, path) {
        Some(relative) if !relative.is_empty() => relative.to_string(),
        _ => path.to_string(),
    }
}

struct Derived {
    duration: Option<u64>,
    thumbnail: Option<Thumbnail>,
}

struct Thumbnail {
    filename: String,
    path: String,
}

pub struct FileProcessor {
    config: Arc<SyncEngineConfig>,
    extractor: MetadataExtractor,
    catalog: Arc<dyn Catalog>,
    collections: Arc<CollectionAutoCreator>,
    remote: Option<RemoteServices>,
    events: EventBus,
}

impl FileProcessor {
    pub fn new(
        config: Arc<SyncEngineConfig>,
        extractor: MetadataExtractor,
        catalog: Arc<dyn Catalog>,
        collections: Arc<CollectionAutoCreator>,
        remote: Option<RemoteServices>,
        events: EventBus,
    ) -> Self {
        Self {
            config,
            extractor,
            catalog,
            collections,
            remote,
            events,
        }
    }

    #[instrument(skip(self, item), fields(key = %item.storage_key, new = item.is_new()))]
    pub async fn process(&self, item: &WorkItem) -> Result<ItemOutcome> {
        let derived = match &item.location {
            ItemLocation::Local { relative } => self.prepare_local(relative).await?,
            ItemLocation::Mount { path, root } => self.prepare_mount(path, root).await?,
            ItemLocation::Cloud {
                remote_path,
                identifier,
            } => self.prepare_cloud(remote_path, identifier).await?,
        };

        let is_new = item.is_new();
        let id = item
            .existing
            .as_ref()
            .map(|existing| existing.id.clone())
            .unwrap_or_else(new_record_id);

        let mut record = VideoRecord::new(id, &item.storage_key, &item.entry.name, item.source);
        record.file_size = i64::try_from(item.entry.size).unwrap_or(i64::MAX);
        record.duration = derived.duration.and_then(|d| i64::try_from(d).ok());
        if let Some(thumbnail) = derived.thumbnail {
            record.thumbnail_filename = Some(thumbnail.filename);
            record.thumbnail_path = Some(thumbnail.path);
        }

        self.catalog.upsert_video(&record).await?;

        let event = if is_new {
            LibraryEvent::VideoAdded {
                video_id: record.id.clone(),
                path: record.video_path.clone(),
            }
        } else {
            LibraryEvent::VideoUpdated {
                video_id: record.id.clone(),
                path: record.video_path.clone(),
            }
        };
        let _ = self.events.emit(CoreEvent::Library(event));

        let collection_error = match (&item.collection, is_new) {
            (Some(name), true) => self
                .link_collection(name, &record.id)
                .await
                .err()
                .map(|e| format!("{}: collection '{}': {}", item.entry.name, name, e)),
            _ => None,
        };

        debug!(video_id = %record.id, "Cataloged");
        Ok(ItemOutcome {
            video_id: record.id,
            is_new,
            collection_error,
        })
    }

    async fn link_collection(&self, name: &str, video_id: &str) -> Result<()> {
        let collection_id = self.collections.find_or_create(name).await?;
        self.catalog
            .add_video_to_collection(&collection_id, video_id)
            .await?;
        Ok(())
    }

    async fn prepare_local(&self, relative: &str) -> Result<Derived> {
        let path = resolve_safe_path(relative, &self.config.videos_dir)?;
        let source = path.to_string_lossy().into_owned();
        let duration = self.extractor.probe_duration(&source).await;

        let (dir, name) = match relative.rsplit_once('/') {
            Some((dir, name)) => (Some(dir), name),
            None => (None, relative),
        };
        let thumbnail_filename = self.local_thumbnail_name(&path, name).await;
        let thumb_relative = match dir {
            Some(dir) => format!("{}/{}", dir, thumbnail_filename),
            None => thumbnail_filename.clone(),
        };
        let dest = resolve_safe_path(&thumb_relative, &self.config.images_dir)?;

        let generated = self
            .extractor
            .generate_thumbnail(&source, self.extractor.thumbnail_offset(duration), &dest)
            .await;
        let thumbnail = thumbnail_or_warn(relative, generated, || Thumbnail {
            filename: thumbnail_filename,
            path: format!("/images/{}", thumb_relative),
        });

        Ok(Derived {
            duration,
            thumbnail,
        })
    }

    /// `<stem>.jpg`, or `<stem>-<ext>.jpg` when another video in the same
    /// directory shares the stem.
    async fn local_thumbnail_name(&self, path: &Path, name: &str) -> String {
        let base = stem(name);
        let Some(parent) = path.parent() else {
            return format!("{}.jpg", base);
        };

        let mut shared = false;
        if let Ok(mut entries) = core_async::fs::read_dir(parent).await {
            while let Ok(Some(entry)) = entries.next_entry().await {
                let sibling = entry.file_name().to_string_lossy().into_owned();
                if sibling != name
                    && stem(&sibling) == base
                    && self.config.is_video_file(&sibling)
                {
                    shared = true;
                    break;
                }
            }
        }

        match name.rsplit_once('.') {
            Some((_, ext)) if shared => format!("{}-{}.jpg", base, ext.to_ascii_lowercase()),
            _ => format!("{}.jpg", base),
        }
    }

    async fn prepare_mount(&self, path: &Path, root: &Path) -> Result<Derived> {
        let path = resolve_safe_path(&to_forward_slash(path), root)?;
        let source = to_forward_slash(&path);
        let duration = self.extractor.probe_duration(&source).await;

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let thumbnail_filename = format!("{}-{}.jpg", stem(&name), short_digest(&source));
        let dest = self.config.images_dir.join("mounts").join(&thumbnail_filename);

        let generated = self
            .extractor
            .generate_thumbnail(&source, self.extractor.thumbnail_offset(duration), &dest)
            .await;
        let thumbnail = thumbnail_or_warn(&source, generated, || Thumbnail {
            path: format!("/images/mounts/{}", thumbnail_filename),
            filename: thumbnail_filename,
        });

        Ok(Derived {
            duration,
            thumbnail,
        })
    }

    async fn prepare_cloud(&self, remote: &str, identifier: &str) -> Result<Derived> {
        let services = self
            .remote
            .as_ref()
            .ok_or_else(|| SyncError::NotConfigured("remote storage".to_string()))?;
        resolve_safe_path(remote, Path::new("/"))?;

        let url = services
            .signed_urls
            .get_signed_url(identifier, SignedUrlKind::Video)
            .await
            .ok_or_else(|| SyncError::Network(format!("No signed URL for {}", identifier)))?;
        let duration = self.extractor.probe_duration(&url).await;

        let (parent, name) = remote_path::split(remote);
        let thumbnail_filename = format!("{}.jpg", stem(&name));
        let thumb_remote = remote_path::join(&parent, &thumbnail_filename);
        let thumb_identifier = services.identifier(&thumb_remote);

        let present = match services.listings.list(&parent).await {
            Ok(listing) => listing
                .iter()
                .any(|entry| !entry.is_directory && entry.name == thumbnail_filename),
            Err(e) => {
                debug!(dir = %parent, error = %e, "Cannot check for existing thumbnail");
                false
            }
        };

        let outcome = if present {
            debug!(thumbnail = %thumb_remote, "Reusing remote thumbnail");
            Ok(())
        } else {
            let temp = self
                .config
                .temp_dir
                .join(format!("{}.jpg", new_record_id()));
            let outcome = self
                .generate_and_upload(services, &url, duration, &temp, &thumb_remote)
                .await;
            remove_temp(&temp).await;
            if outcome.is_ok() {
                services.signed_urls.invalidate(Some(&thumb_identifier));
            }
            outcome
        };
        let thumbnail = thumbnail_or_warn(remote, outcome, || Thumbnail {
            filename: thumbnail_filename,
            path: format!("cloud:{}", thumb_identifier),
        });

        Ok(Derived {
            duration,
            thumbnail,
        })
    }

    async fn generate_and_upload(
        &self,
        services: &RemoteServices,
        source: &str,
        duration: Option<u64>,
        temp: &Path,
        dest: &str,
    ) -> Result<()> {
        self.extractor
            .generate_thumbnail(source, self.extractor.thumbnail_offset(duration), temp)
            .await?;
        services.uploader.upload(temp, dest).await?;
        Ok(())
    }
}

fn thumbnail_or_warn<E: std::fmt::Display>(
    source: &str,
    outcome: std::result::Result<(), E>,
    thumbnail: impl FnOnce() -> Thumbnail,
) -> Option<Thumbnail> {
    match outcome {
        Ok(()) => Some(thumbnail()),
        Err(e) => {
            warn!(source = %redact_signed_url(source), error = %e, "No thumbnail, cataloging without one");
            None
        }
    }
}

fn stem(name: &str) -> &str {
    match name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => name,
    }
}

/// First 8 hex characters of the SHA-256 of `value`.
fn short_digest(value: &str) -> String {
    Sha256::digest(value.as_bytes())
        .iter()
        .take(4)
        .map(|byte| format!("{:02x}", byte))
        .collect()
}

async fn remove_temp(path: &Path) {
    match core_async::fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove temporary thumbnail"),
    }
}
