//! # Reconciler
//!
//! Brings the catalog in line with what is actually stored.
//!
//! Every scan follows the same shape:
//!
//! 1. **Discover** files under the scan roots (local walk, mount walks, or the
//!    union of remote roots)
//! 2. **Diff forward** against a catalog snapshot taken at scan start: keys
//!    missing from the snapshot are new, keys with a different size changed
//! 3. **Process** new and changed files on the [`WorkerPool`]
//! 4. **Diff backward**: cataloged keys in the scanned scope that were not
//!    discovered are deleted
//!
//! Per-file failures are collected into [`ScanResult::errors`] and never stop
//! the scan. Only a failure to read the scan root (or the catalog) aborts it,
//! with zero counts and one error.

use bridge_traits::storage::FileEntry;
use core_library::{Catalog, CatalogSnapshot, VideoSource};
use core_runtime::config::SyncEngineConfig;
use core_runtime::events::{CoreEvent, EventBus, LibraryEvent, ScanEvent, ScanKind};
use provider_alist::remote_path;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::local_scanner::{LocalTree, LocalTreeScanner, SkippedPath};
use crate::path_resolver::{relative_key, to_forward_slash};
use crate::processor::{FileProcessor, ItemLocation, RemoteServices, WorkItem};
use crate::result::{MountScanResult, ProgressCallback, ScanPhase, ScanProgress, ScanResult};
use crate::worker_pool::WorkerPool;

/// Storage key prefix of local videos.
pub const LOCAL_KEY_PREFIX: &str = "/videos/";
pub const MOUNT_KEY_PREFIX: &str = "mount:";
pub const CLOUD_KEY_PREFIX: &str = "cloud:";

pub struct ReconcilerEngine {
    config: Arc<SyncEngineConfig>,
    catalog: Arc<dyn Catalog>,
    processor: Arc<FileProcessor>,
    remote: Option<RemoteServices>,
    scanner: LocalTreeScanner,
    pool: WorkerPool,
    events: EventBus,
}

impl ReconcilerEngine {
    pub fn new(
        config: Arc<SyncEngineConfig>,
        catalog: Arc<dyn Catalog>,
        processor: Arc<FileProcessor>,
        remote: Option<RemoteServices>,
        events: EventBus,
    ) -> Self {
        Self {
            scanner: LocalTreeScanner::new(config.max_scan_depth),
            pool: WorkerPool::new(config.concurrency),
            config,
            catalog,
            processor,
            remote,
            events,
        }
    }

    /// Reconciles the videos directory.
    #[instrument(skip(self, progress))]
    pub async fn reconcile_local(&self, progress: Option<ProgressCallback>) -> ScanResult {
        let session = ScanSession::start(ScanKind::Local, progress, self.events.clone());

        let snapshot = match self.snapshot().await {
            Ok(snapshot) => snapshot,
            Err(message) => return session.fail(message),
        };

        let root = self.config.videos_dir.as_path();
        let mut tree = match self.walk(root).await {
            Ok(tree) => tree,
            Err(message) => return session.fail(message),
        };

        let mut plan = Plan::new(&self.config, &snapshot);
        plan.errors.extend(unscanned_errors(&tree.skipped));
        for entry in std::mem::take(&mut tree.files) {
            let Some(relative) = relative_key(root, Path::new(&entry.path)) else {
                continue;
            };
            let collection = relative
                .rsplit_once('/')
                .and_then(|(dir, _)| dir.rsplit('/').next())
                .map(str::to_string);
            plan.consider(
                entry,
                format!("{}{}", LOCAL_KEY_PREFIX, relative),
                VideoSource::Local,
                ItemLocation::Local { relative },
                collection,
            );
        }

        let Plan {
            items,
            seen,
            errors: discovery_errors,
            ..
        } = plan;
        let mut result = self.process(&session, items).await;
        result.errors.splice(0..0, discovery_errors);
        result.deleted_count = self
            .delete_missing(
                &session,
                &snapshot,
                |key| {
                    key.strip_prefix(LOCAL_KEY_PREFIX).is_some_and(|relative| {
                        !seen.contains(key) && !tree.is_unscanned(&root.join(relative))
                    })
                },
                &mut result.errors,
            )
            .await;

        session.complete(&result);
        result
    }

    /// Reconciles already-validated mount roots.
    ///
    /// A root that cannot be read is reported as an error and keeps its
    /// catalog entries; only roots that were walked take part in deletion.
    #[instrument(skip(self, roots, progress), fields(roots = roots.len()))]
    pub async fn reconcile_mounts(
        &self,
        roots: &[PathBuf],
        progress: Option<ProgressCallback>,
    ) -> MountScanResult {
        let session = ScanSession::start(ScanKind::Mount, progress, self.events.clone());

        let snapshot = match self.snapshot().await {
            Ok(snapshot) => snapshot,
            Err(message) => {
                return MountScanResult {
                    result: session.fail(message),
                    scanned_directories: Vec::new(),
                }
            }
        };

        let mut plan = Plan::new(&self.config, &snapshot);
        let mut scanned: Vec<PathBuf> = Vec::new();
        let mut unscanned: Vec<PathBuf> = Vec::new();

        for root in roots {
            let tree = match self.walk(root).await {
                Ok(tree) => tree,
                Err(message) => {
                    warn!(root = %root.display(), error = %message, "Mount root skipped");
                    plan.errors.push(message);
                    continue;
                }
            };
            scanned.push(root.clone());
            plan.errors.extend(unscanned_errors(&tree.skipped));
            unscanned.extend(tree.skipped.into_iter().map(|skipped| skipped.path));

            for entry in tree.files {
                let path = PathBuf::from(&entry.path);
                let collection = path
                    .parent()
                    .filter(|parent| *parent != root.as_path())
                    .and_then(Path::file_name)
                    .map(|name| name.to_string_lossy().into_owned());
                let storage_key = format!("{}{}", MOUNT_KEY_PREFIX, entry.path);
                plan.consider(
                    entry,
                    storage_key,
                    VideoSource::Mount,
                    ItemLocation::Mount {
                        path,
                        root: root.clone(),
                    },
                    collection,
                );
            }
        }

        let Plan {
            items,
            seen,
            errors: discovery_errors,
            ..
        } = plan;
        let mut result = self.process(&session, items).await;
        result.errors.splice(0..0, discovery_errors);
        result.deleted_count = self
            .delete_missing(
                &session,
                &snapshot,
                |key| {
                    key.strip_prefix(MOUNT_KEY_PREFIX).is_some_and(|path| {
                        let path = Path::new(path);
                        scanned.iter().any(|root| path.starts_with(root))
                            && !unscanned.iter().any(|dir| path.starts_with(dir))
                    }) && !seen.contains(key)
                },
                &mut result.errors,
            )
            .await;

        session.complete(&result);
        MountScanResult {
            result,
            scanned_directories: scanned.iter().map(|root| to_forward_slash(root)).collect(),
        }
    }

    /// Reconciles the upload root and every configured remote scan path.
    ///
    /// Deletions only run when every remote directory listed successfully;
    /// a partial listing would otherwise look like mass removal.
    #[instrument(skip(self, progress))]
    pub async fn reconcile_cloud(&self, progress: Option<ProgressCallback>) -> ScanResult {
        let session = ScanSession::start(ScanKind::Cloud, progress, self.events.clone());

        let Some(remote) = self.remote.as_ref() else {
            return session.fail("Remote storage is not configured".to_string());
        };
        let purged = remote.listings.purge_expired() + remote.signed_urls.purge_expired();
        if purged > 0 {
            debug!(purged, "Dropped expired remote cache entries");
        }

        let snapshot = match self.snapshot().await {
            Ok(snapshot) => snapshot,
            Err(message) => return session.fail(message),
        };

        let upload_root = remote_path::normalize_dir(&remote.config.upload_path);
        let mut plan = Plan::new(&self.config, &snapshot);
        let mut complete = true;
        let mut discovered: HashSet<String> = HashSet::new();

        for root in remote.config.scan_roots() {
            let root = remote_path::normalize_dir(&root);
            let tree = remote.listings.list_recursive(&root).await;

            if tree.failed_dirs.contains(&root) && root == upload_root {
                return session.fail(format!("Cannot list remote root {}", root));
            }
            if !tree.is_complete() {
                complete = false;
                plan.errors.extend(
                    tree.failed_dirs
                        .iter()
                        .map(|dir| format!("{}: remote listing failed", dir)),
                );
            }

            for entry in tree.entries {
                if !discovered.insert(entry.path.clone()) {
                    continue;
                }
                let identifier = remote.identifier(&entry.path);
                let parent = entry.parent_path().to_string();
                let collection = if parent != root {
                    Some(remote_path::split(&parent).1).filter(|name| !name.is_empty())
                } else {
                    None
                };
                let remote_path = entry.path.clone();
                plan.consider(
                    entry,
                    format!("{}{}", CLOUD_KEY_PREFIX, identifier),
                    VideoSource::Cloud,
                    ItemLocation::Cloud {
                        remote_path,
                        identifier,
                    },
                    collection,
                );
            }
        }

        let Plan {
            items,
            seen,
            errors: discovery_errors,
            ..
        } = plan;
        let mut result = self.process(&session, items).await;
        result.errors.splice(0..0, discovery_errors);

        if complete {
            result.deleted_count = self
                .delete_missing(
                    &session,
                    &snapshot,
                    |key| key.starts_with(CLOUD_KEY_PREFIX) && !seen.contains(key),
                    &mut result.errors,
                )
                .await;
        } else {
            warn!("Remote listing incomplete, skipping deletions");
        }

        session.complete(&result);
        result
    }

    async fn snapshot(&self) -> std::result::Result<CatalogSnapshot, String> {
        self.catalog
            .get_videos_by_path()
            .await
            .map(CatalogSnapshot::from)
            .map_err(|e| format!("Cannot load catalog: {}", e))
    }

    async fn walk(&self, root: &Path) -> std::result::Result<LocalTree, String> {
        match self.scanner.scan(root).await {
            Ok(scan) => Ok(scan.collect().await),
            Err(e) => Err(format!("{}: {}", to_forward_slash(root), e)),
        }
    }

    async fn process(&self, session: &ScanSession, items: Vec<WorkItem>) -> ScanResult {
        let total = items.len() as u64;
        debug!(items = total, lanes = self.pool.lanes(), "Processing");
        session.report(ScanPhase::Processing, 0, total, None);

        let finished = AtomicU64::new(0);
        let finished = &finished;
        let processor = self.processor.as_ref();

        let outcomes = self
            .pool
            .run(items, move |item| async move {
                let outcome = processor.process(&item).await;
                let done = finished.fetch_add(1, Ordering::SeqCst) + 1;
                session.report(ScanPhase::Processing, done, total, Some(&item.entry.name));
                (item, outcome)
            })
            .await;

        let mut result = ScanResult::default();
        for (item, outcome) in outcomes {
            match outcome {
                Ok(outcome) => {
                    if outcome.is_new {
                        result.added_count += 1;
                    } else {
                        result.updated_count += 1;
                    }
                    if let Some(message) = outcome.collection_error {
                        warn!(error = %message, "Collection link failed");
                        result.errors.push(message);
                    }
                }
                Err(e) => {
                    warn!(file = %item.entry.name, error = %e, "File failed");
                    session.file_failed(&item.storage_key, &e.to_string());
                    result.errors.push(format!("{}: {}", item.entry.name, e));
                }
            }
        }
        result
    }

    async fn delete_missing<P>(
        &self,
        session: &ScanSession,
        snapshot: &CatalogSnapshot,
        stale: P,
        errors: &mut Vec<String>,
    ) -> u64
    where
        P: Fn(&str) -> bool,
    {
        let doomed: Vec<(String, String)> = snapshot
            .iter()
            .filter(|(key, _)| stale(key))
            .map(|(key, entry)| (key.to_string(), entry.id.clone()))
            .collect();
        if doomed.is_empty() {
            return 0;
        }

        let total = doomed.len() as u64;
        session.report(ScanPhase::Deleting, 0, total, None);

        let mut deleted = 0;
        for (key, id) in doomed {
            match self.catalog.delete_video(&id).await {
                Ok(true) => {
                    deleted += 1;
                    debug!(key = %key, "Deleted missing video");
                    let _ = self
                        .events
                        .emit(CoreEvent::Library(LibraryEvent::VideoDeleted { video_id: id }));
                }
                Ok(false) => debug!(key = %key, "Video already gone"),
                Err(e) => {
                    warn!(key = %key, error = %e, "Delete failed");
                    errors.push(format!("{}: {}", key, e));
                }
            }
            session.report(ScanPhase::Deleting, deleted, total, None);
        }
        deleted
    }
}

/// One error per path the walk left out; their catalog entries are kept.
fn unscanned_errors(skipped: &[SkippedPath]) -> Vec<String> {
    skipped
        .iter()
        .map(|skipped| format!("{}: not scanned, {}", to_forward_slash(&skipped.path), skipped.reason))
        .collect()
}

/// Discovery bookkeeping for one scan.
struct Plan<'a> {
    config: &'a SyncEngineConfig,
    snapshot: &'a CatalogSnapshot,
    items: Vec<WorkItem>,
    /// Every storage key discovered, processed or not.
    seen: HashSet<String>,
    errors: Vec<String>,
}

impl<'a> Plan<'a> {
    fn new(config: &'a SyncEngineConfig, snapshot: &'a CatalogSnapshot) -> Self {
        Self {
            config,
            snapshot,
            items: Vec::new(),
            seen: HashSet::new(),
            errors: Vec::new(),
        }
    }

    fn consider(
        &mut self,
        entry: FileEntry,
        storage_key: String,
        source: VideoSource,
        location: ItemLocation,
        collection: Option<String>,
    ) {
        if !self.config.is_video_file(&entry.name) {
            return;
        }
        if !self.seen.insert(storage_key.clone()) {
            return;
        }
        if entry.size == 0 {
            debug!(key = %storage_key, "Skipping empty file");
            return;
        }

        let existing = self.snapshot.get(&storage_key).cloned();
        if let Some(existing) = &existing {
            if i64::try_from(entry.size).is_ok_and(|size| size == existing.file_size) {
                return;
            }
            debug!(key = %storage_key, old = existing.file_size, new = entry.size, "Size changed");
        }

        let collection = if existing.is_none() { collection } else { None };
        self.items.push(WorkItem {
            entry,
            storage_key,
            source,
            location,
            existing,
            collection,
        });
    }
}

/// Progress and lifecycle reporting for one scan.
struct ScanSession {
    id: String,
    kind: ScanKind,
    progress: Option<ProgressCallback>,
    events: EventBus,
}

impl ScanSession {
    fn start(kind: ScanKind, progress: Option<ProgressCallback>, events: EventBus) -> Self {
        let session = Self {
            id: Uuid::new_v4().to_string(),
            kind,
            progress,
            events,
        };
        info!(scan_id = %session.id, kind = %kind, "Scan started");
        let _ = session.events.emit(CoreEvent::Scan(ScanEvent::Started {
            scan_id: session.id.clone(),
            kind,
        }));
        session.report(ScanPhase::Discovering, 0, 0, None);
        session
    }

    fn report(&self, phase: ScanPhase, processed: u64, total: u64, current: Option<&str>) {
        if phase == ScanPhase::Processing && processed > 0 {
            let _ = self.events.emit(CoreEvent::Scan(ScanEvent::Progress {
                scan_id: self.id.clone(),
                processed,
                total,
            }));
        }
        if let Some(callback) = &self.progress {
            callback(ScanProgress {
                phase,
                processed,
                total,
                current: current.map(str::to_string),
            });
        }
    }

    fn file_failed(&self, path: &str, message: &str) {
        let _ = self.events.emit(CoreEvent::Scan(ScanEvent::FileFailed {
            scan_id: self.id.clone(),
            path: path.to_string(),
            message: message.to_string(),
        }));
    }

    fn fail(&self, message: String) -> ScanResult {
        error!(scan_id = %self.id, kind = %self.kind, error = %message, "Scan aborted");
        let _ = self.events.emit(CoreEvent::Scan(ScanEvent::Failed {
            scan_id: self.id.clone(),
            message: message.clone(),
        }));
        ScanResult::failed(message)
    }

    fn complete(&self, result: &ScanResult) {
        if result.has_errors() {
            warn!(
                scan_id = %self.id,
                kind = %self.kind,
                added = result.added_count,
                updated = result.updated_count,
                deleted = result.deleted_count,
                errors = result.errors.len(),
                "Scan completed with errors"
            );
        } else {
            info!(
                scan_id = %self.id,
                kind = %self.kind,
                added = result.added_count,
                updated = result.updated_count,
                deleted = result.deleted_count,
                "Scan completed"
            );
        }
        let _ = self.events.emit(CoreEvent::Scan(ScanEvent::Completed {
            scan_id: self.id.clone(),
            added: result.added_count,
            updated: result.updated_count,
            deleted: result.deleted_count,
            errors: result.errors.len() as u64,
        }));
        self.report(
            ScanPhase::Completed,
            result.total_changes(),
            result.total_changes(),
            None,
        );
    }
}
