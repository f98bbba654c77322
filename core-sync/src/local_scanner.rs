//! Local tree enumeration
//!
//! [`LocalTreeScanner::scan`] reads the root eagerly so an unreadable root
//! fails the call; everything below it is walked lazily from an explicit
//! stack as the returned stream is polled.
//!
//! - Symlinks are never followed (checked with `symlink_metadata`)
//! - Entries that resolve outside the root are skipped
//! - Unreadable sub-directories are logged and skipped
//! - Directories below `max_depth` are not descended
//!
//! Every directory that was not walked completely is recorded on the
//! [`LocalScan`], so callers can tell "gone" from "not looked at".

use bridge_traits::storage::FileEntry;
use chrono::{DateTime, Utc};
use core_async::fs::{self, ReadDir};
use futures::stream::{self, BoxStream, StreamExt};
use std::fs::Metadata;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, instrument, warn};

use crate::error::{Result, SyncError};
use crate::path_resolver::to_forward_slash;

#[derive(Debug, Clone, Copy)]
pub struct LocalTreeScanner {
    max_depth: usize,
}

impl LocalTreeScanner {
    pub fn new(max_depth: usize) -> Self {
        Self { max_depth }
    }

    /// Files below `root`, yielded lazily.
    ///
    /// # Errors
    ///
    /// Fails only when `root` itself cannot be read.
    #[instrument(skip(self), fields(root = %root.display()))]
    pub async fn scan(&self, root: &Path) -> Result<LocalScan> {
        let entries = fs::read_dir(root).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => SyncError::FileNotFound(root.display().to_string()),
            _ => SyncError::FileError(format!("Cannot read {}: {}", root.display(), e)),
        })?;

        let canonical_root = fs::canonicalize(root)
            .await
            .map_err(|e| SyncError::FileError(format!("Cannot resolve {}: {}", root.display(), e)))?;

        let skipped = Skipped::default();
        let walk = Walk {
            canonical_root,
            max_depth: self.max_depth,
            current: Some((root.to_path_buf(), entries, 0)),
            pending: Vec::new(),
            skipped: skipped.clone(),
        };

        let files = stream::unfold(walk, |mut walk| async move {
            let next = walk.next_file().await?;
            Some((next, walk))
        })
        .boxed();

        Ok(LocalScan { files, skipped })
    }
}

/// A path that was not walked, and why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedPath {
    pub path: PathBuf,
    pub reason: String,
}

/// Files under a root plus the paths the walk had to leave out.
#[derive(Debug, Default)]
pub struct LocalTree {
    pub files: Vec<FileEntry>,
    pub skipped: Vec<SkippedPath>,
}

impl LocalTree {
    /// `true` when `path` lies in a part of the tree that was not walked.
    pub fn is_unscanned(&self, path: &Path) -> bool {
        self.skipped.iter().any(|skipped| path.starts_with(&skipped.path))
    }
}

/// Lazy walk of one root.
pub struct LocalScan {
    pub files: BoxStream<'static, FileEntry>,
    skipped: Skipped,
}

impl LocalScan {
    /// Paths left out so far; final once `files` is exhausted.
    pub fn skipped(&self) -> Vec<SkippedPath> {
        self.skipped.lock().clone()
    }

    /// Drains the walk.
    pub async fn collect(mut self) -> LocalTree {
        let files = self.files.by_ref().collect().await;
        LocalTree {
            files,
            skipped: self.skipped(),
        }
    }
}

#[derive(Debug, Clone, Default)]
struct Skipped(Arc<Mutex<Vec<SkippedPath>>>);

impl Skipped {
    fn lock(&self) -> MutexGuard<'_, Vec<SkippedPath>> {
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn record(&self, path: &Path, reason: impl Into<String>) {
        self.lock().push(SkippedPath {
            path: path.to_path_buf(),
            reason: reason.into(),
        });
    }
}

struct Walk {
    canonical_root: PathBuf,
    max_depth: usize,
    /// Directory being read, its handle, and its depth below the root.
    current: Option<(PathBuf, ReadDir, usize)>,
    /// Directories waiting to be read.
    pending: Vec<(PathBuf, usize)>,
    skipped: Skipped,
}

impl Walk {
    async fn next_file(&mut self) -> Option<FileEntry> {
        loop {
            if self.current.is_none() {
                let (dir, depth) = self.pending.pop()?;
                match fs::read_dir(&dir).await {
                    Ok(entries) => self.current = Some((dir, entries, depth)),
                    Err(e) => {
                        warn!(dir = %dir.display(), error = %e, "Skipping unreadable directory");
                        self.skipped.record(&dir, format!("unreadable: {}", e));
                    }
                }
                continue;
            }

            let Some((dir, entries, depth)) = self.current.as_mut() else {
                continue;
            };
            let depth = *depth;

            match entries.next_entry().await {
                Ok(Some(entry)) => {
                    if let Some(file) = self.visit(entry.path(), depth).await {
                        return Some(file);
                    }
                }
                Ok(None) => self.current = None,
                Err(e) => {
                    warn!(dir = %dir.display(), error = %e, "Directory read interrupted");
                    self.skipped.record(dir, format!("read interrupted: {}", e));
                    self.current = None;
                }
            }
        }
    }

    async fn visit(&mut self, path: PathBuf, depth: usize) -> Option<FileEntry> {
        let metadata = match fs::symlink_metadata(&path).await {
            Ok(metadata) => metadata,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Cannot stat entry");
                self.skipped.record(&path, format!("cannot stat: {}", e));
                return None;
            }
        };

        if metadata.file_type().is_symlink() {
            debug!(path = %path.display(), "Skipping symlink");
            return None;
        }

        match fs::canonicalize(&path).await {
            Ok(resolved) if resolved.starts_with(&self.canonical_root) => {}
            Ok(resolved) => {
                warn!(path = %path.display(), resolved = %resolved.display(), "Skipping entry outside scan root");
                return None;
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Cannot resolve entry");
                self.skipped.record(&path, format!("cannot resolve: {}", e));
                return None;
            }
        }

        if metadata.is_dir() {
            if depth + 1 > self.max_depth {
                warn!(path = %path.display(), max_depth = self.max_depth, "Not descending past depth limit");
                self.skipped
                    .record(&path, format!("deeper than {} levels", self.max_depth));
            } else {
                self.pending.push((path, depth + 1));
            }
            return None;
        }

        if !metadata.is_file() {
            return None;
        }

        Some(file_entry(&path, &metadata))
    }
}

fn file_entry(path: &Path, metadata: &Metadata) -> FileEntry {
    let entry = FileEntry::file(to_forward_slash(path), metadata.len());
    match metadata.modified() {
        Ok(modified) => entry.with_modified(DateTime::<Utc>::from(modified)),
        Err(_) => entry,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs as std_fs;

    async fn collect(scanner: LocalTreeScanner, root: &Path) -> Vec<String> {
        let mut names: Vec<String> = scanner
            .scan(root)
            .await
            .unwrap()
            .files
            .map(|entry| entry.path)
            .collect()
            .await;
        names.sort();
        names
    }

    fn rel(root: &Path, paths: Vec<String>) -> Vec<String> {
        let prefix = format!("{}/", to_forward_slash(root));
        paths
            .into_iter()
            .map(|p| p.trim_start_matches(&prefix).to_string())
            .collect()
    }

    #[core_async::test]
    async fn test_walks_nested_directories() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std_fs::create_dir_all(root.join("Action/Sub")).unwrap();
        std_fs::write(root.join("top.mp4"), b"1").unwrap();
        std_fs::write(root.join("Action/movie.mp4"), b"22").unwrap();
        std_fs::write(root.join("Action/Sub/deep.mkv"), b"333").unwrap();

        let found = rel(root, collect(LocalTreeScanner::new(32), root).await);
        assert_eq!(found, vec!["Action/Sub/deep.mkv", "Action/movie.mp4", "top.mp4"]);
    }

    #[core_async::test]
    async fn test_reports_sizes() {
        let dir = tempfile::tempdir().unwrap();
        std_fs::write(dir.path().join("a.mp4"), vec![0u8; 100]).unwrap();

        let entries: Vec<FileEntry> = LocalTreeScanner::new(32)
            .scan(dir.path())
            .await
            .unwrap()
            .files
            .collect()
            .await;

        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].size, 100);
        assert_eq!(entries[0].name, "a.mp4");
        assert!(entries[0].modified.is_some());
    }

    #[core_async::test]
    async fn test_missing_root_fails() {
        let dir = tempfile::tempdir().unwrap();
        let result = LocalTreeScanner::new(32).scan(&dir.path().join("missing")).await;
        assert!(matches!(result, Err(SyncError::FileNotFound(_))));
    }

    #[core_async::test]
    async fn test_depth_limit() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std_fs::create_dir_all(root.join("a/b")).unwrap();
        std_fs::write(root.join("a/one.mp4"), b"1").unwrap();
        std_fs::write(root.join("a/b/two.mp4"), b"2").unwrap();

        let found = rel(root, collect(LocalTreeScanner::new(1), root).await);
        assert_eq!(found, vec!["a/one.mp4"]);
    }

    #[core_async::test]
    async fn test_depth_limit_is_reported_as_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std_fs::create_dir_all(root.join("a/b/c")).unwrap();
        std_fs::write(root.join("a/b/c/two.mp4"), b"2").unwrap();

        let tree = LocalTreeScanner::new(1).scan(root).await.unwrap().collect().await;

        assert!(tree.files.is_empty());
        assert_eq!(tree.skipped.len(), 1);
        assert_eq!(tree.skipped[0].path, root.join("a/b"));
        assert!(tree.is_unscanned(&root.join("a/b/c/two.mp4")));
        assert!(!tree.is_unscanned(&root.join("a/one.mp4")));
    }

    #[core_async::test]
    async fn test_complete_walk_skips_nothing() {
        let dir = tempfile::tempdir().unwrap();
        std_fs::create_dir_all(dir.path().join("a/b")).unwrap();
        std_fs::write(dir.path().join("a/b/x.mp4"), b"1").unwrap();

        let tree = LocalTreeScanner::new(32).scan(dir.path()).await.unwrap().collect().await;

        assert_eq!(tree.files.len(), 1);
        assert!(tree.skipped.is_empty());
    }

    #[cfg(unix)]
    #[core_async::test]
    async fn test_symlinks_are_not_followed() {
        let outside = tempfile::tempdir().unwrap();
        std_fs::write(outside.path().join("secret.mp4"), b"s").unwrap();

        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std_fs::write(root.join("real.mp4"), b"r").unwrap();
        std::os::unix::fs::symlink(outside.path(), root.join("linked-dir")).unwrap();
        std::os::unix::fs::symlink(outside.path().join("secret.mp4"), root.join("linked.mp4")).unwrap();

        let found = rel(root, collect(LocalTreeScanner::new(32), root).await);
        assert_eq!(found, vec!["real.mp4"]);
    }
}
