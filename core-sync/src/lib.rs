//! # Sync & Reconciliation
//!
//! Keeps the video catalog consistent with local folders, user-supplied
//! mount directories, and remote object storage.
//!
//! ## Components
//!
//! - **Path resolution** (`path_resolver`): lexical traversal checks for every
//!   path touched on disk, plus mount request validation
//! - **Local scanner** (`local_scanner`): lazy, symlink-safe tree walk with a
//!   depth cap
//! - **Worker pool** (`worker_pool`): bounded cooperative fan-out
//! - **Collections** (`collections`): coalesced find-or-create by folder name
//! - **File processor** (`processor`): probe, thumbnail, upsert for one file
//! - **Reconciler** (`reconciler`): discover, diff, process, delete
//! - **Sync Coordinator** (`coordinator`): the scan surface hosts call

pub mod collections;
pub mod coordinator;
pub mod error;
pub mod local_scanner;
pub mod path_resolver;
pub mod processor;
pub mod reconciler;
pub mod result;
pub mod worker_pool;

pub use collections::CollectionAutoCreator;
pub use coordinator::{SyncCoordinator, SyncDependencies};
pub use error::{Result, SyncError};
pub use local_scanner::{LocalScan, LocalTree, LocalTreeScanner, SkippedPath};
pub use path_resolver::{resolve_safe_path, validate_mount_directories, validate_mount_root};
pub use processor::{FileProcessor, ItemLocation, ItemOutcome, RemoteServices, WorkItem};
pub use reconciler::ReconcilerEngine;
pub use result::{MountScanResult, ProgressCallback, ScanPhase, ScanProgress, ScanResult};
pub use worker_pool::WorkerPool;

pub use provider_alist::{SignedUrlKind, UploadOutcome};
